pub mod error;
pub mod history;
pub mod registry;
pub mod relay;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::NaniError;
pub use history::{HistoryEntry, HistoryError, HistoryLog};
pub use registry::RelayRegistry;
pub use relay::{
    OutboundStream, Persist, RelayEvent, RelayHandle, ResultSink, StreamingRelay, Subscription,
};
pub use store::TranslationStore;
