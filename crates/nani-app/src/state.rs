use std::sync::Arc;

use nani_config::Config;
use nani_core::{RelayRegistry, StreamingRelay, TranslationStore};
use nani_translator::CompletionBackend;
use tokio::sync::RwLock;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub store: Arc<TranslationStore>,
    pub relays: RelayRegistry,
    pub relay: StreamingRelay,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store: Arc::new(TranslationStore::new()),
            relays: RelayRegistry::new(),
            relay: StreamingRelay::new(backend),
        }
    }
}
