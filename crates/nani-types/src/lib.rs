pub mod types;

pub use types::{
    InvalidRequest, ParseLanguageError, TargetLanguage, TranslationRecord, TranslationRequest,
};
