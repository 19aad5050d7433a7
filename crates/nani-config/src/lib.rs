use serde::{Deserialize, Serialize};

use self::history::HistoryConfig;
use self::server::ServerConfig;
use self::translator::TranslatorConfig;

pub mod history;
pub mod server;
pub mod translator;

pub use self::translator::Provider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub translator: TranslatorConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Build the config from process environment
    pub fn new() -> Self {
        Config {
            server: ServerConfig::new(),
            translator: TranslatorConfig::new(),
            history: HistoryConfig::new(),
        }
    }
}
