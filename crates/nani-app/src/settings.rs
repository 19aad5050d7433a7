use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use nani_config::Config;

use crate::cli::ServeArgs;

/// Load the config from a JSON file, or from the environment when no file
/// is given. A file without an API key still picks one up from the env.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("Loading config from environment");
        return Ok(Config::new());
    };

    tracing::info!("Loading config from {}", path.display());
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut config: Config = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if config.translator.api_key.is_empty() {
        config.translator.api_key =
            env::var(config.translator.provider.api_key_var()).unwrap_or_default();
    }

    Ok(config)
}

pub fn apply_serve_args(config: &mut Config, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
}
