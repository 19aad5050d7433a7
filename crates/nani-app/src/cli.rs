use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nani_types::TargetLanguage;

#[derive(Debug, Parser)]
#[command(name = "nani", version, about = "Streaming translation relay")]
pub struct Cli {
    /// JSON config file; the environment is used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Translate once and stream the result to stdout
    Translate(TranslateArgs),
    /// Show the local translation history
    History(HistoryArgs),
}

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct TranslateArgs {
    #[arg(default_value = "Hello, world!")]
    pub text: String,

    /// Target language
    #[arg(long, default_value = "ja", value_parser = parse_language)]
    pub to: TargetLanguage,

    /// Do not record the translation in the history file
    #[arg(long)]
    pub no_history: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

fn parse_language(code: &str) -> Result<TargetLanguage, String> {
    code.parse().map_err(|e: nani_types::ParseLanguageError| e.to_string())
}
