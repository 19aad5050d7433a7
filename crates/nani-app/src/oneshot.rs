//! `nani translate` and `nani history`: single translations from the shell.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local};
use nani_config::Config;
use nani_core::{HistoryEntry, HistoryLog, StreamingRelay};
use nani_translator::CompletionBackend;
use nani_types::TranslationRequest;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cli::{HistoryArgs, TranslateArgs};

pub async fn translate(config: &Config, args: TranslateArgs) -> anyhow::Result<()> {
    let backend = nani_translator::build_backend(&config.translator)
        .context("Failed to set up the translation backend")?;

    let mut stdout = tokio::io::stdout();
    translate_with(backend, config, args, &mut stdout).await
}

async fn translate_with<W>(
    backend: Arc<dyn CompletionBackend>,
    config: &Config,
    args: TranslateArgs,
    out: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request = TranslationRequest::new(args.text, args.to)?;
    eprintln!(
        "Translating to {}: \"{}\"",
        request.target_language().display_name(),
        request.text()
    );

    // An unreadable history is left untouched rather than overwritten
    let history_path = Path::new(&config.history.path);
    let mut history = if args.no_history {
        None
    } else {
        let log = HistoryLog::load(history_path, config.history.capacity).with_context(|| {
            format!(
                "Failed to read {} (use --no-history to skip it)",
                history_path.display()
            )
        })?;
        Some(log)
    };

    let entry_id = uuid::Uuid::new_v4().to_string();
    if let Some(log) = history.as_mut() {
        log.push(HistoryEntry::new(
            entry_id.clone(),
            request.text(),
            request.target_language(),
        ));
    }

    let outcome = stream_to(backend, request, out).await;

    if let Some(log) = history.as_mut() {
        if let Ok(text) = &outcome {
            log.update_result(&entry_id, text);
        }
        if let Err(e) = log.save(history_path) {
            tracing::warn!("Failed to save history to {}: {e}", history_path.display());
        }
    }

    outcome.map(|_| ())
}

/// Write every fragment to `out` as it arrives, returning the full text
async fn stream_to<W>(
    backend: Arc<dyn CompletionBackend>,
    request: TranslationRequest,
    out: &mut W,
) -> anyhow::Result<String>
where
    W: AsyncWrite + Unpin,
{
    let (mut outbound, _handle) = StreamingRelay::new(backend).begin(request, None);
    let mut text = String::new();

    while let Some(chunk) = outbound.next().await {
        let bytes = chunk.context("Translation failed")?;
        out.write_all(&bytes).await?;
        out.flush().await?;
        text.push_str(&String::from_utf8_lossy(&bytes));
    }

    out.write_all(b"\n").await?;
    out.flush().await?;

    Ok(text)
}

pub fn history(config: &Config, args: &HistoryArgs) -> anyhow::Result<()> {
    let path = Path::new(&config.history.path);
    let log = HistoryLog::load(path, config.history.capacity)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if log.is_empty() {
        println!("No translations yet");
        return Ok(());
    }

    for entry in log.entries().iter().take(args.limit) {
        let when = DateTime::from_timestamp_millis(entry.created_at)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!("[{when}] ({}) {}", entry.target_lang.code(), entry.text);
        match &entry.result {
            Some(result) => println!("    {result}"),
            None => println!("    (no result)"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nani_core::testing::{ScriptedBackend, Step};
    use nani_types::TargetLanguage;

    use super::*;

    #[tokio::test]
    async fn writes_fragments_and_trailing_newline() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Step::Text("こんにちは"),
            Step::Text("、世界"),
        ]));
        let request = TranslationRequest::new("Hello, world", TargetLanguage::Ja).unwrap();
        let mut out = Vec::new();

        let text = tokio::time::timeout(
            Duration::from_secs(2),
            stream_to(backend.clone(), request, &mut out),
        )
        .await
        .expect("timed out")
        .unwrap();

        assert_eq!(text, "こんにちは、世界");
        assert_eq!(String::from_utf8(out).unwrap(), "こんにちは、世界\n");
        assert!(backend.prompts()[0].ends_with("Hello, world"));
    }

    fn history_config(name: &str) -> Config {
        let mut config = Config::default();
        config.history.path = std::env::temp_dir()
            .join(format!("nani-history-{name}-{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned();
        config
    }

    fn args(text: &str) -> TranslateArgs {
        TranslateArgs {
            text: text.to_string(),
            to: TargetLanguage::Ja,
            no_history: false,
        }
    }

    #[tokio::test]
    async fn translation_is_recorded_in_history() {
        let config = history_config("record");
        let path = Path::new(&config.history.path);
        let _ = std::fs::remove_file(path);

        let backend = Arc::new(ScriptedBackend::new(vec![Step::Text("おはよう")]));
        let mut out = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            translate_with(backend, &config, args("Good morning"), &mut out),
        )
        .await
        .expect("timed out")
        .unwrap();

        let log = HistoryLog::load(path, config.history.capacity).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].text, "Good morning");
        assert_eq!(log.entries()[0].result.as_deref(), Some("おはよう"));
    }

    #[tokio::test]
    async fn corrupt_history_is_an_error_and_left_alone() {
        let config = history_config("corrupt");
        let path = Path::new(&config.history.path);
        std::fs::write(path, "not json").unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![Step::Text("おはよう")]));
        let mut out = Vec::new();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            translate_with(backend.clone(), &config, args("Good morning"), &mut out),
        )
        .await
        .expect("timed out");

        let contents = std::fs::read_to_string(path).unwrap();
        std::fs::remove_file(path).unwrap();

        assert!(result.is_err());
        assert_eq!(contents, "not json");
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Step::Text("partial"),
            Step::Fail("quota exceeded"),
        ]));
        let request = TranslationRequest::new("Hello", TargetLanguage::Ja).unwrap();
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(2), stream_to(backend, request, &mut out))
            .await
            .expect("timed out");

        assert!(result.is_err());
        assert_eq!(String::from_utf8(out).unwrap(), "partial");
    }
}
