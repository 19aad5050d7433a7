//! Completion backends with scripted output, for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nani_translator::{CompletionBackend, FragmentStream, ProviderMetadata, TranslateError};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Text(&'static str),
    Fail(&'static str),
}

/// Replays the same steps on every call
pub struct ScriptedBackend {
    steps: Vec<Step>,
    open_error: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            open_error: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fails before any fragment is produced
    pub fn failing_to_open(message: &'static str) -> Self {
        Self {
            steps: Vec::new(),
            open_error: Some(message),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, TranslateError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(message) = self.open_error {
            return Err(TranslateError::ApiError(message.to_string()));
        }

        let items: Vec<Result<String, TranslateError>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Text(text) => Ok(text.to_string()),
                Step::Fail(message) => Err(TranslateError::ApiError(message.to_string())),
            })
            .collect();

        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: "Scripted".to_string(),
            model: "script".to_string(),
        }
    }
}

pub type Feed = UnboundedSender<Result<String, TranslateError>>;

/// Single-use backend whose fragments are pushed by the test.
/// Dropping the feed completes the stream.
pub struct ChannelBackend {
    rx: Mutex<Option<UnboundedReceiver<Result<String, TranslateError>>>>,
}

impl ChannelBackend {
    pub fn new() -> (Self, Feed) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl CompletionBackend for ChannelBackend {
    async fn stream_completion(&self, _prompt: &str) -> Result<FragmentStream, TranslateError> {
        let mut rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TranslateError::ApiError("stream already consumed".to_string()))?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
        }))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: "Channel".to_string(),
            model: "feed".to_string(),
        }
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(reached.is_ok(), "condition not reached within 2s");
}
