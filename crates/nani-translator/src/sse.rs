//! Server-sent events decoding for streaming completion responses.
//!
//! Both providers answer with `text/event-stream` bodies. Network chunks do
//! not line up with events, so bytes are buffered until a blank line closes
//! an event; only then is the event decoded as UTF-8.

use std::time::Duration;

use futures::StreamExt;

use crate::{FragmentStream, TranslateError};

/// What one event payload means to the fragment stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    /// Keep-alive, metadata or an empty delta
    Skip,
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the `data` of every event completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(data) = event_data(&block[..pos]) {
                events.push(data);
            }
        }

        events
    }

    /// Flush a trailing event that was never closed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        let block = std::mem::take(&mut self.buffer);
        event_data(&block)
    }
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let mut data: Option<String> = None;

    for line in text.lines() {
        // Comments, `event:`, `id:` and `retry:` lines carry nothing we use
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let value = rest.strip_prefix(' ').unwrap_or(rest);

        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    data
}

/// Turn an SSE response body into fragments using a provider-specific parser
pub(crate) fn fragments<F>(
    response: reqwest::Response,
    idle_timeout: Option<Duration>,
    parse: F,
) -> FragmentStream
where
    F: Fn(&str) -> Result<Delta, TranslateError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        'read: loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(TranslateError::IdleTimeout(limit));
                        break 'read;
                    }
                },
                None => body.next().await,
            };

            let (events, finished) = match next {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => {
                    yield Err(TranslateError::from(e));
                    break 'read;
                }
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for data in events {
                match parse(&data) {
                    Ok(Delta::Text(text)) => {
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Ok(Delta::Skip) => {}
                    Ok(Delta::Done) => break 'read,
                    Err(e) => {
                        yield Err(e);
                        break 'read;
                    }
                }
            }

            if finished {
                break;
            }
        }
    })
}
