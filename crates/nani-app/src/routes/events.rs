use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use nani_core::{NaniError, RelayEvent};
use serde_json::{Value, json};

use super::error::ApiError;
use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn json_event(name: &str, payload: Value) -> Event {
    Event::default().event(name).data(payload.to_string())
}

fn relay_event(event: &RelayEvent) -> Event {
    match event {
        RelayEvent::Fragment(text) => json_event("fragment", json!({ "text": text })),
        RelayEvent::Completed { elapsed } => {
            json_event("done", json!({ "elapsedSeconds": elapsed.as_secs_f64() }))
        }
        RelayEvent::Failed(e) => json_event("error", json!({ "error": e.to_string() })),
    }
}

/// GET /translations/:id/events
///
/// Follows the relay currently translating a record: a `snapshot` with the
/// text so far, then every new `fragment`, then `done` or `error`.
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<SseStream>, ApiError> {
    let record = state.store.get(&id)?;

    let stream: SseStream = match state.relays.get(&id) {
        Some(handle) => {
            let (tx, rx) = kanal::unbounded_async::<RelayEvent>();
            let (snapshot, subscription) = handle.subscribe_with_snapshot(move |event| {
                let _ = tx.try_send(event.clone());
            });

            tracing::debug!("[EVENTS] {id} subscribed at {} chars", snapshot.chars().count());

            Box::pin(async_stream::stream! {
                let _subscription = subscription;
                yield Ok::<Event, Infallible>(json_event("snapshot", json!({ "text": snapshot })));

                while let Ok(event) = rx.recv().await {
                    let terminal = event.is_terminal();
                    yield Ok(relay_event(&event));
                    if terminal {
                        break;
                    }
                }
            })
        }
        None => {
            let Some(result) = record.result else {
                return Err(NaniError::NotFound(format!("no active translation for {id}")).into());
            };

            Box::pin(async_stream::stream! {
                yield Ok::<Event, Infallible>(json_event("snapshot", json!({ "text": result })));
                yield Ok(json_event("done", json!({ "elapsedSeconds": Value::Null })));
            })
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

