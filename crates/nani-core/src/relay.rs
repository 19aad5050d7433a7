//! Streaming relay.
//!
//! One relay bridges a single completion stream to three consumers: the
//! outbound byte stream of an HTTP response, any number of in-process
//! subscribers, and optionally a [`ResultSink`] that receives the full text
//! once the stream completed. Consumption starts as soon as the relay is
//! begun, whether or not anybody reads the outbound side.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use kanal::{AsyncReceiver, AsyncSender};
use nani_translator::{CompletionBackend, build_prompt};
use nani_types::TranslationRequest;

use crate::error::NaniError;

/// Notification handed to subscribers
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Fragment(String),
    Completed { elapsed: Duration },
    Failed(NaniError),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Fragment(_))
    }
}

/// Receives the accumulated text of a successfully completed stream
pub trait ResultSink: Send + Sync {
    /// `generation` identifies the record the stream was started for; a sink
    /// must not attach the text to a newer record stored under the same id.
    fn attach_result(&self, id: &str, generation: u64, text: String) -> bool;
}

/// Where to store the result of a record-bound relay
#[derive(Clone)]
pub struct Persist {
    pub sink: Arc<dyn ResultSink>,
    pub id: String,
    pub generation: u64,
}

pub type SubscriberFn = dyn Fn(&RelayEvent) + Send + Sync;

enum Outbound {
    Chunk(Bytes),
    End,
    Failed(NaniError),
}

/// Encoded fragments for the HTTP response, in arrival order
pub struct OutboundStream {
    rx: AsyncReceiver<Outbound>,
    done: bool,
}

impl OutboundStream {
    /// Next chunk; `Some(Err(_))` is always the last item of a failed stream
    pub async fn next(&mut self) -> Option<Result<Bytes, NaniError>> {
        if self.done {
            return None;
        }

        match self.rx.recv().await {
            Ok(Outbound::Chunk(bytes)) => Some(Ok(bytes)),
            Ok(Outbound::End) => {
                self.done = true;
                None
            }
            Ok(Outbound::Failed(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Err(_) => {
                self.done = true;
                Some(Err(NaniError::Internal(
                    "relay stopped without completing".to_string(),
                )))
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, NaniError>> + Send {
        let mut outbound = self;
        async_stream::stream! {
            while let Some(item) = outbound.next().await {
                yield item;
            }
        }
    }
}

struct RelayState {
    text: String,
    subscribers: Vec<(u64, Weak<SubscriberFn>)>,
    next_subscriber: u64,
    outcome: Option<RelayEvent>,
}

impl RelayState {
    fn live_subscribers(&mut self) -> Vec<Arc<SubscriberFn>> {
        self.subscribers.retain(|(_, s)| s.strong_count() > 0);
        self.subscribers.iter().filter_map(|(_, s)| s.upgrade()).collect()
    }
}

struct RelayShared {
    record_id: Option<String>,
    state: Mutex<RelayState>,
}

impl RelayShared {
    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append and capture the audience under one lock, so a concurrent
    /// `subscribe_with_snapshot` sees the fragment exactly once
    fn accept(&self, fragment: &str) -> Vec<Arc<SubscriberFn>> {
        let mut state = self.lock();
        state.text.push_str(fragment);
        state.live_subscribers()
    }

    fn finish(&self, outcome: RelayEvent) -> (String, Vec<Arc<SubscriberFn>>) {
        let mut state = self.lock();
        state.outcome = Some(outcome);
        let subscribers = state.live_subscribers();
        state.subscribers.clear();
        (state.text.clone(), subscribers)
    }
}

/// Starts relays against one completion backend
#[derive(Clone)]
pub struct StreamingRelay {
    backend: Arc<dyn CompletionBackend>,
}

impl StreamingRelay {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Spawn the relay task and hand back its two consumer-facing ends
    pub fn begin(
        &self,
        request: TranslationRequest,
        persist: Option<Persist>,
    ) -> (OutboundStream, RelayHandle) {
        let (tx, rx) = kanal::unbounded_async();

        let shared = Arc::new(RelayShared {
            record_id: persist.as_ref().map(|p| p.id.clone()),
            state: Mutex::new(RelayState {
                text: String::new(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                outcome: None,
            }),
        });

        tokio::spawn(run(
            self.backend.clone(),
            request,
            persist,
            shared.clone(),
            tx,
        ));

        (OutboundStream { rx, done: false }, RelayHandle { shared })
    }
}

async fn run(
    backend: Arc<dyn CompletionBackend>,
    request: TranslationRequest,
    persist: Option<Persist>,
    shared: Arc<RelayShared>,
    outbound: AsyncSender<Outbound>,
) {
    let started = Instant::now();
    let label = shared.record_id.as_deref().unwrap_or("-").to_string();
    let prompt = build_prompt(request.text(), request.target_language());

    tracing::info!(
        "[RELAY {label}] Starting translation to {} ({} chars)",
        request.target_language(),
        request.text().chars().count()
    );

    let mut outbound_open = true;
    let mut fragments_seen = 0usize;

    let failure = match backend.stream_completion(&prompt).await {
        Ok(mut fragments) => {
            let mut failure = None;
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) if fragment.is_empty() => {}
                    Ok(fragment) => {
                        fragments_seen += 1;
                        tracing::debug!("[RELAY {label}] fragment #{fragments_seen}: {} bytes", fragment.len());

                        let subscribers = shared.accept(&fragment);

                        if outbound_open
                            && outbound
                                .send(Outbound::Chunk(Bytes::copy_from_slice(fragment.as_bytes())))
                                .await
                                .is_err()
                        {
                            tracing::debug!("[RELAY {label}] HTTP consumer went away, still relaying");
                            outbound_open = false;
                        }

                        let event = RelayEvent::Fragment(fragment);
                        for subscriber in subscribers {
                            subscriber(&event);
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            failure
        }
        Err(e) => Some(e),
    };

    match failure {
        None => {
            let elapsed = started.elapsed();

            // Persist before the relay reports itself finished
            if let Some(persist) = &persist {
                let text = shared.lock().text.clone();
                persist.sink.attach_result(&persist.id, persist.generation, text);
            }

            let (text, subscribers) = shared.finish(RelayEvent::Completed { elapsed });

            if outbound_open {
                let _ = outbound.send(Outbound::End).await;
            }

            let event = RelayEvent::Completed { elapsed };
            for subscriber in subscribers {
                subscriber(&event);
            }

            tracing::info!(
                "[RELAY {label}] Completed: {fragments_seen} fragments, {} chars in {:.2}s",
                text.chars().count(),
                elapsed.as_secs_f64()
            );
        }
        Some(e) => {
            tracing::error!("[RELAY {label}] Upstream failed after {fragments_seen} fragments: {e}");

            let error = NaniError::from(e);
            let (_, subscribers) = shared.finish(RelayEvent::Failed(error.clone()));

            if outbound_open {
                let _ = outbound.send(Outbound::Failed(error.clone())).await;
            }

            let event = RelayEvent::Failed(error);
            for subscriber in subscribers {
                subscriber(&event);
            }
        }
    }
}

/// In-process view of a running (or finished) relay
#[derive(Clone)]
pub struct RelayHandle {
    shared: Arc<RelayShared>,
}

impl RelayHandle {
    /// Record the relay reports to, if any
    pub fn record_id(&self) -> Option<&str> {
        self.shared.record_id.as_deref()
    }

    /// Text accumulated so far
    pub fn latest_text(&self) -> String {
        self.shared.lock().text.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().outcome.is_some()
    }

    /// Terminal event once the relay finished
    pub fn outcome(&self) -> Option<RelayEvent> {
        self.shared.lock().outcome.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().live_subscribers().len()
    }

    /// Receive events emitted from now on. Past fragments are not replayed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RelayEvent) + Send + Sync + 'static,
    {
        self.subscribe_with_snapshot(callback).1
    }

    /// Like [`subscribe`](Self::subscribe), also returning the text
    /// accumulated up to the moment of attachment. Snapshot plus later
    /// fragments always equal the full stream.
    ///
    /// On a finished relay the callback immediately gets the terminal event.
    pub fn subscribe_with_snapshot<F>(&self, callback: F) -> (String, Subscription)
    where
        F: Fn(&RelayEvent) + Send + Sync + 'static,
    {
        let callback: Arc<SubscriberFn> = Arc::new(callback);

        let (snapshot, id, finished) = {
            let mut state = self.shared.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;

            let finished = state.outcome.clone();
            if finished.is_none() {
                state.subscribers.push((id, Arc::downgrade(&callback)));
            }

            (state.text.clone(), id, finished)
        };

        if let Some(outcome) = finished {
            callback(&outcome);
        }

        let subscription = Subscription {
            id,
            _callback: callback,
            relay: Arc::downgrade(&self.shared),
        };

        (snapshot, subscription)
    }
}

/// Keeps a subscriber registered; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    _callback: Arc<SubscriberFn>,
    relay: Weak<RelayShared>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.relay.upgrade() {
            shared.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nani_types::TargetLanguage;
    use tokio::time::timeout;

    use super::*;
    use crate::store::TranslationStore;
    use crate::testing::{ChannelBackend, ScriptedBackend, Step, wait_until};

    fn request() -> TranslationRequest {
        TranslationRequest::new("Hello, world!", TargetLanguage::Ja).unwrap()
    }

    async fn drain(mut outbound: OutboundStream) -> (String, Option<NaniError>) {
        let mut body = Vec::new();
        let mut error = None;
        while let Some(item) = outbound.next().await {
            match item {
                Ok(bytes) => body.extend_from_slice(&bytes),
                Err(e) => error = Some(e),
            }
        }
        (String::from_utf8(body).unwrap(), error)
    }

    fn recorder() -> (Arc<Mutex<Vec<RelayEvent>>>, impl Fn(&RelayEvent) + Send + Sync + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |e: &RelayEvent| sink.lock().unwrap().push(e.clone()))
    }

    fn fragments_of(events: &[RelayEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                RelayEvent::Fragment(f) => Some(f.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn completed_stream_reaches_every_consumer() {
        let (backend, feed) = ChannelBackend::new();
        let store = Arc::new(TranslationStore::new());
        store.create("t1", "Hello, world!", TargetLanguage::Ja);

        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(
            request(),
            Some(store.bind("t1").unwrap().1),
        );
        assert_eq!(handle.record_id(), Some("t1"));

        let (events, callback) = recorder();
        let _subscription = handle.subscribe(callback);

        for fragment in ["こんにちは", "", "、", "世界！"] {
            feed.send(Ok(fragment.to_string())).unwrap();
        }
        drop(feed);

        let (body, error) = timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();
        assert!(error.is_none());
        assert_eq!(body, "こんにちは、世界！");

        wait_until(|| events.lock().unwrap().len() == 4).await;
        let events = events.lock().unwrap().clone();
        assert_eq!(fragments_of(&events), body);
        assert!(matches!(events.last(), Some(RelayEvent::Completed { .. })));

        assert_eq!(store.get("t1").unwrap().result.as_deref(), Some(body.as_str()));
        assert_eq!(handle.latest_text(), body);
    }

    #[tokio::test]
    async fn recreated_record_does_not_get_the_old_result() {
        let (backend, feed) = ChannelBackend::new();
        let store = Arc::new(TranslationStore::new());
        store.create("r", "Hello", TargetLanguage::Ja);

        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(request(), Some(store.bind("r").unwrap().1));

        feed.send(Ok("こんにちは".into())).unwrap();
        wait_until(|| handle.latest_text() == "こんにちは").await;

        store.create("r", "Goodbye", TargetLanguage::En);
        drop(feed);

        let (body, error) = timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();
        assert!(error.is_none());
        assert_eq!(body, "こんにちは");
        wait_until(|| handle.is_finished()).await;

        let record = store.get("r").unwrap();
        assert_eq!(record.text, "Goodbye");
        assert_eq!(record.target_lang, TargetLanguage::En);
        assert_eq!(record.result, None);
    }

    /// Remembers whether the relay already looked finished when the
    /// result arrived
    #[derive(Default)]
    struct WatchingSink {
        handle: Mutex<Option<RelayHandle>>,
        finished_at_attach: Mutex<Option<bool>>,
    }

    impl ResultSink for WatchingSink {
        fn attach_result(&self, _id: &str, _generation: u64, _text: String) -> bool {
            let finished = self.handle.lock().unwrap().as_ref().map(|h| h.is_finished());
            *self.finished_at_attach.lock().unwrap() = finished;
            true
        }
    }

    #[tokio::test]
    async fn result_is_persisted_before_the_relay_reports_finished() {
        let (backend, feed) = ChannelBackend::new();
        let sink = Arc::new(WatchingSink::default());

        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(
            request(),
            Some(Persist {
                sink: sink.clone(),
                id: "t1".to_string(),
                generation: 0,
            }),
        );
        *sink.handle.lock().unwrap() = Some(handle.clone());

        feed.send(Ok("done".into())).unwrap();
        drop(feed);
        timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();

        wait_until(|| handle.is_finished()).await;
        assert_eq!(*sink.finished_at_attach.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_remaining_fragments() {
        let (backend, feed) = ChannelBackend::new();
        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(request(), None);

        feed.send(Ok("a".into())).unwrap();
        feed.send(Ok("b".into())).unwrap();
        wait_until(|| handle.latest_text() == "ab").await;

        let (events, callback) = recorder();
        let (snapshot, _subscription) = handle.subscribe_with_snapshot(callback);
        assert_eq!(snapshot, "ab");

        feed.send(Ok("c".into())).unwrap();
        feed.send(Ok("d".into())).unwrap();
        drop(feed);

        let (body, _) = timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();
        assert_eq!(body, "abcd");

        wait_until(|| events.lock().unwrap().len() == 3).await;
        let events = events.lock().unwrap().clone();
        assert_eq!(fragments_of(&events), "cd");
        assert_eq!(format!("{snapshot}{}", fragments_of(&events)), body);
    }

    #[tokio::test]
    async fn failure_mid_stream_skips_the_sink() {
        let backend = ScriptedBackend::new(vec![
            Step::Text("partial "),
            Step::Text("text"),
            Step::Fail("quota exceeded"),
        ]);
        let store = Arc::new(TranslationStore::new());
        store.create("t1", "Hello", TargetLanguage::Ja);

        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(
            request(),
            Some(store.bind("t1").unwrap().1),
        );

        let (body, error) = timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();
        assert_eq!(body, "partial text");
        assert!(matches!(error, Some(NaniError::Upstream(_))));

        wait_until(|| handle.is_finished()).await;
        assert!(matches!(handle.outcome(), Some(RelayEvent::Failed(_))));
        assert_eq!(store.get("t1").unwrap().result, None);

        // Attaching after the end still yields the terminal failure
        let (events, callback) = recorder();
        let (snapshot, _subscription) = handle.subscribe_with_snapshot(callback);
        assert_eq!(snapshot, "partial text");
        let events = events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RelayEvent::Failed(_)));
    }

    #[tokio::test]
    async fn failure_before_first_fragment() {
        let backend = ScriptedBackend::failing_to_open("invalid key");
        let relay = StreamingRelay::new(Arc::new(backend));
        let (mut outbound, handle) = relay.begin(request(), None);

        let first = timeout(Duration::from_secs(2), outbound.next()).await.unwrap();
        assert!(matches!(first, Some(Err(NaniError::Upstream(_)))));
        assert!(outbound.next().await.is_none());
        assert_eq!(handle.latest_text(), "");
    }

    #[tokio::test]
    async fn relay_keeps_going_without_an_http_reader() {
        let backend = ScriptedBackend::new(vec![Step::Text("one"), Step::Text("two")]);
        let store = Arc::new(TranslationStore::new());
        store.create("t1", "Hello", TargetLanguage::En);

        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(
            request(),
            Some(store.bind("t1").unwrap().1),
        );
        drop(outbound);

        wait_until(|| store.get("t1").unwrap().result.is_some()).await;
        assert!(handle.is_finished());
        assert_eq!(store.get("t1").unwrap().result.as_deref(), Some("onetwo"));
    }

    #[tokio::test]
    async fn unsubscribed_callbacks_stop_receiving() {
        let (backend, feed) = ChannelBackend::new();
        let relay = StreamingRelay::new(Arc::new(backend));
        let (outbound, handle) = relay.begin(request(), None);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = handle.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.subscriber_count(), 1);

        feed.send(Ok("a".into())).unwrap();
        wait_until(|| calls.load(Ordering::SeqCst) == 1).await;

        subscription.unsubscribe();
        assert_eq!(handle.subscriber_count(), 0);

        feed.send(Ok("b".into())).unwrap();
        drop(feed);
        let (body, _) = timeout(Duration::from_secs(2), drain(outbound)).await.unwrap();
        assert_eq!(body, "ab");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_relays_are_independent() {
        let store = Arc::new(TranslationStore::new());
        store.create("ok", "Hello", TargetLanguage::Ja);
        store.create("bad", "Hello", TargetLanguage::Ja);

        let good = StreamingRelay::new(Arc::new(ScriptedBackend::new(vec![
            Step::Text("こん"),
            Step::Text("にちは"),
        ])));
        let broken = StreamingRelay::new(Arc::new(ScriptedBackend::new(vec![
            Step::Text("x"),
            Step::Fail("network reset"),
        ])));

        let (good_out, _) = good.begin(
            request(),
            Some(store.bind("ok").unwrap().1),
        );
        let (bad_out, _) = broken.begin(
            request(),
            Some(store.bind("bad").unwrap().1),
        );

        let ((good_body, good_err), (_, bad_err)) = timeout(
            Duration::from_secs(2),
            futures::future::join(drain(good_out), drain(bad_out)),
        )
        .await
        .unwrap();

        assert!(good_err.is_none());
        assert_eq!(good_body, "こんにちは");
        assert!(bad_err.is_some());
        assert_eq!(store.get("ok").unwrap().result.as_deref(), Some("こんにちは"));
        assert_eq!(store.get("bad").unwrap().result, None);
    }
}
