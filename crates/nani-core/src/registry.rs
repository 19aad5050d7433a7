use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::relay::RelayHandle;

/// Relays bound to stored records, by record id.
///
/// Finished relays stay reachable until the next insert prunes them, so a
/// consumer arriving right after completion still gets the terminal event.
#[derive(Default)]
pub struct RelayRegistry {
    relays: Mutex<HashMap<String, RelayHandle>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` under `id`, replacing any previous relay for it
    pub fn insert(&self, id: impl Into<String>, handle: RelayHandle) -> Option<RelayHandle> {
        let mut relays = self.lock();
        relays.retain(|_, h| !h.is_finished());
        relays.insert(id.into(), handle)
    }

    pub fn get(&self, id: &str) -> Option<RelayHandle> {
        self.lock().get(id).cloned()
    }

    /// Relays still streaming
    pub fn active_count(&self) -> usize {
        self.lock().values().filter(|h| !h.is_finished()).count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RelayHandle>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nani_types::{TargetLanguage, TranslationRequest};

    use super::*;
    use crate::relay::StreamingRelay;
    use crate::testing::{ChannelBackend, ScriptedBackend, Step, wait_until};

    fn request() -> TranslationRequest {
        TranslationRequest::new("Hello", TargetLanguage::Ja).unwrap()
    }

    #[tokio::test]
    async fn finished_relays_are_pruned_on_insert() {
        let registry = RelayRegistry::new();

        let done = StreamingRelay::new(Arc::new(ScriptedBackend::new(vec![Step::Text("x")])));
        let (_out, first) = done.begin(request(), None);
        registry.insert("a", first.clone());
        wait_until(|| first.is_finished()).await;
        assert!(registry.get("a").is_some());
        assert_eq!(registry.active_count(), 0);

        let (backend, feed) = ChannelBackend::new();
        let running = StreamingRelay::new(Arc::new(backend));
        let (_out, second) = running.begin(request(), None);
        registry.insert("b", second);

        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
        assert_eq!(registry.active_count(), 1);
        drop(feed);
    }
}
