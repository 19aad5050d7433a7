use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nani_types::{TargetLanguage, TranslationRecord};

use crate::error::NaniError;
use crate::relay::{Persist, ResultSink};

struct Entry {
    record: TranslationRecord,
    /// Insertion order, breaks `created_at` ties. Also the generation of the
    /// record: re-creating an id gives it a new one.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Entry>,
    next_seq: u64,
}

/// Process-local translation records keyed by id
#[derive(Default)]
pub struct TranslationStore {
    inner: RwLock<Inner>,
}

impl TranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record. An existing record with the same id is
    /// replaced and returned.
    pub fn create(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        target_lang: TargetLanguage,
    ) -> Option<TranslationRecord> {
        let id = id.into();
        let record = TranslationRecord::new(id.clone(), text.into(), target_lang);

        let mut inner = self.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let replaced = inner
            .records
            .insert(id.clone(), Entry { record, seq })
            .map(|e| e.record);

        if replaced.is_some() {
            tracing::warn!("Translation {id} already existed, overwritten");
        }

        replaced
    }

    pub fn get(&self, id: &str) -> Result<TranslationRecord, NaniError> {
        self.read()
            .records
            .get(id)
            .map(|e| e.record.clone())
            .ok_or_else(|| NaniError::NotFound(id.to_string()))
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<TranslationRecord> {
        let inner = self.read();
        let mut entries: Vec<&Entry> = inner.records.values().collect();
        entries.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Current record for `id` plus a [`Persist`] bound to this exact
    /// generation of it. A result for a record re-created in the meantime
    /// is dropped.
    pub fn bind(self: &Arc<Self>, id: &str) -> Result<(TranslationRecord, Persist), NaniError> {
        let inner = self.read();
        let entry = inner
            .records
            .get(id)
            .ok_or_else(|| NaniError::NotFound(id.to_string()))?;

        let persist = Persist {
            sink: self.clone(),
            id: id.to_string(),
            generation: entry.seq,
        };

        Ok((entry.record.clone(), persist))
    }

    /// Set the result of a pending record. Unknown ids and records that
    /// already hold a result are left alone.
    pub fn attach_result(&self, id: &str, text: String) -> bool {
        self.attach(id, None, text)
    }

    fn attach(&self, id: &str, generation: Option<u64>, text: String) -> bool {
        let mut inner = self.write();

        match inner.records.get_mut(id) {
            Some(entry) if generation.is_some_and(|g| g != entry.seq) => {
                tracing::warn!("Translation {id} was re-created while streaming, dropping the stale result");
                false
            }
            Some(entry) if entry.record.result.is_none() => {
                entry.record.result = Some(text);
                true
            }
            Some(_) => {
                tracing::debug!("Translation {id} already has a result, keeping the first");
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultSink for TranslationStore {
    fn attach_result(&self, id: &str, generation: u64, text: String) -> bool {
        self.attach(id, Some(generation), text)
    }
}
