//! Per-key pending-work queues.
//!
//! A [`Consumer`] holds work for one table or event stream, grouped by key.
//! Keys are drained in key order; entries of one key always come out in the
//! order they went in. Two disciplines are supported:
//!
//! - [`QueueDiscipline::Merge`]: configuration semantics. A newer entry may
//!   be folded into the last pending entry of the same key, and an entry that
//!   supersedes pending work (a DEL) discards it.
//! - [`QueueDiscipline::Fifo`]: event semantics. Nothing is merged or
//!   dropped.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

/// Operation type of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

impl Operation {
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair of a table entry.
pub type FieldValue = (String, String);

/// Something a [`Consumer`] can queue.
pub trait QueueEntry: Debug {
    /// Key the entry is grouped and ordered under.
    fn key(&self) -> &str;

    /// Returns true if this entry makes every pending entry of the same key
    /// obsolete. Only consulted under [`QueueDiscipline::Merge`].
    fn supersedes_pending(&self) -> bool {
        false
    }

    /// Folds `newer` into `self`, or hands it back when the two cannot be
    /// combined. Only consulted under [`QueueDiscipline::Merge`].
    fn merge(&mut self, newer: Self) -> Result<(), Self>
    where
        Self: Sized,
    {
        Err(newer)
    }
}

/// Key, operation and field-values of one table change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldsValues {
    /// The key (e.g., "PortChannel1", "PortChannel1|Ethernet0")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }
}

impl QueueEntry for KeyOpFieldsValues {
    fn key(&self) -> &str {
        &self.key
    }

    fn supersedes_pending(&self) -> bool {
        self.op.is_del()
    }

    fn merge(&mut self, newer: Self) -> Result<(), Self> {
        if self.op != Operation::Set || newer.op != Operation::Set {
            return Err(newer);
        }
        for (field, value) in newer.fvs {
            match self.fvs.iter_mut().find(|(f, _)| *f == field) {
                Some(existing) => existing.1 = value,
                None => self.fvs.push((field, value)),
            }
        }
        Ok(())
    }
}

/// How a [`Consumer`] treats several pending entries of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueDiscipline {
    /// Merge SETs, let DELs discard pending work.
    #[default]
    Merge,
    /// Keep every entry, in arrival order.
    Fifo,
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Table or stream name (e.g., "PORTCHANNEL", "LACP_EVENTS")
    pub table_name: String,
    /// Queue discipline
    pub discipline: QueueDiscipline,
}

impl ConsumerConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            discipline: QueueDiscipline::Merge,
        }
    }

    pub fn with_discipline(mut self, discipline: QueueDiscipline) -> Self {
        self.discipline = discipline;
        self
    }
}

/// Pending-work queue for one table or event stream.
pub struct Consumer<E = KeyOpFieldsValues> {
    config: ConsumerConfig,
    to_sync: BTreeMap<String, VecDeque<E>>,
    pending_count: usize,
}

impl<E: QueueEntry> Consumer<E> {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Queues entries in order.
    pub fn add_to_sync(&mut self, entries: impl IntoIterator<Item = E>) {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Queues one entry according to the consumer's discipline.
    pub fn push(&mut self, entry: E) {
        let queue = self.to_sync.entry(entry.key().to_string()).or_default();

        if self.config.discipline == QueueDiscipline::Merge {
            if entry.supersedes_pending() {
                self.pending_count -= queue.len();
                queue.clear();
            } else if let Some(last) = queue.back_mut() {
                match last.merge(entry) {
                    Ok(()) => return,
                    Err(entry) => {
                        queue.push_back(entry);
                        self.pending_count += 1;
                        return;
                    }
                }
            }
        }

        queue.push_back(entry);
        self.pending_count += 1;
    }

    /// Removes and returns all pending entries, key by key, each key's
    /// entries in arrival order.
    pub fn drain(&mut self) -> Vec<E> {
        let mut result = Vec::with_capacity(self.pending_count);
        for (_key, queue) in std::mem::take(&mut self.to_sync) {
            result.extend(queue);
        }
        self.pending_count = 0;
        result
    }

    /// Puts an entry back at the head of its key's queue so it is seen
    /// before anything that arrived after it.
    pub fn retry(&mut self, entry: E) {
        let queue = self.to_sync.entry(entry.key().to_string()).or_default();
        queue.push_front(entry);
        self.pending_count += 1;
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue
                    .iter()
                    .map(move |e| format!("{}:{}: {:?}", self.config.table_name, key, e))
            })
            .collect()
    }
}
