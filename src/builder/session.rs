use std::collections::HashMap;

use crate::node::NodeKind;

/// Per-run cache of nodes built so far.
///
/// Each unit of work (one file, or the schema) records into a pending layer.
/// `commit` merges it once the unit's transaction commits; `rollback` drops it
/// when the transaction is rolled back, so the cache never names rows that
/// were not persisted.
#[derive(Debug, Default)]
pub struct BuildSession {
    committed: HashMap<(NodeKind, String), i64>,
    pending: HashMap<(NodeKind, String), i64>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, kind: NodeKind, key: &str) -> Option<i64> {
        let k = (kind, key.to_string());
        self.pending
            .get(&k)
            .or_else(|| self.committed.get(&k))
            .copied()
    }

    /// Whether `(kind, key)` was built earlier in this run
    pub fn is_built(&self, kind: NodeKind, key: &str) -> bool {
        self.lookup(kind, key).is_some()
    }

    pub fn record(&mut self, kind: NodeKind, key: &str, id: i64) {
        self.pending.insert((kind, key.to_string()), id);
    }

    pub fn commit(&mut self) {
        self.committed.extend(self.pending.drain());
    }

    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    /// Forget a key everywhere (the node was deleted)
    pub fn forget(&mut self, kind: NodeKind, key: &str) {
        let k = (kind, key.to_string());
        self.pending.remove(&k);
        self.committed.remove(&k);
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.pending.is_empty()
    }
}
