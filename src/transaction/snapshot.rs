/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A transaction's private overlay of pending file mutations.
//!
//! A [`Snapshot`] never writes to storage. It keeps at most one [`Delta`] per file, and every read
//! through the snapshot sees the delta (if any) layered over the file's current content in storage.
//! At commit time the deltas are [flattened](Snapshot::flatten) into the final content of every file
//! the transaction wrote.

use std::collections::BTreeMap;

use crate::{
    storage::Storage,
    types::{
        data_types::{NodeAddress, SessionId, TransactionId},
        value::Writes,
    },
};

use super::messages::{OpResult, Operation};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    /// Bytes to add to the end of the file's content in storage.
    Append(Vec<u8>),
    /// The file's new content.
    Overwrite(Vec<u8>),
    /// The file is deleted.
    Delete,
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    session: SessionId,
    origin: NodeAddress,
    txn: TransactionId,
    base: Option<SessionId>,
    deltas: BTreeMap<String, Delta>,
}

impl Snapshot {
    /// Open a snapshot for transaction `txn` of client `origin`. `base` is the last committed session
    /// as of now.
    pub fn new(
        session: SessionId,
        origin: NodeAddress,
        txn: TransactionId,
        base: Option<SessionId>,
    ) -> Self {
        Self {
            session,
            origin,
            txn,
            base,
            deltas: BTreeMap::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn origin(&self) -> NodeAddress {
        self.origin
    }

    pub fn txn(&self) -> TransactionId {
        self.txn
    }

    pub fn base(&self) -> Option<SessionId> {
        self.base
    }

    /// Whether the snapshot wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn delta(&self, filename: &str) -> Option<&Delta> {
        self.deltas.get(filename)
    }

    /// Whether a value committed after this snapshot was opened.
    pub fn is_stale(&self, last_committed: SessionId) -> bool {
        Some(last_committed) > self.base
    }

    pub fn exists<S: Storage>(&self, filename: &str, storage: &S) -> bool {
        match self.deltas.get(filename) {
            Some(Delta::Delete) => false,
            Some(_) => true,
            None => storage.exists(filename),
        }
    }

    pub fn read<S: Storage>(&self, filename: &str, storage: &S) -> Option<Vec<u8>> {
        match self.deltas.get(filename) {
            Some(Delta::Delete) => None,
            Some(Delta::Overwrite(content)) => Some(content.clone()),
            Some(Delta::Append(data)) => Some(appended(filename, data, storage)),
            None => storage.read(filename).map(|(content, _)| content),
        }
    }

    /// Create an empty file. Fails if the file exists. A file deleted in this snapshot can be
    /// created again.
    pub fn create<S: Storage>(&mut self, filename: &str, storage: &S) -> bool {
        if self.exists(filename, storage) {
            return false;
        }
        self.deltas
            .insert(filename.to_string(), Delta::Overwrite(Vec::new()));
        true
    }

    pub fn append<S: Storage>(&mut self, filename: &str, data: &[u8], storage: &S) -> bool {
        if !self.exists(filename, storage) {
            return false;
        }
        match self.deltas.get_mut(filename) {
            Some(Delta::Append(pending)) | Some(Delta::Overwrite(pending)) => {
                pending.extend_from_slice(data)
            }
            _ => {
                self.deltas
                    .insert(filename.to_string(), Delta::Append(data.to_vec()));
            }
        }
        true
    }

    pub fn overwrite<S: Storage>(&mut self, filename: &str, data: &[u8], storage: &S) -> bool {
        if !self.exists(filename, storage) {
            return false;
        }
        self.deltas
            .insert(filename.to_string(), Delta::Overwrite(data.to_vec()));
        true
    }

    pub fn delete<S: Storage>(&mut self, filename: &str, storage: &S) -> bool {
        if !self.exists(filename, storage) {
            return false;
        }
        self.deltas.insert(filename.to_string(), Delta::Delete);
        true
    }

    pub fn apply<S: Storage>(&mut self, operation: &Operation, storage: &S) -> OpResult {
        match operation {
            Operation::Create { filename } => OpResult::Bool(self.create(filename, storage)),
            Operation::Exists { filename } => OpResult::Bool(self.exists(filename, storage)),
            Operation::Read { filename } => OpResult::Content(self.read(filename, storage)),
            Operation::Append { filename, data } => {
                OpResult::Bool(self.append(filename, data, storage))
            }
            Operation::Overwrite { filename, data } => {
                OpResult::Bool(self.overwrite(filename, data, storage))
            }
            Operation::Delete { filename } => OpResult::Bool(self.delete(filename, storage)),
        }
    }

    /// Get the final content of every file the snapshot wrote, resolving appends against the
    /// current content in storage.
    pub fn flatten<S: Storage>(&self, storage: &S) -> Writes {
        self.deltas
            .iter()
            .map(|(filename, delta)| {
                let content = match delta {
                    Delta::Delete => None,
                    Delta::Overwrite(content) => Some(content.clone()),
                    Delta::Append(data) => Some(appended(filename, data, storage)),
                };
                (filename.clone(), content)
            })
            .collect()
    }
}

fn appended<S: Storage>(filename: &str, data: &[u8], storage: &S) -> Vec<u8> {
    let mut content = storage
        .read(filename)
        .map(|(content, _)| content)
        .unwrap_or_default();
    content.extend_from_slice(data);
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            SessionId::new(1),
            NodeAddress::new(0),
            TransactionId::new(1),
            None,
        )
    }

    #[test]
    fn flatten_resolves_appends_and_deletes() {
        let mut storage = MemStorage::new();
        storage.create("a");
        storage.overwrite("a", b"y", None).unwrap();

        let mut snapshot = snapshot();
        snapshot
            .deltas
            .insert("a".to_string(), Delta::Append(b"x".to_vec()));
        snapshot.deltas.insert("b".to_string(), Delta::Delete);

        let mut expected = Writes::new();
        expected.insert("a".to_string(), Some(b"yx".to_vec()));
        expected.insert("b".to_string(), None);
        assert_eq!(snapshot.flatten(&storage), expected);
    }

    #[test]
    fn reads_see_overlay_over_storage() {
        let mut storage = MemStorage::new();
        storage.create("log");
        storage.overwrite("log", b"one", None).unwrap();

        let mut snapshot = snapshot();
        assert!(snapshot.append("log", b",two", &storage));
        assert!(snapshot.append("log", b",three", &storage));
        assert_eq!(snapshot.read("log", &storage), Some(b"one,two,three".to_vec()));
        assert_eq!(storage.content("log"), Some(b"one".to_vec()));

        assert!(!snapshot.append("missing", b"x", &storage));
        assert!(!snapshot.create("log", &storage));
        assert!(snapshot.delete("log", &storage));
        assert!(!snapshot.exists("log", &storage));
        assert_eq!(snapshot.read("log", &storage), None);

        assert!(snapshot.create("log", &storage));
        assert_eq!(snapshot.delta("log"), Some(&Delta::Overwrite(Vec::new())));
        assert!(snapshot.append("log", b"fresh", &storage));
        assert_eq!(snapshot.read("log", &storage), Some(b"fresh".to_vec()));
    }

    #[test]
    fn staleness_compares_against_base() {
        let mut snapshot = snapshot();
        assert!(snapshot.is_stale(SessionId::new(1)));

        snapshot.base = Some(SessionId::new(4));
        assert!(!snapshot.is_stale(SessionId::new(4)));
        assert!(snapshot.is_stale(SessionId::new(5)));
    }
}
