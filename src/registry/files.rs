//! File name to owner mapping.
//!
//! Besides the records, the registry keeps running per-owner totals so the
//! placement policy can see each node's load without scanning every file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

use crate::errors::ControllerError;
use crate::membership::Address;

/// A tracked file and the file server that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    /// Unique file name.
    pub name: String,
    /// Declared size in bytes.
    pub size: i64,
    /// File server chosen when the file was added.
    pub owner: Address,
}

/// Aggregate of the files assigned to one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Load {
    pub files: u64,
    pub bytes: u64,
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    files: BTreeMap<String, FileRecord>,
    loads: HashMap<Address, Load>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Track `record`. Names are never overwritten.
    pub fn insert(&mut self, record: FileRecord) -> Result<(), ControllerError> {
        if self.files.contains_key(&record.name) {
            return Err(ControllerError::DuplicateName { name: record.name });
        }
        let load = self.loads.entry(record.owner.clone()).or_default();
        // Totals only steer placement, so they saturate instead of failing.
        load.files = load.files.saturating_add(1);
        load.bytes = load.bytes.saturating_add(record.size.max(0) as u64);
        self.files.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FileRecord> {
        self.files.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FileRecord> {
        let record = self.files.remove(name)?;
        self.release(&record);
        Some(record)
    }

    /// Drop every record owned by `owner`.
    pub fn remove_owned_by(&mut self, owner: &Address) -> Vec<FileRecord> {
        let names: Vec<String> = self
            .files
            .values()
            .filter(|r| &r.owner == owner)
            .map(|r| r.name.clone())
            .collect();
        let removed: Vec<FileRecord> = names
            .iter()
            .filter_map(|name| self.files.remove(name))
            .collect();
        self.loads.remove(owner);
        removed
    }

    pub fn load_of(&self, owner: &Address) -> Load {
        self.loads.get(owner).copied().unwrap_or_default()
    }

    /// All records, ordered by name.
    pub fn records(&self) -> Vec<FileRecord> {
        self.files.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn release(&mut self, record: &FileRecord) {
        if let Some(load) = self.loads.get_mut(&record.owner) {
            load.files = load.files.saturating_sub(1);
            load.bytes = load.bytes.saturating_sub(record.size.max(0) as u64);
            if load.files == 0 {
                self.loads.remove(&record.owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, size: i64, owner: &str) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            size,
            owner: Address::parse(owner).unwrap(),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut reg = FileRegistry::new();
        reg.insert(record("testfile", 1024, "node-a:1")).unwrap();

        let found = reg.get("testfile").unwrap();
        assert_eq!(found.owner.as_str(), "node-a:1");
        assert_eq!(found.size, 1024);

        let removed = reg.remove("testfile").unwrap();
        assert_eq!(removed.owner.as_str(), "node-a:1");
        assert!(reg.get("testfile").is_none());
        assert!(reg.remove("testfile").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = FileRegistry::new();
        reg.insert(record("f", 1, "node-a:1")).unwrap();
        let err = reg.insert(record("f", 2, "node-b:1")).unwrap_err();
        assert!(matches!(err, ControllerError::DuplicateName { .. }));
        assert_eq!(reg.get("f").unwrap().owner.as_str(), "node-a:1");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_loads_track_inserts_and_removals() {
        let mut reg = FileRegistry::new();
        let a = Address::parse("node-a:1").unwrap();
        reg.insert(record("f1", 100, "node-a:1")).unwrap();
        reg.insert(record("f2", 50, "node-a:1")).unwrap();
        assert_eq!(reg.load_of(&a), Load { files: 2, bytes: 150 });

        reg.remove("f1");
        assert_eq!(reg.load_of(&a), Load { files: 1, bytes: 50 });
        reg.remove("f2");
        assert_eq!(reg.load_of(&a), Load::default());
    }

    #[test]
    fn test_huge_sizes_saturate_load() {
        let mut reg = FileRegistry::new();
        let a = Address::parse("node-a:1").unwrap();
        reg.insert(record("a", i64::MAX, "node-a:1")).unwrap();
        reg.insert(record("b", i64::MAX, "node-a:1")).unwrap();
        reg.insert(record("c", 2, "node-a:1")).unwrap();
        reg.insert(record("d", i64::MAX, "node-a:1")).unwrap();
        assert_eq!(reg.load_of(&a), Load { files: 4, bytes: u64::MAX });

        reg.remove("c");
        assert_eq!(reg.load_of(&a).files, 3);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_remove_owned_by() {
        let mut reg = FileRegistry::new();
        reg.insert(record("a1", 1, "node-a:1")).unwrap();
        reg.insert(record("b1", 1, "node-b:1")).unwrap();
        reg.insert(record("a2", 1, "node-a:1")).unwrap();

        let a = Address::parse("node-a:1").unwrap();
        let removed = reg.remove_owned_by(&a);
        let names: Vec<_> = removed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2"]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.load_of(&a), Load::default());
        assert!(reg.contains("b1"));
    }

    #[test]
    fn test_records_sorted_by_name() {
        let mut reg = FileRegistry::new();
        reg.insert(record("zeta", 1, "node-a:1")).unwrap();
        reg.insert(record("alpha", 1, "node-a:1")).unwrap();
        let names: Vec<_> = reg.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
