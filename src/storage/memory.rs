use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::contracts::{
    validate_namespace, CounterSession, CounterStore, LockResultExt, StoreError,
};
use crate::storage::autoinc::{raised_counter, AutoIncrement, INITIAL_COUNTER};

/// One namespace: the auto-increment counter plus its rows (stub -> id).
#[derive(Debug)]
struct Table {
    counter: i64,
    rows: BTreeMap<String, i64>,
}

impl Table {
    fn new() -> Self {
        Self {
            counter: INITIAL_COUNTER,
            rows: BTreeMap::new(),
        }
    }

    fn max_id(&self) -> Option<i64> {
        self.rows.values().copied().max()
    }
}

/// In-process counter store.
///
/// All namespaces sit behind one mutex, which is the serialization point
/// for identifier generation. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty namespace so it can be queried before the first write.
    pub fn create_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        self.tables
            .lock()
            .map_lock_err()?
            .entry(namespace.to_string())
            .or_insert_with(Table::new);
        Ok(())
    }

    /// Names of all namespaces, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.tables.lock().map_lock_err()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Number of rows stored in `namespace`.
    pub fn row_count(&self, namespace: &str) -> Result<usize, StoreError> {
        let tables = self.tables.lock().map_lock_err()?;
        tables
            .get(namespace)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))
    }
}

impl CounterStore for MemoryCounterStore {
    type Session<'a> = MemorySession<'a>;

    fn connect(&self) -> Result<MemorySession<'_>, StoreError> {
        Ok(MemorySession {
            store: self,
            settings: AutoIncrement::default(),
        })
    }
}

/// Session over a [`MemoryCounterStore`].
pub struct MemorySession<'a> {
    store: &'a MemoryCounterStore,
    settings: AutoIncrement,
}

impl CounterSession for MemorySession<'_> {
    fn ping(&mut self) -> Result<(), StoreError> {
        self.store.tables.lock().map_lock_err().map(|_| ())
    }

    fn set_auto_increment(&mut self, increment: i64, offset: i64) -> Result<(), StoreError> {
        self.settings = AutoIncrement::new(increment, offset)?;
        Ok(())
    }

    fn replace_stub(&mut self, namespace: &str, stub: &str) -> Result<i64, StoreError> {
        validate_namespace(namespace)?;
        let mut tables = self.store.tables.lock().map_lock_err()?;
        let table = tables
            .entry(namespace.to_string())
            .or_insert_with(Table::new);

        let (id, counter) = self.settings.generate(namespace, table.counter)?;
        table.rows.insert(stub.to_string(), id);
        table.counter = counter;
        Ok(id)
    }

    fn max_id(&mut self, namespace: &str) -> Result<Option<i64>, StoreError> {
        let tables = self.store.tables.lock().map_lock_err()?;
        tables
            .get(namespace)
            .map(Table::max_id)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))
    }

    fn raise_floor(&mut self, namespace: &str, floor: i64) -> Result<(), StoreError> {
        let mut tables = self.store.tables.lock().map_lock_err()?;
        let table = tables
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;
        table.counter = raised_counter(table.counter, floor, table.max_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_one_row_per_stub() {
        let store = MemoryCounterStore::new();
        let mut session = store.connect().unwrap();

        assert_eq!(session.replace_stub("integers", "a").unwrap(), 1);
        assert_eq!(session.replace_stub("integers", "a").unwrap(), 2);
        assert_eq!(session.replace_stub("integers", "a").unwrap(), 3);

        assert_eq!(store.row_count("integers").unwrap(), 1);
        assert_eq!(session.max_id("integers").unwrap(), Some(3));
    }

    #[test]
    fn settings_are_session_scoped() {
        let store = MemoryCounterStore::new();
        let mut odd = store.connect().unwrap();
        odd.set_auto_increment(2, 1).unwrap();
        let mut plain = store.connect().unwrap();

        assert_eq!(odd.replace_stub("integers", "a").unwrap(), 1);
        assert_eq!(plain.replace_stub("integers", "a").unwrap(), 2);
        assert_eq!(odd.replace_stub("integers", "a").unwrap(), 3);
    }

    #[test]
    fn unknown_namespace_is_not_found() {
        let store = MemoryCounterStore::new();
        let mut session = store.connect().unwrap();
        assert!(matches!(
            session.max_id("missing"),
            Err(StoreError::NamespaceNotFound(_))
        ));
        assert!(matches!(
            session.raise_floor("missing", 10),
            Err(StoreError::NamespaceNotFound(_))
        ));
    }

    #[test]
    fn created_namespace_is_empty() {
        let store = MemoryCounterStore::new();
        store.create_namespace("integers").unwrap();
        let mut session = store.connect().unwrap();
        assert_eq!(session.max_id("integers").unwrap(), None);
        assert_eq!(store.namespaces().unwrap(), vec!["integers".to_string()]);
    }

    #[test]
    fn raise_floor_moves_forward_only() {
        let store = MemoryCounterStore::new();
        let mut session = store.connect().unwrap();
        session.replace_stub("integers", "a").unwrap();

        session.raise_floor("integers", 50).unwrap();
        assert_eq!(session.replace_stub("integers", "a").unwrap(), 50);

        session.raise_floor("integers", 10).unwrap();
        assert_eq!(session.replace_stub("integers", "a").unwrap(), 51);
    }

    #[test]
    fn invalid_namespace_is_rejected_on_write() {
        let store = MemoryCounterStore::new();
        let mut session = store.connect().unwrap();
        assert!(matches!(
            session.replace_stub("no spaces", "a"),
            Err(StoreError::InvalidNamespace(_))
        ));
    }
}
