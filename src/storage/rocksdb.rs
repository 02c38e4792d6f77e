use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rocksdb::{Direction, IteratorMode, Options, ReadOptions, WriteBatch, WriteOptions, DB};

use crate::contracts::{
    validate_namespace, CounterSession, CounterStore, LockResultExt, StoreError,
};
use crate::storage::autoinc::{raised_counter, AutoIncrement, INITIAL_COUNTER};

/// Key prefix for namespace counters (also marks the namespace as existing)
const COUNTER_PREFIX: &str = "ctr";
/// Key prefix for stub rows
const ROW_PREFIX: &str = "row";
/// Key read by the liveness probe
const PING_KEY: &str = "__ping";

/// RocksDB-backed counter store.
///
/// Layout:
/// - `ctr:{namespace}` -> next counter value (i64, big-endian)
/// - `row:{namespace}:{stub}` -> identifier of the row (i64, big-endian)
///
/// Counter and row are written in one batch, so a reopened store never sees
/// a row whose identifier is at or above the persisted counter.
pub struct RocksDbCounterStore {
    db: DB,
    /// Per-namespace write locks; the serialization point for generation
    namespace_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Fsync the WAL before a write is acknowledged
    sync_writes: bool,
}

impl RocksDbCounterStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        // Tiny values, hot keys: keep the memtable small and skip compression
        opts.set_compression_type(rocksdb::DBCompressionType::None);
        opts.set_write_buffer_size(4 * 1024 * 1024);
        opts.set_max_background_jobs(2);

        let db = DB::open(&opts, path).map_err(|e| StoreError::RocksDb(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened counter store");

        Ok(Self {
            db,
            namespace_locks: DashMap::new(),
            sync_writes: true,
        })
    }

    /// Creates an empty namespace so it can be queried before the first write.
    pub fn create_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        let lock = self.namespace_lock(namespace);
        let _guard = lock.lock().map_lock_err()?;
        if self.load_counter(namespace)?.is_none() {
            self.db
                .put_opt(
                    Self::counter_key(namespace).as_bytes(),
                    INITIAL_COUNTER.to_be_bytes(),
                    &self.write_options(),
                )
                .map_err(|e| StoreError::RocksDb(e.to_string()))?;
        }
        Ok(())
    }

    /// Names of all namespaces, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{}:", COUNTER_PREFIX);
        let mut names = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::RocksDb(e.to_string()))?;
            let key = String::from_utf8_lossy(&key);
            match key.strip_prefix(&prefix) {
                Some(name) => names.push(name.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    /// Flushes memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::RocksDb(e.to_string()))
    }

    fn namespace_lock(&self, namespace: &str) -> Arc<Mutex<()>> {
        let entry = self
            .namespace_locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    fn counter_key(namespace: &str) -> String {
        format!("{}:{}", COUNTER_PREFIX, namespace)
    }

    fn row_key(namespace: &str, stub: &str) -> String {
        format!("{}:{}:{}", ROW_PREFIX, namespace, stub)
    }

    /// `row:{namespace}:` and the first key past every row of the namespace.
    fn row_bounds(namespace: &str) -> (Vec<u8>, Vec<u8>) {
        (
            format!("{}:{}:", ROW_PREFIX, namespace).into_bytes(),
            // ';' sorts right after ':'
            format!("{}:{};", ROW_PREFIX, namespace).into_bytes(),
        )
    }

    /// Whether every counter write is fsynced before it returns.
    pub fn syncs_writes(&self) -> bool {
        self.sync_writes
    }

    fn write_options(&self) -> WriteOptions {
        // A counter update lost to an OS crash would re-issue identifiers
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    #[inline]
    fn parse_i64_be(bytes: &[u8]) -> Result<i64, StoreError> {
        bytes
            .try_into()
            .map(i64::from_be_bytes)
            .map_err(|_| StoreError::Serialization("Invalid i64 bytes".into()))
    }

    fn load_counter(&self, namespace: &str) -> Result<Option<i64>, StoreError> {
        match self.db.get(Self::counter_key(namespace).as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::parse_i64_be(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::RocksDb(e.to_string())),
        }
    }

    fn scan_max_id(&self, namespace: &str) -> Result<Option<i64>, StoreError> {
        let (lower, upper) = Self::row_bounds(namespace);
        let mut opts = ReadOptions::default();
        opts.set_iterate_upper_bound(upper);

        let mut max: Option<i64> = None;
        for item in self
            .db
            .iterator_opt(IteratorMode::From(&lower, Direction::Forward), opts)
        {
            let (_, value) = item.map_err(|e| StoreError::RocksDb(e.to_string()))?;
            let id = Self::parse_i64_be(&value)?;
            max = Some(max.map_or(id, |m| m.max(id)));
        }
        Ok(max)
    }
}

impl CounterStore for RocksDbCounterStore {
    type Session<'a> = RocksDbSession<'a>;

    fn connect(&self) -> Result<RocksDbSession<'_>, StoreError> {
        Ok(RocksDbSession {
            store: self,
            settings: AutoIncrement::default(),
        })
    }
}

/// Session over a [`RocksDbCounterStore`].
pub struct RocksDbSession<'a> {
    store: &'a RocksDbCounterStore,
    settings: AutoIncrement,
}

impl CounterSession for RocksDbSession<'_> {
    fn ping(&mut self) -> Result<(), StoreError> {
        self.store
            .db
            .get(PING_KEY.as_bytes())
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn set_auto_increment(&mut self, increment: i64, offset: i64) -> Result<(), StoreError> {
        self.settings = AutoIncrement::new(increment, offset)?;
        Ok(())
    }

    fn replace_stub(&mut self, namespace: &str, stub: &str) -> Result<i64, StoreError> {
        validate_namespace(namespace)?;
        let lock = self.store.namespace_lock(namespace);
        let _guard = lock.lock().map_lock_err()?;

        let counter = self
            .store
            .load_counter(namespace)?
            .unwrap_or(INITIAL_COUNTER);
        let (id, next_counter) = self.settings.generate(namespace, counter)?;

        let mut batch = WriteBatch::default();
        batch.put(
            RocksDbCounterStore::counter_key(namespace).as_bytes(),
            next_counter.to_be_bytes(),
        );
        batch.put(
            RocksDbCounterStore::row_key(namespace, stub).as_bytes(),
            id.to_be_bytes(),
        );
        self.store
            .db
            .write_opt(batch, &self.store.write_options())
            .map_err(|e| StoreError::RocksDb(e.to_string()))?;

        Ok(id)
    }

    fn max_id(&mut self, namespace: &str) -> Result<Option<i64>, StoreError> {
        if self.store.load_counter(namespace)?.is_none() {
            return Err(StoreError::NamespaceNotFound(namespace.to_string()));
        }
        self.store.scan_max_id(namespace)
    }

    fn raise_floor(&mut self, namespace: &str, floor: i64) -> Result<(), StoreError> {
        let lock = self.store.namespace_lock(namespace);
        let _guard = lock.lock().map_lock_err()?;

        let current = self
            .store
            .load_counter(namespace)?
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;
        let max_id = self.store.scan_max_id(namespace)?;
        let raised = raised_counter(current, floor, max_id);
        if raised == current {
            return Ok(());
        }

        self.store
            .db
            .put_opt(
                RocksDbCounterStore::counter_key(namespace).as_bytes(),
                raised.to_be_bytes(),
                &self.store.write_options(),
            )
            .map_err(|e| StoreError::RocksDb(e.to_string()))
    }
}
