use std::sync::{Arc, PoisonError, RwLock};

use crate::contracts::{CounterSession, CounterStore, Engine, StoreError, TicketError};
use crate::contracts::config::{validate_increment, validate_key, validate_offset, EngineConfig};

/// Placeholder payload of the disposable row. Only its generated id matters.
const STUB: &str = "a";

/// Ticket-server engine over any [`CounterStore`].
///
/// Every operation opens its own session, runs a short statement sequence
/// and drops the session. The configuration is an immutable snapshot that
/// setters swap atomically, so an in-flight call always sees one consistent
/// key/offset/increment triple.
pub struct TicketEngine<S: CounterStore> {
    store: Arc<S>,
    config: RwLock<Arc<EngineConfig>>,
}

impl<S: CounterStore> TicketEngine<S> {
    /// Creates an engine with the default configuration after a liveness probe.
    pub fn new(store: Arc<S>) -> Result<Self, TicketError> {
        Self::with_config(store, EngineConfig::default())
    }

    /// Creates an engine with an explicit configuration after a liveness probe.
    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Result<Self, TicketError> {
        config.validate()?;

        let mut session = store.connect().map_err(|source| TicketError::Connection {
            namespace: config.key().to_string(),
            source,
        })?;
        session.ping().map_err(|source| TicketError::Connection {
            namespace: config.key().to_string(),
            source,
        })?;
        drop(session);

        tracing::debug!(
            key = %config.key(),
            offset = config.offset(),
            increment = config.increment(),
            "Ticket engine ready"
        );

        Ok(Self {
            store,
            config: RwLock::new(Arc::new(config)),
        })
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn snapshot(&self) -> Arc<EngineConfig> {
        // A poisoned lock still holds a complete config value
        let guard = self.config.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn update(&self, f: impl FnOnce(EngineConfig) -> EngineConfig) {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(guard.as_ref().clone());
        *guard = Arc::new(next);
    }

    fn connect(&self, key: &str) -> Result<S::Session<'_>, TicketError> {
        self.store.connect().map_err(|source| {
            tracing::warn!(key = %key, error = %source, "Failed to open store session");
            TicketError::Connection {
                namespace: key.to_string(),
                source,
            }
        })
    }

    fn read_last(&self, config: &EngineConfig) -> Result<i64, TicketError> {
        let key = config.key();
        let mut session = self.connect(key)?;
        match session.max_id(key) {
            Ok(Some(last)) => Ok(last),
            Ok(None) | Err(StoreError::NamespaceNotFound(_)) => {
                tracing::debug!(key = %key, "No integers issued yet");
                Err(TicketError::NotFound {
                    namespace: key.to_string(),
                })
            }
            Err(source) => {
                tracing::error!(key = %key, error = %source, "Failed to read last integer");
                Err(TicketError::Store {
                    namespace: key.to_string(),
                    source,
                })
            }
        }
    }
}

impl<S: CounterStore> Engine for TicketEngine<S> {
    fn last_int(&self) -> Result<i64, TicketError> {
        let config = self.snapshot();
        let last = self.read_last(&config)?;
        tracing::trace!(key = %config.key(), last, "Read last integer");
        Ok(last)
    }

    fn next_int(&self) -> Result<i64, TicketError> {
        let config = self.snapshot();
        let key = config.key();
        if let Err(e) = config.check_residue() {
            tracing::warn!(key = %key, error = %e, "Refused to issue with invalid residue");
            return Err(e);
        }

        let mut session = self.connect(key)?;
        session
            .set_auto_increment(config.increment(), config.offset())
            .map_err(|source| {
                tracing::error!(key = %key, error = %source, "Store rejected auto-increment settings");
                TicketError::SettingsRejected {
                    namespace: key.to_string(),
                    source,
                }
            })?;

        let id = session.replace_stub(key, STUB).map_err(|source| {
            tracing::error!(key = %key, error = %source, "Failed to write stub row");
            TicketError::Write {
                namespace: key.to_string(),
                source,
            }
        })?;

        tracing::trace!(key = %key, id, "Issued integer");
        Ok(id)
    }

    fn set_last_int(&self, value: i64) -> Result<(), TicketError> {
        let config = self.snapshot();
        let key = config.key();

        let last = self.read_last(&config)?;
        if value < last {
            tracing::warn!(key = %key, requested = value, last, "Rejected floor below last integer");
            return Err(TicketError::MonotonicityViolation {
                namespace: key.to_string(),
                requested: value,
                last,
            });
        }

        // The next issued value must be strictly greater than `value`
        let floor = value
            .checked_add(1)
            .ok_or_else(|| {
                tracing::warn!(key = %key, requested = value, "Rejected floor with no successor");
                TicketError::Configuration {
                    namespace: key.to_string(),
                    reason: format!("no integer can follow {}", value),
                }
            })?;

        let mut session = self.connect(key)?;
        session.raise_floor(key, floor).map_err(|source| {
            tracing::error!(key = %key, floor = value, error = %source, "Failed to raise floor");
            TicketError::Store {
                namespace: key.to_string(),
                source,
            }
        })?;

        tracing::info!(key = %key, floor = value, previous = last, "Raised integer floor");
        Ok(())
    }

    fn set_key(&self, key: &str) -> Result<(), TicketError> {
        validate_key(key)?;
        self.update(|c| c.with_key(key));
        Ok(())
    }

    fn set_offset(&self, offset: i64) -> Result<(), TicketError> {
        validate_offset(self.snapshot().key(), offset)?;
        self.update(|c| c.with_offset(offset));
        Ok(())
    }

    fn set_increment(&self, increment: i64) -> Result<(), TicketError> {
        validate_increment(self.snapshot().key(), increment)?;
        self.update(|c| c.with_increment(increment));
        Ok(())
    }

    fn config(&self) -> EngineConfig {
        self.snapshot().as_ref().clone()
    }

    fn close(&self) -> Result<(), TicketError> {
        tracing::debug!(key = %self.snapshot().key(), "Ticket engine closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::storage::MemoryCounterStore;

    fn engine() -> TicketEngine<MemoryCounterStore> {
        TicketEngine::new(Arc::new(MemoryCounterStore::new())).unwrap()
    }

    #[test]
    fn walks_through_the_ticket_server_scenario() {
        let engine = engine();

        assert_eq!(engine.next_int().unwrap(), 1);
        assert_eq!(engine.next_int().unwrap(), 3);
        assert_eq!(engine.next_int().unwrap(), 5);
        assert_eq!(engine.last_int().unwrap(), 5);

        engine.set_last_int(10).unwrap();
        assert_eq!(engine.next_int().unwrap(), 11);

        let err = engine.set_last_int(5).unwrap_err();
        assert!(matches!(
            err,
            TicketError::MonotonicityViolation {
                requested: 5,
                last: 11,
                ..
            }
        ));
        assert!(err.to_string().starts_with("integer value too small"));
    }

    #[test]
    fn last_int_on_empty_namespace_is_not_found() {
        let store = Arc::new(MemoryCounterStore::new());
        let engine = TicketEngine::new(Arc::clone(&store)).unwrap();
        assert!(matches!(
            engine.last_int(),
            Err(TicketError::NotFound { .. })
        ));

        store.create_namespace("integers").unwrap();
        assert!(matches!(
            engine.last_int(),
            Err(TicketError::NotFound { .. })
        ));
    }

    #[test]
    fn set_last_int_needs_an_existing_sequence() {
        let engine = engine();
        assert!(matches!(
            engine.set_last_int(100),
            Err(TicketError::NotFound { .. })
        ));
    }

    #[test]
    fn set_last_int_equal_to_last_is_accepted() {
        let engine = engine();
        let last = engine.next_int().unwrap();
        engine.set_last_int(last).unwrap();
        assert!(engine.next_int().unwrap() > last);
    }

    #[test]
    fn set_last_int_at_max_is_a_configuration_error() {
        let engine = engine();
        engine.next_int().unwrap();
        assert!(matches!(
            engine.set_last_int(i64::MAX),
            Err(TicketError::Configuration { .. })
        ));
    }

    #[test]
    fn last_int_is_read_only() {
        let engine = engine();
        engine.next_int().unwrap();
        let first = engine.last_int().unwrap();
        for _ in 0..10 {
            assert_eq!(engine.last_int().unwrap(), first);
        }
    }

    #[test]
    fn setters_apply_to_later_calls_only() {
        let engine = engine();
        assert_eq!(engine.next_int().unwrap(), 1);

        engine.set_increment(10).unwrap();
        engine.set_offset(4).unwrap();
        assert_eq!(engine.next_int().unwrap(), 4);
        assert_eq!(engine.next_int().unwrap(), 14);

        engine.set_key("orders").unwrap();
        assert_eq!(engine.next_int().unwrap(), 4);
        assert_eq!(engine.config().key(), "orders");
    }

    #[test]
    fn setters_reject_invalid_values() {
        let engine = engine();
        assert!(engine.set_key("").is_err());
        assert!(engine.set_key("bad key").is_err());
        assert!(engine.set_increment(0).is_err());
        assert!(engine.set_offset(-3).is_err());
        assert_eq!(engine.config(), EngineConfig::default());
    }

    #[test]
    fn offset_not_below_increment_aborts_before_writing() {
        let store = Arc::new(MemoryCounterStore::new());
        let engine = TicketEngine::new(Arc::clone(&store)).unwrap();
        engine.set_offset(2).unwrap();

        assert!(matches!(
            engine.next_int(),
            Err(TicketError::Configuration { .. })
        ));
        assert!(store.namespaces().unwrap().is_empty());
    }

    #[test]
    fn with_config_rejects_invalid_config() {
        let store = Arc::new(MemoryCounterStore::new());
        let config = EngineConfig::default().with_increment(1);
        assert!(TicketEngine::with_config(store, config).is_err());
    }

    #[test]
    fn close_is_a_noop() {
        let engine = engine();
        engine.next_int().unwrap();
        engine.close().unwrap();
        assert_eq!(engine.next_int().unwrap(), 3);
    }

    /// Store whose sessions fail at a chosen step.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryCounterStore,
        fail_connect: AtomicBool,
        fail_settings: AtomicBool,
        fail_write: AtomicBool,
    }

    struct FlakySession<'a> {
        store: &'a FlakyStore,
        inner: crate::storage::MemorySession<'a>,
    }

    impl CounterStore for FlakyStore {
        type Session<'a> = FlakySession<'a>;

        fn connect(&self) -> Result<FlakySession<'_>, StoreError> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(FlakySession {
                store: self,
                inner: self.inner.connect()?,
            })
        }
    }

    impl CounterSession for FlakySession<'_> {
        fn ping(&mut self) -> Result<(), StoreError> {
            self.inner.ping()
        }

        fn set_auto_increment(&mut self, increment: i64, offset: i64) -> Result<(), StoreError> {
            if self.store.fail_settings.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("variable is read only".into()));
            }
            self.inner.set_auto_increment(increment, offset)
        }

        fn replace_stub(&mut self, namespace: &str, stub: &str) -> Result<i64, StoreError> {
            if self.store.fail_write.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.replace_stub(namespace, stub)
        }

        fn max_id(&mut self, namespace: &str) -> Result<Option<i64>, StoreError> {
            self.inner.max_id(namespace)
        }

        fn raise_floor(&mut self, namespace: &str, floor: i64) -> Result<(), StoreError> {
            self.inner.raise_floor(namespace, floor)
        }
    }

    /// Collects formatted log lines written while a test subscriber is active.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn run(&self, f: impl FnOnce()) -> String {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_max_level(tracing::Level::TRACE)
                .with_ansi(false)
                .finish();
            tracing::subscriber::with_default(subscriber, f);
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn operations_log_their_key() {
        let store = Arc::new(FlakyStore::default());
        let engine = TicketEngine::with_config(
            Arc::clone(&store),
            EngineConfig::default().with_key("orders"),
        )
        .unwrap();

        let logs = CapturedLogs::default().run(|| {
            assert!(engine.last_int().is_err());
            engine.next_int().unwrap();
            engine.last_int().unwrap();

            store.fail_write.store(true, Ordering::SeqCst);
            assert!(engine.next_int().is_err());
            store.fail_write.store(false, Ordering::SeqCst);

            store.fail_settings.store(true, Ordering::SeqCst);
            assert!(engine.next_int().is_err());
        });

        for message in [
            "No integers issued yet",
            "Issued integer",
            "Read last integer",
            "Failed to write stub row",
            "Store rejected auto-increment settings",
        ] {
            let line = logs
                .lines()
                .find(|l| l.contains(message))
                .unwrap_or_else(|| panic!("missing {:?} in:\n{}", message, logs));
            assert!(line.contains("key=orders"), "{}", line);
        }
    }

    #[test]
    fn unreachable_store_fails_construction() {
        let store = FlakyStore::default();
        store.fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(
            TicketEngine::new(Arc::new(store)),
            Err(TicketError::Connection { .. })
        ));
    }

    #[test]
    fn failures_map_to_their_phase() {
        let store = Arc::new(FlakyStore::default());
        let engine = TicketEngine::new(Arc::clone(&store)).unwrap();
        assert_eq!(engine.next_int().unwrap(), 1);

        store.fail_settings.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.next_int(),
            Err(TicketError::SettingsRejected { .. })
        ));
        store.fail_settings.store(false, Ordering::SeqCst);

        store.fail_write.store(true, Ordering::SeqCst);
        assert!(matches!(engine.next_int(), Err(TicketError::Write { .. })));
        store.fail_write.store(false, Ordering::SeqCst);

        store.fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.last_int(),
            Err(TicketError::Connection { .. })
        ));
        store.fail_connect.store(false, Ordering::SeqCst);

        // Failed calls issued nothing
        assert_eq!(engine.last_int().unwrap(), 1);
        assert_eq!(engine.next_int().unwrap(), 3);
    }
}
