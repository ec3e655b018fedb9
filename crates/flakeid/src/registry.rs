//! Process-wide cache of generators keyed by `(kind, data_center_id)`.
//!
//! A generator is stateful: two live instances for the same identity would
//! hand out the same `(timestamp, sequence)` pairs. [`GeneratorRegistry`]
//! guarantees that at most one instance per identity is ever constructed and
//! retained, and returns that same instance on every lookup.
//!
//! Generator kinds are plain constructor functions registered by name, so new
//! algorithms can be added without touching the registry.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;

use crate::{
    AtomicSnowflakeGenerator, Error, IdGenerator, LockSnowflakeGenerator, Result,
    SNOWFLAKE_ATOMIC_KIND, SNOWFLAKE_KIND, SystemClock, TimeSource, validate_identity,
};

/// Builds a generator for `(data_center_id, worker_id)`.
pub type GeneratorFactory =
    Arc<dyn Fn(u64, u64) -> Result<Arc<dyn IdGenerator>> + Send + Sync + 'static>;

/// Caches one [`IdGenerator`] per `(kind, data_center_id)` for a fixed
/// worker ID.
///
/// The registry is an ordinary value owned by the application's composition
/// root. Share it by reference or behind an [`Arc`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use flakeid::GeneratorRegistry;
///
/// let registry = GeneratorRegistry::new(7).unwrap();
/// let a = registry.get(Some(5)).unwrap();
/// let b = registry.get(Some(5)).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let id = a.next_flake_id().unwrap();
/// assert_eq!(id.data_center_id(), 5);
/// assert_eq!(id.worker_id(), 7);
/// ```
pub struct GeneratorRegistry {
    worker_id: u64,
    default_kind: usize,
    kinds: HashMap<String, usize>,
    factories: Vec<(String, GeneratorFactory)>,
    generators: DashMap<(usize, u64), Arc<dyn IdGenerator>>,
}

impl GeneratorRegistry {
    /// Creates a registry for `worker_id` whose built-in kinds read the
    /// [`SystemClock`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `worker_id` is out of range.
    pub fn new(worker_id: u64) -> Result<Self> {
        Self::with_clock(worker_id, SystemClock)
    }

    /// Creates a registry whose built-in kinds read `clock`.
    ///
    /// Registers [`SNOWFLAKE_KIND`] (the default) and
    /// [`SNOWFLAKE_ATOMIC_KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `worker_id` is out of range.
    pub fn with_clock<T>(worker_id: u64, clock: T) -> Result<Self>
    where
        T: TimeSource + Clone + Send + Sync + 'static,
    {
        validate_identity(0, worker_id)?;

        let mut registry = Self {
            worker_id,
            default_kind: 0,
            kinds: HashMap::new(),
            factories: Vec::new(),
            generators: DashMap::new(),
        };

        let lock_clock = clock.clone();
        registry.register_kind(SNOWFLAKE_KIND, move |data_center_id, worker_id| {
            let generator =
                LockSnowflakeGenerator::new(data_center_id, worker_id, lock_clock.clone())?;
            Ok(Arc::new(generator))
        });
        registry.register_kind(SNOWFLAKE_ATOMIC_KIND, move |data_center_id, worker_id| {
            let generator =
                AtomicSnowflakeGenerator::new(data_center_id, worker_id, clock.clone())?;
            Ok(Arc::new(generator))
        });

        Ok(registry)
    }

    /// Registers (or replaces) the constructor for `kind`.
    ///
    /// Replacing a kind only affects generators constructed afterwards.
    ///
    /// The factory runs while the cache entry for its key is locked, so
    /// concurrent first lookups construct only one generator. It must not look
    /// up generators from the same registry: keys sharing a cache shard would
    /// deadlock.
    pub fn register_kind<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(u64, u64) -> Result<Arc<dyn IdGenerator>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let factory: GeneratorFactory = Arc::new(factory);
        match self.kinds.get(&kind) {
            Some(&index) => self.factories[index].1 = factory,
            None => {
                self.kinds.insert(kind.clone(), self.factories.len());
                self.factories.push((kind, factory));
            }
        }
        self
    }

    /// Makes `kind` the kind used by [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedGeneratorKind`] if `kind` is not registered.
    pub fn set_default_kind(&mut self, kind: &str) -> Result<&mut Self> {
        self.default_kind = self.kind_index(kind)?;
        Ok(self)
    }

    /// Name of the kind used by [`Self::get`].
    pub fn default_kind(&self) -> &str {
        &self.factories[self.default_kind].0
    }

    /// The worker ID every generator of this registry encodes.
    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Names of all registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(kind, _)| kind.as_str())
    }

    /// Number of generators constructed so far.
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Returns the default-kind generator for `data_center_id`, constructing
    /// it on first use.
    ///
    /// # Errors
    ///
    /// See [`Self::get_kind`].
    pub fn get(&self, data_center_id: Option<u64>) -> Result<Arc<dyn IdGenerator>> {
        self.get_by_index(data_center_id, self.default_kind)
    }

    /// Returns the `kind` generator for `data_center_id`, constructing it on
    /// first use.
    ///
    /// Concurrent first-time calls for the same identity construct exactly one
    /// instance; every caller receives it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `data_center_id` is `None`.
    /// - [`Error::InvalidConfiguration`] if `data_center_id` is out of range.
    /// - [`Error::UnsupportedGeneratorKind`] if `kind` is not registered or its
    ///   constructor fails. A failed construction caches nothing.
    pub fn get_kind(&self, data_center_id: Option<u64>, kind: &str) -> Result<Arc<dyn IdGenerator>> {
        let index = self.kind_index(kind)?;
        self.get_by_index(data_center_id, index)
    }

    fn kind_index(&self, kind: &str) -> Result<usize> {
        self.kinds
            .get(kind)
            .copied()
            .ok_or_else(|| Error::UnsupportedGeneratorKind {
                kind: kind.to_owned(),
                source: None,
            })
    }

    fn get_by_index(&self, data_center_id: Option<u64>, index: usize) -> Result<Arc<dyn IdGenerator>> {
        let data_center_id = data_center_id.ok_or_else(|| Error::InvalidArgument {
            reason: "data_center_id is required".to_owned(),
        })?;

        let key = (index, data_center_id);
        if let Some(generator) = self.generators.get(&key) {
            return Ok(Arc::clone(generator.value()));
        }

        validate_identity(data_center_id, self.worker_id)?;

        let (kind, factory) = &self.factories[index];
        let entry = self.generators.entry(key).or_try_insert_with(|| {
            #[cfg(feature = "tracing")]
            tracing::info!(
                kind = kind.as_str(),
                data_center_id,
                worker_id = self.worker_id,
                "Constructing ID generator"
            );
            factory(data_center_id, self.worker_id).map_err(|e| Error::UnsupportedGeneratorKind {
                kind: kind.clone(),
                source: Some(Box::new(e)),
            })
        })?;

        Ok(Arc::clone(entry.value()))
    }
}

impl core::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("worker_id", &self.worker_id)
            .field("default_kind", &self.default_kind())
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .field("generators", &self.generators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlakeId, IdGenStatus};
    use core::time::Duration;
    use std::sync::{
        Barrier,
        atomic::{AtomicUsize, Ordering},
    };
    use std::thread::scope;

    #[derive(Clone)]
    struct FixedTime;

    impl TimeSource for FixedTime {
        fn current_millis(&self) -> u64 {
            1_700_000_000_000
        }
    }

    /// A generator that always emits the same value; only its identity
    /// matters for these tests.
    struct ConstantGenerator {
        data_center_id: u64,
        worker_id: u64,
    }

    impl IdGenerator for ConstantGenerator {
        fn kind(&self) -> &'static str {
            "constant"
        }

        fn data_center_id(&self) -> u64 {
            self.data_center_id
        }

        fn worker_id(&self) -> u64 {
            self.worker_id
        }

        fn epoch(&self) -> Duration {
            Duration::ZERO
        }

        fn try_poll_id(&self) -> Result<IdGenStatus> {
            Ok(IdGenStatus::Ready {
                id: FlakeId::from_components(0, self.data_center_id, self.worker_id, 0),
            })
        }
    }

    #[test]
    fn returns_same_instance_for_same_identity() {
        let registry = GeneratorRegistry::with_clock(1, FixedTime).unwrap();

        let a = registry.get(Some(5)).unwrap();
        let b = registry.get(Some(5)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.kind(), SNOWFLAKE_KIND);
        assert_eq!(registry.len(), 1);

        let other = registry.get(Some(6)).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn default_kind_and_explicit_kind_share_cache() {
        let registry = GeneratorRegistry::with_clock(1, FixedTime).unwrap();
        let by_default = registry.get(Some(3)).unwrap();
        let by_name = registry.get_kind(Some(3), SNOWFLAKE_KIND).unwrap();
        assert!(Arc::ptr_eq(&by_default, &by_name));

        let atomic = registry.get_kind(Some(3), SNOWFLAKE_ATOMIC_KIND).unwrap();
        assert!(!Arc::ptr_eq(&by_default, &atomic));
        assert_eq!(atomic.kind(), SNOWFLAKE_ATOMIC_KIND);
    }

    #[test]
    fn sequence_continues_across_lookups() {
        let registry = GeneratorRegistry::with_clock(2, FixedTime).unwrap();
        let first = registry.get(Some(1)).unwrap().next_flake_id().unwrap();
        let second = registry.get(Some(1)).unwrap().next_flake_id().unwrap();
        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(second.worker_id(), 2);
    }

    #[test]
    fn missing_data_center_id_is_invalid_argument() {
        let registry = GeneratorRegistry::new(1).unwrap();
        assert!(matches!(
            registry.get(None),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn out_of_range_identity_is_invalid_configuration() {
        assert!(matches!(
            GeneratorRegistry::new(64),
            Err(Error::InvalidConfiguration {
                field: "worker_id",
                ..
            })
        ));

        let registry = GeneratorRegistry::new(1).unwrap();
        assert!(matches!(
            registry.get(Some(64)),
            Err(Error::InvalidConfiguration {
                field: "data_center_id",
                ..
            })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let registry = GeneratorRegistry::new(1).unwrap();
        let err = registry.get_kind(Some(1), "uuid").err();
        assert_eq!(
            err,
            Some(Error::UnsupportedGeneratorKind {
                kind: "uuid".to_owned(),
                source: None
            })
        );
    }

    #[test]
    fn failing_constructor_is_wrapped_and_not_cached() {
        let mut registry = GeneratorRegistry::new(1).unwrap();
        registry.register_kind("broken", |_, _| {
            Err(Error::InvalidArgument {
                reason: "not today".to_owned(),
            })
        });

        let err = registry.get_kind(Some(1), "broken").err();
        match err {
            Some(Error::UnsupportedGeneratorKind { kind, source }) => {
                assert_eq!(kind, "broken");
                assert!(matches!(
                    source.as_deref(),
                    Some(Error::InvalidArgument { .. })
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn custom_kind_can_become_default() {
        let mut registry = GeneratorRegistry::new(4).unwrap();
        registry.register_kind("constant", |data_center_id, worker_id| {
            Ok(Arc::new(ConstantGenerator {
                data_center_id,
                worker_id,
            }))
        });
        registry.set_default_kind("constant").unwrap();

        assert_eq!(registry.default_kind(), "constant");
        let generator = registry.get(Some(9)).unwrap();
        assert_eq!(generator.kind(), "constant");
        assert_eq!(generator.worker_id(), 4);
        assert_eq!(generator.data_center_id(), 9);

        assert!(matches!(
            registry.set_default_kind("missing"),
            Err(Error::UnsupportedGeneratorKind { .. })
        ));
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec![SNOWFLAKE_KIND, SNOWFLAKE_ATOMIC_KIND, "constant"]
        );
    }

    #[test]
    fn concurrent_first_lookups_construct_one_instance() {
        const THREADS: usize = 16;

        let constructed = Arc::new(AtomicUsize::new(0));
        let mut registry = GeneratorRegistry::new(1).unwrap();
        let counter = Arc::clone(&constructed);
        registry.register_kind("counted", move |data_center_id, worker_id| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            Ok(Arc::new(ConstantGenerator {
                data_center_id,
                worker_id,
            }))
        });

        let barrier = Barrier::new(THREADS);
        let generators: Vec<Arc<dyn IdGenerator>> = scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.get_kind(Some(5), "counted").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(generators.iter().all(|g| Arc::ptr_eq(g, &generators[0])));
        assert_eq!(registry.len(), 1);
    }
}
