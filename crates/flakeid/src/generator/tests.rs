use crate::{
    AtomicSnowflakeGenerator, DEFAULT_EPOCH, Error, FlakeId, IdGenStatus, IdGenerator,
    LockSnowflakeGenerator, SystemClock, TimeSource,
};
use core::time::Duration;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::scope;

const EPOCH_MS: u64 = 1_524_153_600_000;

#[derive(Clone)]
struct SharedTime {
    millis: Arc<AtomicU64>,
}

impl SharedTime {
    fn at(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for SharedTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Advances by one millisecond every `reads_per_tick` clock reads.
struct TickingTime {
    base: u64,
    reads: AtomicU64,
    reads_per_tick: u64,
}

impl TimeSource for TickingTime {
    fn current_millis(&self) -> u64 {
        self.base + self.reads.fetch_add(1, Ordering::SeqCst) / self.reads_per_tick
    }
}

trait IdGenStatusExt {
    fn unwrap_ready(self) -> FlakeId;
    fn unwrap_pending(self) -> u64;
}

impl IdGenStatusExt for IdGenStatus {
    fn unwrap_ready(self) -> FlakeId {
        match self {
            Self::Ready { id } => id,
            Self::Pending { yield_for } => {
                panic!("unexpected pending (yield for: {yield_for})")
            }
        }
    }

    fn unwrap_pending(self) -> u64 {
        match self {
            Self::Ready { id } => panic!("unexpected ready ({id})"),
            Self::Pending { yield_for } => yield_for,
        }
    }
}

fn lock_at(millis: u64) -> (LockSnowflakeGenerator<SharedTime>, SharedTime) {
    let time = SharedTime::at(millis);
    let generator = LockSnowflakeGenerator::new(1, 1, time.clone()).unwrap();
    (generator, time)
}

fn atomic_at(millis: u64) -> (AtomicSnowflakeGenerator<SharedTime>, SharedTime) {
    let time = SharedTime::at(millis);
    let generator = AtomicSnowflakeGenerator::new(1, 1, time.clone()).unwrap();
    (generator, time)
}

fn run_id_sequence_increments_within_same_tick(generator: &impl IdGenerator) {
    let id1 = generator.try_poll_id().unwrap().unwrap_ready();
    let id2 = generator.try_poll_id().unwrap().unwrap_ready();
    let id3 = generator.try_poll_id().unwrap().unwrap_ready();

    assert_eq!(id1.timestamp(), 42);
    assert_eq!(id2.timestamp(), 42);
    assert_eq!(id3.timestamp(), 42);
    assert_eq!(id1.sequence(), 0);
    assert_eq!(id2.sequence(), 1);
    assert_eq!(id3.sequence(), 2);
    assert!(id1 < id2 && id2 < id3);
}

fn run_generator_handles_rollover(generator: &impl IdGenerator, time: &SharedTime) {
    for i in 0..=FlakeId::max_sequence() {
        let id = generator.try_poll_id().unwrap().unwrap_ready();
        assert_eq!(id.sequence(), i);
        assert_eq!(id.timestamp(), 42);
    }

    let yield_for = generator.try_poll_id().unwrap().unwrap_pending();
    assert_eq!(yield_for, 1);

    time.set(EPOCH_MS + 43);

    let id = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 0);
}

fn run_generator_waits_for_next_millisecond(generator: &impl IdGenerator) {
    let ids: Vec<FlakeId> = (0..=FlakeId::max_sequence() + 1)
        .map(|_| generator.next_flake_id().unwrap())
        .collect();

    let (same_tick, overflow) = ids.split_at(4096);
    for (i, id) in same_tick.iter().enumerate() {
        assert_eq!(id.timestamp(), 42);
        assert_eq!(id.sequence(), i as u64);
    }

    let last = overflow[0];
    assert!(last.timestamp() > 42);
    assert_eq!(last.sequence(), 0);
    assert!(last > same_tick[4095]);
}

fn run_generator_rejects_clock_regression(generator: &impl IdGenerator, time: &SharedTime) {
    let first = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(first.sequence(), 0);

    time.set(EPOCH_MS + 40);
    assert_eq!(
        generator.try_poll_id(),
        Err(Error::ClockRegression { behind_by_ms: 2 })
    );
    assert_eq!(
        generator.next_id(),
        Err(Error::ClockRegression { behind_by_ms: 2 })
    );

    // The failed calls must not have touched the state.
    time.set(EPOCH_MS + 42);
    let next = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(next.timestamp(), 42);
    assert_eq!(next.sequence(), 1);
}

fn run_generator_monotonic(generator: &impl IdGenerator) {
    const TOTAL_IDS: usize = 4096 * 64;

    let mut last = generator.next_flake_id().unwrap();
    for _ in 0..TOTAL_IDS {
        let id = generator.next_flake_id().unwrap();
        assert!(id > last, "{id:?} is not after {last:?}");
        assert_eq!(id.data_center_id(), 1);
        assert_eq!(id.worker_id(), 1);
        last = id;
    }
}

fn run_generator_monotonic_threaded<G>(generator: G)
where
    G: IdGenerator,
{
    const TOTAL_IDS: usize = 4096 * 64;
    let threads = num_cpus::get().clamp(2, 8);
    let ids_per_thread = TOTAL_IDS / threads;

    let seen_ids = Mutex::new(HashSet::with_capacity(TOTAL_IDS));

    scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let mut local = Vec::with_capacity(ids_per_thread);
                let mut last = 0_i64;
                for _ in 0..ids_per_thread {
                    let id = generator.next_id().unwrap();
                    assert!(id > last);
                    last = id;
                    local.push(id);
                }
                let mut seen = seen_ids.lock().unwrap();
                for id in local {
                    assert!(seen.insert(id), "duplicate id {id}");
                }
            });
        }
    });

    let final_count = seen_ids.lock().unwrap().len();
    assert_eq!(final_count, ids_per_thread * threads);
}

#[test]
fn lock_generator_sequence_test() {
    let (generator, _time) = lock_at(EPOCH_MS + 42);
    run_id_sequence_increments_within_same_tick(&generator);
}

#[test]
fn atomic_generator_sequence_test() {
    let (generator, _time) = atomic_at(EPOCH_MS + 42);
    run_id_sequence_increments_within_same_tick(&generator);
}

#[test]
fn lock_generator_pending_test() {
    let now = EPOCH_MS + 42;
    let generator = LockSnowflakeGenerator::from_components(
        0,
        0,
        DEFAULT_EPOCH,
        now,
        FlakeId::max_sequence(),
        SharedTime::at(now),
    )
    .unwrap();
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);
}

#[test]
fn atomic_generator_pending_test() {
    let now = EPOCH_MS + 42;
    let generator = AtomicSnowflakeGenerator::from_components(
        0,
        0,
        DEFAULT_EPOCH,
        now,
        FlakeId::max_sequence(),
        SharedTime::at(now),
    )
    .unwrap();
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);
}

#[test]
fn lock_generator_rollover_test() {
    let (generator, time) = lock_at(EPOCH_MS + 42);
    run_generator_handles_rollover(&generator, &time);
}

#[test]
fn atomic_generator_rollover_test() {
    let (generator, time) = atomic_at(EPOCH_MS + 42);
    run_generator_handles_rollover(&generator, &time);
}

#[test]
fn lock_generator_waits_for_next_millisecond() {
    let time = TickingTime {
        base: EPOCH_MS + 42,
        reads: AtomicU64::new(0),
        reads_per_tick: 4200,
    };
    let generator = LockSnowflakeGenerator::new(1, 1, time).unwrap();
    run_generator_waits_for_next_millisecond(&generator);
}

#[test]
fn atomic_generator_waits_for_next_millisecond() {
    let time = TickingTime {
        base: EPOCH_MS + 42,
        reads: AtomicU64::new(0),
        reads_per_tick: 4200,
    };
    let generator = AtomicSnowflakeGenerator::new(1, 1, time).unwrap();
    run_generator_waits_for_next_millisecond(&generator);
}

#[test]
fn lock_generator_clock_regression() {
    let (generator, time) = lock_at(EPOCH_MS + 42);
    run_generator_rejects_clock_regression(&generator, &time);
}

#[test]
fn atomic_generator_clock_regression() {
    let (generator, time) = atomic_at(EPOCH_MS + 42);
    run_generator_rejects_clock_regression(&generator, &time);
}

#[test]
fn same_millisecond_ids_differ_only_in_sequence() {
    let generator = LockSnowflakeGenerator::with_epoch(
        1,
        1,
        Duration::from_millis(EPOCH_MS),
        SharedTime::at(EPOCH_MS + 1_000),
    )
    .unwrap();

    let a = generator.next_id().unwrap();
    let b = generator.next_id().unwrap();

    assert_eq!(b - a, 1);
    assert_eq!((a ^ b) & !0xFFF, 0);
    assert_eq!(a, (1_000 << 24) | (1 << 18) | (1 << 12));
}

#[test]
fn distinct_identities_never_collide() {
    let time = SharedTime::at(EPOCH_MS + 7);
    let identities = [(0, 0), (0, 1), (1, 0), (63, 63)];
    let generators: Vec<_> = identities
        .iter()
        .map(|&(dc, worker)| LockSnowflakeGenerator::new(dc, worker, time.clone()).unwrap())
        .collect();

    let mut seen = HashSet::new();
    for generator in &generators {
        for _ in 0..100 {
            assert!(seen.insert(generator.next_id().unwrap()));
        }
    }
    assert_eq!(seen.len(), identities.len() * 100);
}

#[test]
fn rejects_out_of_range_identity() {
    let err = LockSnowflakeGenerator::new(64, 0, SystemClock).err();
    assert_eq!(
        err,
        Some(Error::InvalidConfiguration {
            field: "data_center_id",
            value: 64,
            max: 63
        })
    );

    let err = AtomicSnowflakeGenerator::new(0, 64, SystemClock).err();
    assert_eq!(
        err,
        Some(Error::InvalidConfiguration {
            field: "worker_id",
            value: 64,
            max: 63
        })
    );

    assert!(LockSnowflakeGenerator::new(63, 63, SystemClock).is_ok());
}

#[test]
fn rejects_timestamp_outside_epoch_range() {
    let (generator, time) = lock_at(EPOCH_MS - 1);
    assert_eq!(
        generator.try_poll_id(),
        Err(Error::TimestampOutOfRange {
            now_ms: EPOCH_MS - 1,
            epoch_ms: EPOCH_MS
        })
    );

    let past_end = EPOCH_MS + FlakeId::max_timestamp() + 1;
    time.set(past_end);
    assert!(matches!(
        generator.try_poll_id(),
        Err(Error::TimestampOutOfRange { .. })
    ));

    time.set(EPOCH_MS + FlakeId::max_timestamp());
    let id = generator.try_poll_id().unwrap().unwrap_ready();
    assert!(id.as_i64() > 0);
}

#[test]
fn lock_generator_system_clock_monotonic() {
    let generator = LockSnowflakeGenerator::new(1, 1, SystemClock).unwrap();
    run_generator_monotonic(&generator);
}

#[test]
fn atomic_generator_system_clock_monotonic() {
    let generator = AtomicSnowflakeGenerator::new(1, 1, SystemClock).unwrap();
    run_generator_monotonic(&generator);
}

#[test]
fn lock_generator_threaded_unique() {
    run_generator_monotonic_threaded(LockSnowflakeGenerator::new(0, 0, SystemClock).unwrap());
}

#[test]
fn atomic_generator_threaded_unique() {
    run_generator_monotonic_threaded(AtomicSnowflakeGenerator::new(0, 0, SystemClock).unwrap());
}

#[test]
fn generator_reports_identity() {
    let generator = AtomicSnowflakeGenerator::new(5, 9, SystemClock).unwrap();
    assert_eq!(generator.kind(), "snowflake-atomic");
    assert_eq!(generator.data_center_id(), 5);
    assert_eq!(generator.worker_id(), 9);
    assert_eq!(generator.epoch(), DEFAULT_EPOCH);

    let generator = LockSnowflakeGenerator::new(5, 9, SystemClock).unwrap();
    assert_eq!(generator.kind(), "snowflake");
}
