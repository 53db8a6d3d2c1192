use crate::{
    ClockPolicy, GenerateError, GeneratorConfig, LayoutParams, MachineId, SnowflakeGenerator,
    SnowflakeId, SystemClock, TimeSource,
};
use core::time::Duration;
use std::collections::{HashSet, VecDeque};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use std::thread::scope;

const EPOCH: i64 = 1_700_000_000_000;
const NOW: i64 = EPOCH + 1_000_000;

struct FixedTime(i64);

impl TimeSource for FixedTime {
    fn current_millis(&self) -> i64 {
        self.0
    }
}

/// Replays a fixed list of readings, then repeats the last one forever.
struct ScriptedTime {
    readings: Mutex<VecDeque<i64>>,
    last: AtomicI64,
}

impl ScriptedTime {
    fn new(readings: impl IntoIterator<Item = i64>) -> Self {
        let readings: VecDeque<i64> = readings.into_iter().collect();
        let last = *readings.back().expect("at least one reading");
        Self {
            readings: Mutex::new(readings),
            last: AtomicI64::new(last),
        }
    }
}

impl TimeSource for ScriptedTime {
    fn current_millis(&self) -> i64 {
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.load(Ordering::Relaxed))
    }
}

/// A clock the test moves by hand.
#[derive(Clone)]
struct ManualTime(Arc<AtomicI64>);

impl ManualTime {
    fn at(millis: i64) -> Self {
        Self(Arc::new(AtomicI64::new(millis)))
    }

    fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::Relaxed);
    }
}

impl TimeSource for ManualTime {
    fn current_millis(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

fn layout() -> GeneratorConfig {
    LayoutParams {
        epoch_millis: EPOCH,
        ..LayoutParams::default()
    }
    .validate(NOW)
    .unwrap()
}

fn generator_with<T: TimeSource>(machine_id: i64, time: T) -> SnowflakeGenerator<T> {
    let config = layout();
    let machine_id = MachineId::new(machine_id, &config).unwrap();
    SnowflakeGenerator::with_time(config, machine_id, time)
}

#[test]
fn sequence_increments_within_same_tick() {
    let generator = generator_with(3, FixedTime(NOW));
    let config = *generator.config();

    let ids: Vec<SnowflakeId> = (0..3).map(|_| generator.generate_id().unwrap()).collect();
    for (i, id) in ids.iter().enumerate() {
        let parts = config.decompose(*id);
        assert_eq!(parts.timestamp_delta, NOW - EPOCH);
        assert_eq!(parts.machine_id, 3);
        assert_eq!(parts.sequence, i as i64);
    }
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);
}

#[test]
fn sequence_resets_on_new_millisecond() {
    let time = ManualTime::at(NOW);
    let generator = generator_with(1, time.clone());
    let config = *generator.config();

    generator.generate_id().unwrap();
    generator.generate_id().unwrap();
    time.set(NOW + 5);
    let parts = config.decompose(generator.generate_id().unwrap());
    assert_eq!(parts.timestamp_delta, NOW + 5 - EPOCH);
    assert_eq!(parts.sequence, 0);
}

#[test]
fn burst_exhausts_sequence_then_rolls_to_next_millisecond() {
    // 4097 reads at NOW (one per call), then the clock ticks.
    let readings = core::iter::repeat_n(NOW, 4097).chain([NOW + 1]);
    let generator = generator_with(9, ScriptedTime::new(readings));
    let config = *generator.config();

    let mut previous = None;
    for expected in 0..=4095 {
        let id = generator.generate_id().unwrap();
        let parts = config.decompose(id);
        assert_eq!(parts.timestamp_delta, NOW - EPOCH);
        assert_eq!(parts.sequence, expected);
        assert!(previous < Some(id));
        previous = Some(id);
    }

    let id = generator.generate_id().unwrap();
    let parts = config.decompose(id);
    assert_eq!(parts.timestamp_delta, NOW + 1 - EPOCH);
    assert_eq!(parts.sequence, 0);
    assert_eq!(parts.machine_id, 9);
    assert!(previous < Some(id));
}

#[test]
fn clock_regression_is_waited_out() {
    // Second call sees the clock 2ms behind and must wait for it to recover.
    let time = ScriptedTime::new([NOW + 5, NOW + 3, NOW + 4, NOW + 5]);
    let generator = generator_with(2, time);
    let config = *generator.config();

    let first = generator.generate_id().unwrap();
    let second = generator.generate_id().unwrap();
    assert!(second > first);

    let parts = config.decompose(second);
    assert_eq!(parts.timestamp_delta, NOW + 5 - EPOCH);
    assert_eq!(parts.sequence, 1);
}

#[test]
fn regression_timeout_leaves_state_untouched() {
    let time = ManualTime::at(NOW + 10);
    let config = layout();
    let policy = ClockPolicy::default()
        .with_stall_warn_after(Duration::from_millis(1))
        .with_regression_timeout(Some(Duration::from_millis(20)));
    let generator = SnowflakeGenerator::with_policy(
        config,
        MachineId::new(4, &config).unwrap(),
        time.clone(),
        policy,
    );

    let first = generator.generate_id().unwrap();
    time.set(NOW);
    let err = generator.generate_id().unwrap_err();
    let GenerateError::ClockRegressionTimeout { behind_millis, .. } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(behind_millis, 10);

    time.set(NOW + 10);
    let next = generator.generate_id().unwrap();
    assert!(next > first);
    assert_eq!(config.decompose(next).sequence, 1);
}

#[test]
fn timestamp_overflow_is_an_error() {
    // One timestamp bit: deltas 0 and 1 only.
    let config = LayoutParams {
        machine_id_bits: 31,
        sequence_bits: 31,
        epoch_millis: NOW,
    }
    .validate(NOW)
    .unwrap();
    let time = ManualTime::at(NOW + 1);
    let generator =
        SnowflakeGenerator::with_time(config, MachineId::new(1, &config).unwrap(), time.clone());

    let id = generator.generate_id().unwrap();
    assert_eq!(config.decompose(id).timestamp_delta, 1);

    time.set(NOW + 2);
    assert_eq!(
        generator.generate_id(),
        Err(GenerateError::TimestampOverflow { delta: 2, max: 1 })
    );
}

#[test]
fn clock_before_epoch_is_an_error() {
    let generator = generator_with(0, FixedTime(EPOCH - 5));
    assert_eq!(
        generator.generate_id(),
        Err(GenerateError::ClockBeforeEpoch {
            now_millis: EPOCH - 5,
            epoch_millis: EPOCH
        })
    );
}

#[test]
fn round_trip_recovers_components() {
    let generator = generator_with(517, FixedTime(NOW + 77));
    let config = *generator.config();
    generator.generate_id().unwrap();
    let id = generator.generate_id().unwrap();

    let parts = config.decompose(id);
    assert_eq!(parts.timestamp_delta, NOW + 77 - EPOCH);
    assert_eq!(parts.machine_id, 517);
    assert_eq!(parts.sequence, 1);
    assert_eq!(config.compose(parts), id);
}

#[test]
fn monotonic_on_system_clock() {
    let config = LayoutParams::default()
        .validate(SystemClock.current_millis())
        .unwrap();
    let generator = SnowflakeGenerator::new(config, MachineId::new(1, &config).unwrap());

    let mut last = generator.generate_id().unwrap();
    for _ in 0..100_000 {
        let id = generator.generate_id().unwrap();
        assert!(id > last, "{id} is not greater than {last}");
        assert_eq!(config.decompose(id).machine_id, 1);
        last = id;
    }
}

#[test]
fn concurrent_callers_get_distinct_ids() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 20_000;

    let config = LayoutParams::default()
        .validate(SystemClock.current_millis())
        .unwrap();
    let generator = Arc::new(SnowflakeGenerator::new(
        config,
        MachineId::new(77, &config).unwrap(),
    ));
    let seen = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            let generator = Arc::clone(&generator);
            let seen = &seen;
            s.spawn(move || {
                let mut mine = Vec::with_capacity(IDS_PER_THREAD);
                for _ in 0..IDS_PER_THREAD {
                    mine.push(generator.generate_id().unwrap());
                }
                // Each thread observes its own ids in issuance order.
                for pair in mine.windows(2) {
                    assert!(pair[1] > pair[0]);
                    assert!(
                        config.decompose(pair[1]).timestamp_delta
                            >= config.decompose(pair[0]).timestamp_delta
                    );
                }
                let mut seen = seen.lock().unwrap();
                for id in mine {
                    assert_eq!(config.decompose(id).machine_id, 77);
                    assert!(seen.insert(id), "duplicate id {id}");
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
}
