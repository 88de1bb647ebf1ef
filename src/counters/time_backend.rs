use super::{CounterReading, Counters};
use std::time::{Duration, Instant};

/// Wall-clock time the counters were enabled for, taken from the monotonic clock.
///
/// Reports two counters: `ms`, the total in milliseconds, and `ns/acc`, nanoseconds per
/// dereference (scaled by the element count).
pub struct TimeBackend {
    time: Result<Duration, Instant>,
}

impl Default for TimeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeBackend {
    pub fn new() -> Self {
        Self {
            time: Ok(Duration::ZERO),
        }
    }

    /// Time accumulated since the last reset.
    pub fn elapsed(&self) -> Duration {
        self.time.expect("timer read while running")
    }
}

impl Counters for TimeBackend {
    fn enable(&mut self) {
        let Ok(duration) = self.time else {
            panic!("timer already running")
        };
        self.time = Err(Instant::now() - duration);
    }

    fn disable(&mut self) {
        let Err(start) = self.time else {
            panic!("timer not running")
        };
        self.time = Ok(Instant::now() - start);
    }

    fn reset(&mut self) {
        assert!(self.time.is_ok(), "timer reset while running");
        self.time = Ok(Duration::ZERO)
    }

    fn read(&mut self, dst: &mut Vec<CounterReading>) {
        let elapsed = self.elapsed();
        dst.push(CounterReading {
            value: elapsed.as_secs_f64() * 1e3,
            multiplexed: false,
            enable_scale: false,
        });
        dst.push(CounterReading {
            value: elapsed.as_secs_f64() * 1e9,
            multiplexed: false,
            enable_scale: true,
        });
    }

    fn names(&self, dst: &mut dyn FnMut(&str)) {
        dst("ms");
        dst("ns/acc");
    }
}

#[test]
fn test_measures_enabled_span() {
    let mut timer = TimeBackend::new();
    timer.enable();
    std::thread::sleep(Duration::from_millis(5));
    timer.disable();
    let first = timer.elapsed();
    assert!(first >= Duration::from_millis(5));
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(timer.elapsed(), first, "disabled timer kept counting");
    let mut readings = Vec::new();
    timer.read(&mut readings);
    assert_eq!(readings.len(), 2);
    assert!((readings[0].value - first.as_secs_f64() * 1e3).abs() < 1e-9);
    assert!(readings[1].enable_scale);
    timer.reset();
    assert_eq!(timer.elapsed(), Duration::ZERO);
}

#[test]
#[should_panic]
fn test_double_enable() {
    let mut timer = TimeBackend::new();
    timer.enable();
    timer.enable();
}
