#[cfg(target_os = "linux")]
mod perf_backend;
mod time_backend;

#[cfg(target_os = "linux")]
pub use perf_backend::PerfBackend;
pub use time_backend::TimeBackend;

/// A set of named measurements taken around each kernel dispatch.
///
/// The driver resets and enables its counters right before binding the kernel arguments
/// and disables them once the invocation has completed, so transfers are never included.
pub trait Counters {
    /// Enable counters.
    fn enable(&mut self);
    /// Disable counters.
    fn disable(&mut self);
    /// Reset counters.
    fn reset(&mut self);
    /// Read all counters and append the readings to `dst`.
    fn read(&mut self, dst: &mut Vec<CounterReading>);
    /// Appends the counter names to `dst`.
    ///
    /// Names must be appended in the same order as the values appended by [`read`](Self::read).
    fn names(&self, dst: &mut dyn FnMut(&str));
}

impl Counters for Box<dyn Counters> {
    fn enable(&mut self) {
        (**self).enable();
    }

    fn disable(&mut self) {
        (**self).disable();
    }

    fn reset(&mut self) {
        (**self).reset();
    }

    fn read(&mut self, dst: &mut Vec<CounterReading>) {
        (**self).read(dst);
    }

    fn names(&self, dst: &mut dyn FnMut(&str)) {
        (**self).names(dst);
    }
}

impl<A: Counters, B: Counters> Counters for (A, B) {
    /// Enables A, then B
    fn enable(&mut self) {
        self.0.enable();
        self.1.enable();
    }

    /// Disables B, then A (reverse starting order)
    fn disable(&mut self) {
        self.1.disable();
        self.0.disable();
    }

    fn reset(&mut self) {
        self.0.reset();
        self.1.reset();
    }

    fn read(&mut self, dst: &mut Vec<CounterReading>) {
        self.0.read(dst);
        self.1.read(dst);
    }

    fn names(&self, dst: &mut dyn FnMut(&str)) {
        self.0.names(dst);
        self.1.names(dst);
    }
}

/// No counters.
impl Counters for () {
    fn enable(&mut self) {}

    fn disable(&mut self) {}

    fn reset(&mut self) {}

    fn read(&mut self, _dst: &mut Vec<CounterReading>) {}

    fn names(&self, _dst: &mut dyn FnMut(&str)) {}
}

/// Host-side counters requested through `CHASE_EVENTS`, in addition to the dispatch timer.
///
/// Without `CHASE_EVENTS` no extra counters are recorded.
pub fn counters_from_env() -> Box<dyn Counters> {
    match std::env::var("CHASE_EVENTS") {
        Ok(events) if !events.trim().is_empty() => {
            #[cfg(target_os = "linux")]
            return Box::new(PerfBackend::with_counter_names(events.split(',')));
            #[cfg(not(target_os = "linux"))]
            {
                eprintln!("CHASE_EVENTS={events:?} ignored: perf events need Linux");
                Box::new(())
            }
        }
        _ => Box::new(()),
    }
}

/// A reading of a counter.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterReading {
    /// The value to report to the user
    pub value: f64,
    /// if `true`, the reading was multiplexed and may therefore be less reliable.
    /// Setting this causes some output formats to include a warning.
    pub multiplexed: bool,
    /// if `true`, the reading should be divided by the element count of the chase.
    pub enable_scale: bool,
}

impl CounterReading {
    pub fn scaled_value(&self, scale: usize) -> f64 {
        if self.enable_scale {
            self.value / scale as f64
        } else {
            self.value
        }
    }
}

pub fn counter_names(counters: &dyn Counters) -> Vec<String> {
    let mut names = Vec::new();
    counters.names(&mut |name| names.push(name.to_string()));
    names
}

#[test]
fn test_scaled_value() {
    let per_access = CounterReading {
        value: 2048.0,
        multiplexed: false,
        enable_scale: true,
    };
    let total = CounterReading {
        enable_scale: false,
        ..per_access.clone()
    };
    assert_eq!(per_access.scaled_value(1024), 2.0);
    assert_eq!(total.scaled_value(1024), 2048.0);
}

#[test]
fn test_pair_order() {
    let pair: (Box<dyn Counters>, TimeBackend) = (Box::new(()), TimeBackend::new());
    assert_eq!(counter_names(&pair), ["ms", "ns/acc"]);
}
