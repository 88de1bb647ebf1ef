use super::{CounterReading, Counters};
use perf_event::{
    Builder, Counter,
    events::{Cache, CacheId, CacheOp, CacheResult, Hardware, Software},
};

/// Host-side [`perf_event`] counters sampled while the driver waits on a dispatch.
///
/// These show what the host thread does during the blocking wait (spinning, sleeping,
/// interrupt handling), which is the noise floor of the wall-clock measurement.
/// Note that this crate uses the `perf-event` crate from the `perf-event2` package.
///
/// Counters are not grouped, so they may be multiplexed by the kernel.
/// Readings are not scaled by the element count.
pub struct PerfBackend {
    counters: Vec<(String, Counter, f64)>,
}

impl PerfBackend {
    /// Builds a [`PerfBackend`] from a list of event names.
    ///
    /// Invalid names and counters that cannot be opened (e.g. due to permission issues) are
    /// skipped with a warning message to stderr.
    pub fn with_counter_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let counters = names
            .into_iter()
            .map(str::trim)
            .filter_map(|name| {
                let mut scale = 1.0;
                let builder = match name {
                    "cycle" => Builder::new(Hardware::CPU_CYCLES),
                    "kcycle" => {
                        let mut builder = Builder::new(Hardware::CPU_CYCLES);
                        builder.exclude_user(true).exclude_kernel(false);
                        builder
                    }
                    "instr" => Builder::new(Hardware::INSTRUCTIONS),
                    "l1-miss" => Builder::new(Cache {
                        which: CacheId::L1D,
                        operation: CacheOp::READ,
                        result: CacheResult::MISS,
                    }),
                    "llc-miss" => Builder::new(Hardware::CACHE_MISSES),
                    "br-miss" => Builder::new(Hardware::BRANCH_MISSES),
                    "t-clock" => {
                        // reported in nanoseconds, shown in milliseconds like the timer
                        scale = 1.0e-6;
                        Builder::new(Software::TASK_CLOCK)
                    }
                    _ => {
                        eprintln!("invalid counter name: {name:?}");
                        return None;
                    }
                };
                match builder.build() {
                    Err(e) => {
                        eprintln!("failed to create counter {name:?}: {e}");
                        None
                    }
                    Ok(counter) => Some((name.to_string(), counter, scale)),
                }
            })
            .collect();
        PerfBackend { counters }
    }

    fn each(&mut self, op: &str, f: impl Fn(&mut Counter) -> std::io::Result<()>) {
        for (name, counter, _) in &mut self.counters {
            if let Err(e) = f(counter) {
                eprintln!("failed to {op} counter {name:?}: {e}");
            }
        }
    }
}

impl Counters for PerfBackend {
    fn enable(&mut self) {
        self.each("enable", Counter::enable);
    }

    fn disable(&mut self) {
        self.each("disable", Counter::disable);
    }

    fn reset(&mut self) {
        self.each("reset", Counter::reset);
    }

    fn read(&mut self, dst: &mut Vec<CounterReading>) {
        for (name, counter, scale) in &mut self.counters {
            let reading = match counter.read_full() {
                Ok(reading) => reading,
                Err(e) => {
                    eprintln!("failed to read counter {name:?}: {e}");
                    dst.push(CounterReading {
                        value: f64::NAN,
                        multiplexed: false,
                        enable_scale: false,
                    });
                    continue;
                }
            };
            let enabled = reading.time_enabled();
            let running = reading.time_running();
            let correction = match (enabled, running) {
                (Some(e), Some(r)) if !r.is_zero() => e.as_secs_f64() / r.as_secs_f64(),
                _ => 1.0,
            };
            dst.push(CounterReading {
                value: reading.count() as f64 * *scale * correction,
                multiplexed: enabled != running,
                enable_scale: false,
            });
        }
    }

    fn names(&self, dst: &mut dyn FnMut(&str)) {
        for (name, _, _) in &self.counters {
            dst(name);
        }
    }
}

#[test]
fn test_invalid_names_skipped() {
    let backend = PerfBackend::with_counter_names(["no-such-event", " ", "also-bad"]);
    assert!(backend.counters.is_empty());
}
