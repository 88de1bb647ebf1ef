//! Pointer-chasing latency benchmark for accelerators with partitioned memory.
//!
//! A random permutation of `0..N` is placed in one memory partition and a single
//! current-address cell in another. The compute engine then repeatedly replaces the address
//! with the table entry it points at, `N` times. Since each load depends on the previous one,
//! the runtime of the invocation divided by `N` is the effective random-access latency.
//! The final address is checked against the same chase performed on the host.
//!
//! The pieces, from the bottom up:
//! - [`UniformSampler`] and [`Permutation`] build the chase table,
//! - [`reference_chase`] computes the expected result,
//! - [`ChaseBuffers`] places the buffers on explicit [`Partition`]s,
//! - [`ChaseDriver`] transfers, dispatches and times one chase on an [`Accelerator`],
//! - [`Sweep`] repeats that for a list of sizes and reports each through a [`Reporter`].
//!
//! Reports are written in the format selected by `CHASE_FORMAT` (`lines`, `csv` or `md`).

mod labels;

pub mod buffers;
pub mod counters;
pub mod device;
pub mod driver;
pub mod formats;
pub mod partition;
pub mod permutation;
pub mod reference;
pub mod sampler;
pub mod sweep;

pub use buffers::{AllocError, ChaseBuffers, PartitionedBuffer, Region};
pub use counters::{CounterReading, Counters, counters_from_env};
pub use device::{Accelerator, BinaryImage, DeviceCandidate, DeviceError, SetupError};
pub use driver::{ChaseDriver, Dispatch, DriverError, Step};
pub use formats::{Format, format_from_env};
pub use labels::Labels;
pub use partition::{PARTITION_COUNT, Partition, PartitionPlan};
pub use permutation::{Pattern, Permutation, PermutationError};
pub use reference::{CHASE_START, reference_chase};
pub use sampler::UniformSampler;
pub use sweep::{Sweep, SweepSummary, TrialLabels};

use std::{marker::PhantomData, time::SystemTime};

/// Forwards one row per dispatch to a [`Format`].
///
/// Buffered formats are flushed when the reporter is dropped.
pub struct Reporter<L> {
    format: Box<dyn Format>,
    counter_names: Vec<String>,
    label_names: &'static [&'static str],
    _p: PhantomData<fn(&L)>,
}

impl<L: Labels> Reporter<L> {
    /// `counter_names` must match the order of the readings passed to [`record`](Self::record).
    pub fn new(format: Box<dyn Format>, counter_names: Vec<String>) -> Self {
        Reporter {
            format,
            counter_names,
            label_names: L::names(),
            _p: PhantomData,
        }
    }

    /// Uses the format selected by `CHASE_FORMAT`.
    pub fn from_env(counter_names: Vec<String>) -> Self {
        Self::new(format_from_env(), counter_names)
    }

    /// Writes one row. `scale` is the element count the scaled counters are divided by.
    pub fn record(
        &mut self,
        scale: usize,
        start_time: SystemTime,
        readings: &[CounterReading],
        labels: &L,
    ) {
        let result = self.format.push(
            scale,
            start_time,
            &self.counter_names,
            readings,
            &mut |dst| labels.values(dst),
            self.label_names,
        );
        if let Err(err) = result {
            eprintln!("error writing report: {err}");
        }
    }
}

impl<L> Drop for Reporter<L> {
    fn drop(&mut self) {
        if let Err(err) = self
            .format
            .dump_and_reset(self.label_names, &self.counter_names)
        {
            eprintln!("error writing report: {err}");
        }
    }
}
