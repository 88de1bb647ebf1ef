use crate::{
    Reporter,
    device::Accelerator,
    driver::{ChaseDriver, Dispatch, DriverError},
    permutation::{Pattern, Permutation, PermutationError},
    reference::CHASE_START,
    sampler::UniformSampler,
    struct_labels,
};
use rand::RngCore;
use thiserror::Error;

pub const DEFAULT_SIZES: [usize; 4] = [1024, 2048, 4096, 8192];

struct_labels! {
    pub struct TrialLabels {
        pub size: String,
        pub pattern: String,
        pub banks: String,
        pub cycle: String,
        pub device: String,
        pub reference: String,
        pub verdict: String,
    }
}

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("N={size}: generating the permutation failed: {source}")]
    Generate {
        size: usize,
        #[source]
        source: PermutationError,
    },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug)]
pub struct TrialOutcome {
    pub size: usize,
    pub result: Result<Dispatch, TrialError>,
}

#[derive(Debug)]
pub struct SweepSummary {
    pub outcomes: Vec<TrialOutcome>,
    /// Kernel invocations submitted during the sweep.
    pub dispatches: usize,
}

impl SweepSummary {
    pub fn matched(&self) -> usize {
        self.dispatched().filter(|d| d.matches()).count()
    }

    pub fn mismatches(&self) -> usize {
        self.dispatched().filter(|d| !d.matches()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    fn dispatched(&self) -> impl Iterator<Item = &Dispatch> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }
}

/// A list of independent trials, one per size.
#[derive(Debug, Clone)]
pub struct Sweep {
    sizes: Vec<usize>,
    pattern: Pattern,
}

impl Default for Sweep {
    fn default() -> Self {
        Self::new(DEFAULT_SIZES.to_vec(), Pattern::Shuffle)
    }
}

impl Sweep {
    /// One trial is run per entry of `sizes`, in the given order. Repeated sizes are
    /// independent trials.
    pub fn new(sizes: Vec<usize>, pattern: Pattern) -> Self {
        Sweep { sizes, pattern }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Runs every trial and reports each completed dispatch.
    ///
    /// A failed trial is reported on stderr and the sweep moves on to the next size.
    /// A device result that differs from the reference is reported with verdict `MISMATCH`.
    pub fn run<A: Accelerator, R: RngCore>(
        &self,
        driver: &mut ChaseDriver<A>,
        sampler: &mut UniformSampler<R>,
        reporter: &mut Reporter<TrialLabels>,
    ) -> SweepSummary {
        let dispatches_before = driver.dispatches();
        let outcomes = self
            .sizes
            .iter()
            .map(|&size| {
                let result = self.trial(size, driver, sampler, reporter);
                if let Err(e) = &result {
                    eprintln!("trial aborted: {e}");
                }
                TrialOutcome { size, result }
            })
            .collect();
        SweepSummary {
            outcomes,
            dispatches: driver.dispatches() - dispatches_before,
        }
    }

    fn trial<A: Accelerator, R: RngCore>(
        &self,
        size: usize,
        driver: &mut ChaseDriver<A>,
        sampler: &mut UniformSampler<R>,
        reporter: &mut Reporter<TrialLabels>,
    ) -> Result<Dispatch, TrialError> {
        let generated = Permutation::generate(self.pattern, size, sampler).and_then(|p| {
            let cycle = p.cycle_len(CHASE_START)?;
            Ok((p, cycle))
        });
        let (permutation, cycle) =
            generated.map_err(|source| TrialError::Generate { size, source })?;
        let dispatch = driver.run(&permutation)?;
        if !dispatch.matches() {
            eprintln!(
                "⚠️ N={size}: device ended at {} but the reference chase ended at {}",
                dispatch.device_addr, dispatch.reference_addr
            );
        }
        let labels = TrialLabels {
            size: size.to_string(),
            pattern: self.pattern.to_string(),
            banks: driver.plan().to_string(),
            cycle: cycle.to_string(),
            device: dispatch.device_addr.to_string(),
            reference: dispatch.reference_addr.to_string(),
            verdict: if dispatch.matches() { "ok" } else { "MISMATCH" }.to_string(),
        };
        reporter.record(size, dispatch.start_time, &dispatch.readings, &labels);
        Ok(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffers::Region,
        device::sim::{DEFAULT_PARTITION_BYTES, SimDevice, SimFault},
        driver::Step,
        formats::{Csv, SharedBuf},
        partition::PartitionPlan,
    };

    fn setup() -> (ChaseDriver<SimDevice>, SharedBuf, Reporter<TrialLabels>) {
        let driver = ChaseDriver::new(
            SimDevice::new("sim", DEFAULT_PARTITION_BYTES),
            PartitionPlan::default(),
        );
        let out = SharedBuf::default();
        let reporter = Reporter::new(
            Box::new(Csv::with_writer(Box::new(out.clone()))),
            driver.counter_names(),
        );
        (driver, out, reporter)
    }

    #[test]
    fn one_dispatch_per_size() {
        let (mut driver, out, mut reporter) = setup();
        let summary = Sweep::default().run(
            &mut driver,
            &mut UniformSampler::seeded(1),
            &mut reporter,
        );
        drop(reporter);
        assert_eq!(summary.dispatches, 4);
        assert_eq!(driver.device().launches(), 4);
        assert_eq!(summary.matched(), 4);
        assert_eq!(summary.failures(), 0);
        let sizes: Vec<usize> = summary.outcomes.iter().map(|o| o.size).collect();
        assert_eq!(sizes, DEFAULT_SIZES);

        let text = out.contents();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 5, "{text}");
        assert!(rows[0].starts_with("size,pattern,banks,cycle,device,reference,verdict,"));
        for (row, size) in rows[1..].iter().zip(DEFAULT_SIZES) {
            assert!(row.starts_with(&format!("{size},shuffle,0/0,")), "{row}");
            assert!(row.contains(",ok,"), "{row}");
        }
    }

    #[test]
    fn every_configured_size_is_a_trial() {
        let (mut driver, out, mut reporter) = setup();
        let configured = vec![1024, 1024, 2048, 512];
        let sweep = Sweep::new(configured.clone(), Pattern::Shuffle);
        assert_eq!(sweep.sizes(), configured);
        let summary = sweep.run(&mut driver, &mut UniformSampler::seeded(6), &mut reporter);
        drop(reporter);
        assert_eq!(summary.dispatches, configured.len());
        assert_eq!(summary.matched(), configured.len());
        let run: Vec<usize> = summary.outcomes.iter().map(|o| o.size).collect();
        assert_eq!(run, configured);
        let text = out.contents();
        let sizes: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|row| row.split(',').next().unwrap())
            .collect();
        assert_eq!(sizes, ["1024", "1024", "2048", "512"], "{text}");
    }

    #[test]
    fn failure_does_not_stop_sweep() {
        let (mut driver, out, mut reporter) = setup();
        driver
            .device()
            .inject(SimFault::Read(Region::ChaseState));
        let sweep = Sweep::new(vec![16, 32, 64], Pattern::Shuffle);
        let summary = sweep.run(&mut driver, &mut UniformSampler::seeded(2), &mut reporter);
        drop(reporter);
        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.matched(), 2);
        // the failed trial did reach the kernel
        assert_eq!(summary.dispatches, 3);
        match &summary.outcomes[0].result {
            Err(TrialError::Driver(e)) => assert_eq!(e.step, Step::TransferOut),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(out.contents().lines().count(), 3);
    }

    #[test]
    fn mismatch_is_reported_not_fatal() {
        let (mut driver, out, mut reporter) = setup();
        driver.device().inject(SimFault::CorruptResult);
        let sweep = Sweep::new(vec![128, 256], Pattern::Shuffle);
        let summary = sweep.run(&mut driver, &mut UniformSampler::seeded(3), &mut reporter);
        drop(reporter);
        assert_eq!(summary.mismatches(), 1);
        assert_eq!(summary.matched(), 1);
        assert_eq!(summary.failures(), 0);
        let text = out.contents();
        assert!(text.lines().nth(1).unwrap().contains(",MISMATCH,"), "{text}");
        assert!(text.lines().nth(2).unwrap().contains(",ok,"), "{text}");
    }

    #[test]
    fn zero_size_fails_generation() {
        let (mut driver, _out, mut reporter) = setup();
        let sweep = Sweep::new(vec![0, 8], Pattern::Shuffle);
        let summary = sweep.run(&mut driver, &mut UniformSampler::seeded(4), &mut reporter);
        assert!(matches!(
            summary.outcomes[0].result,
            Err(TrialError::Generate {
                size: 0,
                source: PermutationError::Empty
            })
        ));
        assert_eq!(summary.dispatches, 1);
    }

    #[test]
    fn cycle_pattern_touches_everything() {
        let (mut driver, out, mut reporter) = setup();
        let sweep = Sweep::new(vec![512], Pattern::Cycle);
        let summary = sweep.run(&mut driver, &mut UniformSampler::seeded(5), &mut reporter);
        drop(reporter);
        assert_eq!(summary.matched(), 1);
        let text = out.contents();
        assert!(
            text.lines().nth(1).unwrap().starts_with("512,cycle,0/0,512,0,0,ok,"),
            "{text}"
        );
    }

    #[test]
    fn reproducible_with_seed() {
        let addrs = |seed| {
            let (mut driver, _out, mut reporter) = setup();
            Sweep::default()
                .run(&mut driver, &mut UniformSampler::seeded(seed), &mut reporter)
                .outcomes
                .into_iter()
                .map(|o| o.result.unwrap().device_addr)
                .collect::<Vec<_>>()
        };
        assert_eq!(addrs(77), addrs(77));
    }
}
