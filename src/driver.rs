use crate::{
    buffers::{AllocError, ChaseBuffers, Region},
    counters::{CounterReading, Counters, TimeBackend, counter_names},
    device::{Accelerator, ChaseArgs, DeviceError},
    partition::{Partition, PartitionPlan},
    permutation::Permutation,
    reference::{CHASE_START, reference_chase},
};
use std::{
    fmt,
    time::{Duration, SystemTime},
};
use thiserror::Error;

/// A stage of one dispatch, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Allocate { region: Region, partition: Partition },
    TransferIn(Region),
    Bind,
    Submit,
    Complete,
    TransferOut,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Allocate { region, partition } => {
                write!(f, "allocating the {region} buffer on {partition}")
            }
            Step::TransferIn(region) => write!(f, "transferring the {region} buffer to the device"),
            Step::Bind => f.write_str("binding kernel arguments"),
            Step::Submit => f.write_str("submitting the kernel"),
            Step::Complete => f.write_str("waiting for the kernel"),
            Step::TransferOut => f.write_str("transferring the chase state to the host"),
        }
    }
}

#[derive(Debug, Error)]
#[error("N={size}: {step} failed: {source}")]
pub struct DriverError {
    pub size: usize,
    pub step: Step,
    #[source]
    pub source: DeviceError,
}

impl DriverError {
    fn allocate(size: usize, e: AllocError) -> Self {
        DriverError {
            size,
            step: Step::Allocate {
                region: e.region,
                partition: e.partition,
            },
            source: e.source,
        }
    }
}

fn at(size: usize, step: Step) -> impl FnOnce(DeviceError) -> DriverError {
    move |source| DriverError { size, step, source }
}

/// The result of one timed kernel invocation.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub size: usize,
    pub start_time: SystemTime,
    /// Time from binding the arguments until the invocation completed.
    pub elapsed: Duration,
    /// Counter readings for the invocation, in the order of [`ChaseDriver::counter_names`].
    pub readings: Vec<CounterReading>,
    /// Terminal address reported by the device.
    pub device_addr: u32,
    /// Terminal address of the software chase over the same permutation.
    pub reference_addr: u32,
}

impl Dispatch {
    pub fn matches(&self) -> bool {
        self.device_addr == self.reference_addr
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }
}

/// Runs chases on a programmed device.
///
/// The device is programmed once and reused for every dispatch; buffers live only for the
/// dispatch that allocated them.
pub struct ChaseDriver<A> {
    device: A,
    plan: PartitionPlan,
    counters: (Box<dyn Counters>, TimeBackend),
    dispatches: usize,
}

impl<A: Accelerator> ChaseDriver<A> {
    pub fn new(device: A, plan: PartitionPlan) -> Self {
        Self::with_counters(device, plan, Box::new(()))
    }

    /// Records `extra` around each invocation in addition to the timer.
    pub fn with_counters(device: A, plan: PartitionPlan, extra: Box<dyn Counters>) -> Self {
        ChaseDriver {
            device,
            plan,
            counters: (extra, TimeBackend::new()),
            dispatches: 0,
        }
    }

    pub fn device(&self) -> &A {
        &self.device
    }

    pub fn plan(&self) -> PartitionPlan {
        self.plan
    }

    /// Number of kernel invocations submitted so far.
    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    pub fn counter_names(&self) -> Vec<String> {
        counter_names(&self.counters)
    }

    /// Chases through `permutation` on the device, starting at [`CHASE_START`].
    ///
    /// Both buffers are transferred to the device before the timer starts, and the chase
    /// state is transferred back after it stops, so the measurement covers only the kernel
    /// invocation. Every command is waited on before the next one is issued.
    pub fn run(&mut self, permutation: &Permutation) -> Result<Dispatch, DriverError> {
        let size = permutation.len();
        let reference_addr = reference_chase(permutation);

        let mut buffers =
            ChaseBuffers::allocate(&self.device, permutation, CHASE_START, self.plan)
                .map_err(|e| DriverError::allocate(size, e))?;

        for buffer in [&mut buffers.permutation, &mut buffers.state] {
            let step = Step::TransferIn(buffer.region());
            let ticket = buffer.upload(&self.device).map_err(at(size, step))?;
            self.device.wait(ticket).map_err(at(size, step))?;
        }

        let start_time = SystemTime::now();
        self.counters.reset();
        self.counters.enable();
        let launched = launch(
            &self.device,
            &buffers,
            permutation.count(),
            &mut self.dispatches,
        );
        self.counters.disable();
        launched.map_err(|(step, source)| DriverError { size, step, source })?;

        let ticket = buffers
            .state
            .download(&self.device)
            .map_err(at(size, Step::TransferOut))?;
        self.device
            .wait(ticket)
            .map_err(at(size, Step::TransferOut))?;

        let mut readings = Vec::new();
        self.counters.read(&mut readings);
        Ok(Dispatch {
            size,
            start_time,
            elapsed: self.counters.1.elapsed(),
            readings,
            device_addr: buffers.state_value(),
            reference_addr,
        })
    }
}

fn launch<A: Accelerator>(
    device: &A,
    buffers: &ChaseBuffers<A::Buffer>,
    count: u32,
    dispatches: &mut usize,
) -> Result<(), (Step, DeviceError)> {
    device
        .bind(ChaseArgs {
            permutation: buffers.permutation.handle(),
            count,
            state: buffers.state.handle(),
        })
        .map_err(|e| (Step::Bind, e))?;
    let ticket = device.submit().map_err(|e| (Step::Submit, e))?;
    *dispatches += 1;
    device.wait(ticket).map_err(|e| (Step::Complete, e))
}
