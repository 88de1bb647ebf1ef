//! A software stand-in for an HBM accelerator.
//!
//! The simulated device keeps its own copy of every buffer, so data only moves between host
//! and device through explicit transfers, and it runs the chase kernel when a launch ticket
//! is waited on. Per-partition capacity is enforced, and faults can be injected into any
//! command to exercise the driver's error paths.

use super::{AllocRequest, Accelerator, BinaryImage, ChaseArgs, DeviceCandidate, DeviceError};
use crate::{
    buffers::Region,
    partition::{PARTITION_COUNT, Partition},
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// Capacity of one partition: 8 GiB of HBM split over 32 pseudo-channels.
pub const DEFAULT_PARTITION_BYTES: usize = 256 << 20;

/// A command the simulated device can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    Allocate(Region),
    Write(Region),
    Bind,
    Submit,
    Complete,
    Read(Region),
    /// The kernel completes but leaves a wrong address behind.
    CorruptResult,
}

/// The simulated devices normally available to the CLI.
pub fn candidates() -> Vec<SimCandidate> {
    vec![SimCandidate::new("sim_hbm_32ch")]
}

pub struct SimCandidate {
    name: String,
    partition_bytes: usize,
    rejects_image: bool,
}

impl SimCandidate {
    pub fn new(name: &str) -> Self {
        SimCandidate {
            name: name.to_string(),
            partition_bytes: DEFAULT_PARTITION_BYTES,
            rejects_image: false,
        }
    }

    /// A candidate that fails to program, like a card with an incompatible shell.
    pub fn rejecting(name: &str) -> Self {
        SimCandidate {
            rejects_image: true,
            ..Self::new(name)
        }
    }

    pub fn with_partition_bytes(mut self, bytes: usize) -> Self {
        self.partition_bytes = bytes;
        self
    }
}

impl DeviceCandidate for SimCandidate {
    type Device = SimDevice;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn program(self, image: &BinaryImage, kernel: &str) -> Result<SimDevice, DeviceError> {
        if self.rejects_image {
            return Err(DeviceError::new("image does not match the device platform"));
        }
        if image.bytes().is_empty() {
            return Err(DeviceError::new("empty binary image"));
        }
        let kernel_bytes = kernel.as_bytes();
        if !image
            .bytes()
            .windows(kernel_bytes.len().max(1))
            .any(|w| w == kernel_bytes)
        {
            return Err(DeviceError::new(format!(
                "kernel {kernel:?} not found in {:?}",
                image.path()
            )));
        }
        Ok(SimDevice::new(&self.name, self.partition_bytes))
    }
}

#[derive(Default)]
struct Usage {
    bytes: RefCell<[usize; PARTITION_COUNT]>,
    live: Cell<usize>,
}

pub struct SimBuffer {
    region: Region,
    partition: Partition,
    bytes: usize,
    memory: Rc<RefCell<Vec<u32>>>,
    usage: Rc<Usage>,
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        self.usage.bytes.borrow_mut()[self.partition.index()] -= self.bytes;
        self.usage.live.set(self.usage.live.get() - 1);
    }
}

#[derive(Clone)]
struct Launch {
    table: Rc<RefCell<Vec<u32>>>,
    count: u32,
    state: Rc<RefCell<Vec<u32>>>,
}

/// Completion handle for a simulated command.
///
/// Transfers complete when they are queued; a launch runs when its ticket is waited on.
pub struct SimTicket {
    launch: Option<Launch>,
}

pub struct SimDevice {
    name: String,
    partition_bytes: usize,
    usage: Rc<Usage>,
    faults: RefCell<Vec<SimFault>>,
    bound: RefCell<Option<Launch>>,
    launches: Cell<usize>,
}

impl SimDevice {
    pub fn new(name: &str, partition_bytes: usize) -> Self {
        SimDevice {
            name: name.to_string(),
            partition_bytes,
            usage: Rc::default(),
            faults: RefCell::default(),
            bound: RefCell::default(),
            launches: Cell::new(0),
        }
    }

    /// Makes the next command matching `fault` fail once.
    pub fn inject(&self, fault: SimFault) {
        self.faults.borrow_mut().push(fault);
    }

    /// Number of kernel invocations submitted so far.
    pub fn launches(&self) -> usize {
        self.launches.get()
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.usage.live.get()
    }

    pub fn used_bytes(&self, partition: Partition) -> usize {
        self.usage.bytes.borrow()[partition.index()]
    }

    fn take_fault(&self, fault: SimFault) -> bool {
        let mut faults = self.faults.borrow_mut();
        match faults.iter().position(|f| *f == fault) {
            Some(i) => {
                faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn check(&self, fault: SimFault, what: &str) -> Result<(), DeviceError> {
        if self.take_fault(fault) {
            Err(DeviceError::new(format!("{what}: injected fault")))
        } else {
            Ok(())
        }
    }

    fn execute(&self, launch: Launch) -> Result<(), DeviceError> {
        let table = launch.table.borrow();
        let mut state = launch.state.borrow_mut();
        let mut current = state[0];
        for _ in 0..launch.count {
            current = *table.get(current as usize).ok_or_else(|| {
                DeviceError::new(format!(
                    "kernel read address {current} past the end of a {} element table",
                    table.len()
                ))
            })?;
        }
        if self.take_fault(SimFault::CorruptResult) {
            current = current.wrapping_add(1);
        }
        state[0] = current;
        Ok(())
    }
}

impl Accelerator for SimDevice {
    type Buffer = SimBuffer;
    type Ticket = SimTicket;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, request: &AllocRequest) -> Result<SimBuffer, DeviceError> {
        self.check(SimFault::Allocate(request.region), "clCreateBuffer")?;
        let bytes = request.len * size_of::<u32>();
        let slot = request.partition.index();
        let used = self.usage.bytes.borrow()[slot];
        if used + bytes > self.partition_bytes {
            return Err(DeviceError::new(format!(
                "{} out of memory: {bytes} bytes requested, {} free",
                request.partition,
                self.partition_bytes - used
            )));
        }
        self.usage.bytes.borrow_mut()[slot] += bytes;
        self.usage.live.set(self.usage.live.get() + 1);
        Ok(SimBuffer {
            region: request.region,
            partition: request.partition,
            bytes,
            memory: Rc::new(RefCell::new(vec![0; request.len])),
            usage: self.usage.clone(),
        })
    }

    fn enqueue_write(&self, buffer: &mut SimBuffer, src: &[u32]) -> Result<SimTicket, DeviceError> {
        self.check(SimFault::Write(buffer.region), "migrate to device")?;
        let mut memory = buffer.memory.borrow_mut();
        if memory.len() != src.len() {
            return Err(DeviceError::new(format!(
                "write of {} elements into a {} element buffer",
                src.len(),
                memory.len()
            )));
        }
        memory.copy_from_slice(src);
        Ok(SimTicket { launch: None })
    }

    fn bind(&self, args: ChaseArgs<'_, SimBuffer>) -> Result<(), DeviceError> {
        self.check(SimFault::Bind, "clSetKernelArg")?;
        *self.bound.borrow_mut() = Some(Launch {
            table: args.permutation.memory.clone(),
            count: args.count,
            state: args.state.memory.clone(),
        });
        Ok(())
    }

    fn submit(&self) -> Result<SimTicket, DeviceError> {
        self.check(SimFault::Submit, "enqueue task")?;
        let launch = self
            .bound
            .borrow_mut()
            .take()
            .ok_or_else(|| DeviceError::new("enqueue task: kernel arguments not set"))?;
        self.launches.set(self.launches.get() + 1);
        Ok(SimTicket {
            launch: Some(launch),
        })
    }

    fn enqueue_read(&self, buffer: &SimBuffer, dst: &mut [u32]) -> Result<SimTicket, DeviceError> {
        self.check(SimFault::Read(buffer.region), "migrate to host")?;
        let memory = buffer.memory.borrow();
        if memory.len() != dst.len() {
            return Err(DeviceError::new(format!(
                "read of {} elements from a {} element buffer",
                dst.len(),
                memory.len()
            )));
        }
        dst.copy_from_slice(&memory);
        Ok(SimTicket { launch: None })
    }

    fn wait(&self, ticket: SimTicket) -> Result<(), DeviceError> {
        match ticket.launch {
            Some(launch) => {
                self.check(SimFault::Complete, "kernel completion")?;
                self.execute(launch)
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(region: Region, partition: usize, len: usize) -> AllocRequest {
        AllocRequest {
            region,
            partition: Partition::new(partition).unwrap(),
            len,
        }
    }

    #[test]
    fn tracks_partition_usage() {
        let device = SimDevice::new("t", 1024);
        let a = device.allocate(&request(Region::Permutation, 3, 100)).unwrap();
        let b = device.allocate(&request(Region::ChaseState, 4, 1)).unwrap();
        assert_eq!(device.used_bytes(Partition::new(3).unwrap()), 400);
        assert_eq!(device.used_bytes(Partition::new(4).unwrap()), 4);
        assert_eq!(device.live_buffers(), 2);
        drop(a);
        drop(b);
        assert_eq!(device.used_bytes(Partition::new(3).unwrap()), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn partition_capacity() {
        let device = SimDevice::new("t", 1024);
        let _full = device.allocate(&request(Region::Permutation, 0, 256)).unwrap();
        let err = device
            .allocate(&request(Region::ChaseState, 0, 1))
            .err()
            .expect("partition 0 is full");
        assert!(err.to_string().contains("HBM[0]"), "{err}");
        assert!(device.allocate(&request(Region::ChaseState, 1, 1)).is_ok());
    }

    #[test]
    fn chase_runs_on_wait() {
        let device = SimDevice::new("t", DEFAULT_PARTITION_BYTES);
        let mut table = device.allocate(&request(Region::Permutation, 0, 3)).unwrap();
        let mut state = device.allocate(&request(Region::ChaseState, 0, 1)).unwrap();
        device.wait(device.enqueue_write(&mut table, &[1, 2, 0]).unwrap()).unwrap();
        device.wait(device.enqueue_write(&mut state, &[0]).unwrap()).unwrap();
        device
            .bind(ChaseArgs {
                permutation: &table,
                count: 2,
                state: &state,
            })
            .unwrap();
        let ticket = device.submit().unwrap();
        let mut out = [9];
        device.wait(device.enqueue_read(&state, &mut out).unwrap()).unwrap();
        assert_eq!(out, [0], "kernel ran before its ticket was waited on");
        device.wait(ticket).unwrap();
        device.wait(device.enqueue_read(&state, &mut out).unwrap()).unwrap();
        assert_eq!(out, [2]);
        assert_eq!(device.launches(), 1);
    }

    #[test]
    fn submit_requires_bind() {
        let device = SimDevice::new("t", DEFAULT_PARTITION_BYTES);
        assert!(device.submit().is_err());
        assert_eq!(device.launches(), 0);
    }

    #[test]
    fn faults_fire_once() {
        let device = SimDevice::new("t", DEFAULT_PARTITION_BYTES);
        device.inject(SimFault::Allocate(Region::ChaseState));
        assert!(device.allocate(&request(Region::Permutation, 0, 1)).is_ok());
        assert!(device.allocate(&request(Region::ChaseState, 0, 1)).is_err());
        assert!(device.allocate(&request(Region::ChaseState, 0, 1)).is_ok());
    }

    #[test]
    fn out_of_range_table() {
        let device = SimDevice::new("t", DEFAULT_PARTITION_BYTES);
        let mut table = device.allocate(&request(Region::Permutation, 0, 2)).unwrap();
        let mut state = device.allocate(&request(Region::ChaseState, 0, 1)).unwrap();
        device.wait(device.enqueue_write(&mut table, &[5, 0]).unwrap()).unwrap();
        device.wait(device.enqueue_write(&mut state, &[0]).unwrap()).unwrap();
        device
            .bind(ChaseArgs {
                permutation: &table,
                count: 2,
                state: &state,
            })
            .unwrap();
        let ticket = device.submit().unwrap();
        assert!(device.wait(ticket).is_err());
    }
}
