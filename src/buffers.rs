use crate::{
    device::{Accelerator, AllocRequest, DeviceError},
    partition::{Partition, PartitionPlan},
    permutation::Permutation,
};
use std::fmt;
use thiserror::Error;

/// What a chase buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// The permutation table, read by the kernel.
    Permutation,
    /// The single current-address cell, read and written by the kernel.
    ChaseState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Region {
    pub fn access(self) -> Access {
        match self {
            Region::Permutation => Access::ReadOnly,
            Region::ChaseState => Access::ReadWrite,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Region::Permutation => "permutation",
            Region::ChaseState => "chase state",
        })
    }
}

#[derive(Debug, Error)]
#[error("allocating the {region} buffer on {partition} failed: {source}")]
pub struct AllocError {
    pub region: Region,
    pub partition: Partition,
    #[source]
    pub source: DeviceError,
}

/// A device buffer on a fixed partition together with its host-side contents.
pub struct PartitionedBuffer<B> {
    region: Region,
    partition: Partition,
    host: Vec<u32>,
    handle: B,
}

impl<B> PartitionedBuffer<B> {
    pub fn allocate<A>(
        device: &A,
        region: Region,
        partition: Partition,
        host: Vec<u32>,
    ) -> Result<Self, AllocError>
    where
        A: Accelerator<Buffer = B>,
    {
        let request = AllocRequest {
            region,
            partition,
            len: host.len(),
        };
        let handle = device.allocate(&request).map_err(|source| AllocError {
            region,
            partition,
            source,
        })?;
        Ok(PartitionedBuffer {
            region,
            partition,
            host,
            handle,
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn host(&self) -> &[u32] {
        &self.host
    }

    pub fn handle(&self) -> &B {
        &self.handle
    }

    /// Queues the host contents for transfer to the device.
    pub fn upload<A>(&mut self, device: &A) -> Result<A::Ticket, DeviceError>
    where
        A: Accelerator<Buffer = B>,
    {
        device.enqueue_write(&mut self.handle, &self.host)
    }

    /// Queues the device contents for transfer back into the host copy.
    pub fn download<A>(&mut self, device: &A) -> Result<A::Ticket, DeviceError>
    where
        A: Accelerator<Buffer = B>,
    {
        device.enqueue_read(&self.handle, &mut self.host)
    }
}

/// The two buffers one chase needs.
pub struct ChaseBuffers<B> {
    pub permutation: PartitionedBuffer<B>,
    pub state: PartitionedBuffer<B>,
}

impl<B> ChaseBuffers<B> {
    /// Allocates the permutation table and the chase-state cell on the partitions in `plan`.
    ///
    /// The state cell starts out holding `start`.
    pub fn allocate<A>(
        device: &A,
        permutation: &Permutation,
        start: u32,
        plan: PartitionPlan,
    ) -> Result<Self, AllocError>
    where
        A: Accelerator<Buffer = B>,
    {
        Ok(ChaseBuffers {
            permutation: PartitionedBuffer::allocate(
                device,
                Region::Permutation,
                plan.permutation,
                permutation.as_slice().to_vec(),
            )?,
            state: PartitionedBuffer::allocate(
                device,
                Region::ChaseState,
                plan.state,
                vec![start],
            )?,
        })
    }

    /// The current address as last transferred to the host.
    pub fn state_value(&self) -> u32 {
        self.state.host[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{SimDevice, SimFault};

    fn plan(permutation: usize, state: usize) -> PartitionPlan {
        PartitionPlan {
            permutation: Partition::new(permutation).unwrap(),
            state: Partition::new(state).unwrap(),
        }
    }

    fn table() -> Permutation {
        Permutation::try_from(vec![3u32, 0, 1, 2]).unwrap()
    }

    #[test]
    fn placed_on_planned_partitions() {
        let device = SimDevice::new("t", 1 << 20);
        let buffers = ChaseBuffers::allocate(&device, &table(), 0, plan(5, 31)).unwrap();
        assert_eq!(buffers.permutation.partition().index(), 5);
        assert_eq!(buffers.state.partition().index(), 31);
        assert_eq!(buffers.permutation.host(), &[3, 0, 1, 2]);
        assert_eq!(buffers.state.host(), &[0]);
        assert_eq!(buffers.permutation.region().access(), Access::ReadOnly);
        assert_eq!(buffers.state.region().access(), Access::ReadWrite);
        assert_eq!(device.used_bytes(Partition::new(5).unwrap()), 16);
        assert_eq!(device.used_bytes(Partition::new(31).unwrap()), 4);
    }

    #[test]
    fn state_starts_at_start() {
        let device = SimDevice::new("t", 1 << 20);
        let buffers = ChaseBuffers::allocate(&device, &table(), 2, plan(0, 0)).unwrap();
        assert_eq!(buffers.state_value(), 2);
    }

    #[test]
    fn failure_names_region() {
        let device = SimDevice::new("t", 1 << 20);
        device.inject(SimFault::Allocate(Region::ChaseState));
        let err = ChaseBuffers::allocate(&device, &table(), 0, plan(2, 9))
            .err()
            .expect("state allocation should fail");
        assert_eq!(err.region, Region::ChaseState);
        assert_eq!(err.partition.index(), 9);
        assert!(err.to_string().contains("chase state"), "{err}");
        // the permutation buffer allocated before the failure is released again
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn full_partition_does_not_fall_back() {
        let device = SimDevice::new("t", 8);
        let err = ChaseBuffers::allocate(&device, &table(), 0, plan(0, 1))
            .err()
            .expect("table does not fit");
        assert_eq!(err.region, Region::Permutation);
        assert_eq!(err.partition.index(), 0);
        for p in Partition::all() {
            assert_eq!(device.used_bytes(p), 0);
        }
    }
}
