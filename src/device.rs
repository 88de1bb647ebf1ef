//! The interface between the benchmark and an accelerator runtime.
//!
//! An [`Accelerator`] is a device that has been programmed with a binary image containing the
//! chase kernel. Commands are queued with `enqueue_*`/[`submit`](Accelerator::submit), each
//! returning a ticket that [`wait`](Accelerator::wait) blocks on.
//! The driver always waits before issuing the next dependent command.
//!
//! Devices are discovered as [`DeviceCandidate`]s and turned into accelerators by
//! [`program_first`].

#[cfg(feature = "opencl")]
pub mod opencl;
pub mod sim;

use crate::{buffers::Region, partition::Partition};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Name of the compute engine inside the binary image.
pub const KERNEL_NAME: &str = "pointer_chasing";

/// A failure reported by the accelerator runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DeviceError(String);

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        DeviceError(message.into())
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to read binary image {path:?}: {source}")]
    Image { path: PathBuf, source: io::Error },
    #[error("failed to enumerate devices: {0}")]
    Enumerate(#[source] DeviceError),
    #[error("no devices found")]
    NoDevices,
    #[error("failed to program any of {attempts} device(s) with {image:?}")]
    NoProgrammableDevice { attempts: usize, image: PathBuf },
}

/// A buffer the driver asks a device for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    pub region: Region,
    pub partition: Partition,
    /// Number of `u32` elements.
    pub len: usize,
}

/// The three kernel arguments, in the order the compute engine declares them.
pub struct ChaseArgs<'a, B> {
    pub permutation: &'a B,
    pub count: u32,
    pub state: &'a B,
}

pub trait Accelerator {
    type Buffer;
    type Ticket;

    /// Identifying name of the programmed device.
    fn name(&self) -> &str;

    /// Allocates a buffer bound to `request.partition`.
    ///
    /// Implementations must fail rather than place the buffer elsewhere.
    fn allocate(&self, request: &AllocRequest) -> Result<Self::Buffer, DeviceError>;

    /// Queues a host-to-device copy of `src` into `buffer`.
    fn enqueue_write(
        &self,
        buffer: &mut Self::Buffer,
        src: &[u32],
    ) -> Result<Self::Ticket, DeviceError>;

    /// Sets the compute engine's arguments for the next [`submit`](Self::submit).
    fn bind(&self, args: ChaseArgs<'_, Self::Buffer>) -> Result<(), DeviceError>;

    /// Queues one invocation of the compute engine with the bound arguments.
    fn submit(&self) -> Result<Self::Ticket, DeviceError>;

    /// Queues a device-to-host copy of `buffer` into `dst`.
    fn enqueue_read(&self, buffer: &Self::Buffer, dst: &mut [u32])
    -> Result<Self::Ticket, DeviceError>;

    /// Blocks until the command behind `ticket` has completed.
    fn wait(&self, ticket: Self::Ticket) -> Result<(), DeviceError>;
}

/// An enumerated device that has not been programmed yet.
pub trait DeviceCandidate {
    type Device: Accelerator;

    fn name(&self) -> String;

    /// Loads `image` onto the device and looks up the compute engine called `kernel`.
    fn program(self, image: &BinaryImage, kernel: &str) -> Result<Self::Device, DeviceError>;
}

/// A precompiled compute-engine image read from disk.
pub struct BinaryImage {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl BinaryImage {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref().to_path_buf();
        match fs::read(&path) {
            Ok(bytes) => Ok(BinaryImage { path, bytes }),
            Err(source) => Err(SetupError::Image { path, source }),
        }
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        BinaryImage {
            path: path.into(),
            bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Programs each candidate in turn and returns the first device that accepts the image.
///
/// Every attempt and its outcome is reported on stderr.
pub fn program_first<C: DeviceCandidate>(
    candidates: impl IntoIterator<Item = C>,
    image: &BinaryImage,
    kernel: &str,
) -> Result<C::Device, SetupError> {
    let mut attempts = 0;
    for (i, candidate) in candidates.into_iter().enumerate() {
        attempts += 1;
        eprintln!("Trying to program device[{i}]: {}", candidate.name());
        match candidate.program(image, kernel) {
            Ok(device) => {
                eprintln!("Device[{i}]: program successful!");
                return Ok(device);
            }
            Err(e) => eprintln!("Failed to program device[{i}]: {e}"),
        }
    }
    if attempts == 0 {
        Err(SetupError::NoDevices)
    } else {
        Err(SetupError::NoProgrammableDevice {
            attempts,
            image: image.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{sim::SimCandidate, *};

    fn image() -> BinaryImage {
        BinaryImage::from_bytes("chase.xclbin", b"xclbin2\0pointer_chasing".to_vec())
    }

    #[test]
    fn picks_first_programmable() {
        let candidates = [
            SimCandidate::rejecting("dead"),
            SimCandidate::new("alive"),
            SimCandidate::new("spare"),
        ];
        let device = program_first(candidates, &image(), KERNEL_NAME).unwrap();
        assert_eq!(device.name(), "alive");
    }

    #[test]
    fn programmed_device_keeps_candidate_capacity() {
        let candidate = SimCandidate::new("small").with_partition_bytes(64);
        let device = program_first([candidate], &image(), KERNEL_NAME).unwrap();
        let request = |len| AllocRequest {
            region: Region::Permutation,
            partition: Partition::FIRST,
            len,
        };
        assert!(device.allocate(&request(17)).is_err());
        let buffer = device.allocate(&request(16)).unwrap();
        assert_eq!(device.used_bytes(Partition::FIRST), 64);
        drop(buffer);
    }

    #[test]
    fn no_candidates() {
        let err = program_first(Vec::<SimCandidate>::new(), &image(), KERNEL_NAME)
            .err()
            .expect("nothing to program");
        assert!(matches!(err, SetupError::NoDevices));
    }

    #[test]
    fn none_programmable() {
        let candidates = [SimCandidate::rejecting("a"), SimCandidate::rejecting("b")];
        let err = program_first(candidates, &image(), KERNEL_NAME)
            .err()
            .expect("every candidate rejects the image");
        assert!(matches!(
            err,
            SetupError::NoProgrammableDevice { attempts: 2, .. }
        ));
    }

    #[test]
    fn wrong_kernel_name() {
        let err = program_first([SimCandidate::new("a")], &image(), "vadd")
            .err()
            .expect("image has no vadd kernel");
        assert!(matches!(
            err,
            SetupError::NoProgrammableDevice { attempts: 1, .. }
        ));
    }

    #[test]
    fn missing_image() {
        let err = BinaryImage::load("/nonexistent/chase.xclbin")
            .err()
            .expect("load should fail");
        assert!(matches!(err, SetupError::Image { .. }));
        assert!(err.to_string().contains("chase.xclbin"));
    }
}
