//! OpenCL backend for Xilinx accelerator cards.
//!
//! Buffers are placed with the vendor extension pointer, which carries the partition's
//! memory-topology index. The compute engine is launched as a single work item.

use super::{AllocRequest, Accelerator, BinaryImage, ChaseArgs, DeviceCandidate, DeviceError};
use crate::buffers::Access;
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{CL_DEVICE_TYPE_ACCELERATOR, Device},
    event::Event,
    kernel::Kernel,
    memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, ClMem},
    platform::get_platforms,
    program::Program,
    types::{CL_BLOCKING, cl_mem_flags, cl_uint},
};
use std::{ffi::c_void, ptr};

const VENDOR_PLATFORM: &str = "Xilinx";

/// Memory flag telling the runtime that `host_ptr` points at a [`MemExtPtr`].
const CL_MEM_EXT_PTR_XILINX: cl_mem_flags = 1 << 31;

#[repr(C)]
struct MemExtPtr {
    flags: u32,
    obj: *mut c_void,
    param: *mut c_void,
}

fn cl_err(what: &str) -> impl Fn(opencl3::error_codes::ClError) -> DeviceError + '_ {
    move |e| DeviceError::new(format!("{what}: {e}"))
}

/// Accelerator devices of the vendor platform, in enumeration order.
pub fn candidates() -> Result<Vec<ClCandidate>, DeviceError> {
    let mut found = Vec::new();
    for platform in get_platforms().map_err(cl_err("clGetPlatformIDs"))? {
        let name = platform.name().map_err(cl_err("clGetPlatformInfo"))?;
        if name != VENDOR_PLATFORM {
            continue;
        }
        let ids = platform
            .get_devices(CL_DEVICE_TYPE_ACCELERATOR)
            .map_err(cl_err("clGetDeviceIDs"))?;
        found.extend(ids.into_iter().map(|id| ClCandidate {
            device: Device::new(id),
        }));
    }
    Ok(found)
}

pub struct ClCandidate {
    device: Device,
}

impl DeviceCandidate for ClCandidate {
    type Device = ClDevice;

    fn name(&self) -> String {
        self.device.name().unwrap_or_default().trim().to_string()
    }

    fn program(self, image: &BinaryImage, kernel: &str) -> Result<ClDevice, DeviceError> {
        let name = self.name();
        let context = Context::from_device(&self.device).map_err(cl_err("clCreateContext"))?;
        let queue =
            CommandQueue::create_default(&context, 0).map_err(cl_err("clCreateCommandQueue"))?;
        let program = Program::create_and_build_from_binary(&context, &[image.bytes()], "")
            .map_err(|e| DeviceError::new(format!("clCreateProgramWithBinary: {e}")))?;
        let kernel = Kernel::create(&program, kernel).map_err(cl_err("clCreateKernel"))?;
        Ok(ClDevice {
            name,
            context,
            queue,
            kernel,
            _program: program,
        })
    }
}

pub struct ClDevice {
    name: String,
    context: Context,
    queue: CommandQueue,
    kernel: Kernel,
    _program: Program,
}

impl Accelerator for ClDevice {
    type Buffer = Buffer<cl_uint>;
    type Ticket = Event;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, request: &AllocRequest) -> Result<Buffer<cl_uint>, DeviceError> {
        let access = match request.region.access() {
            Access::ReadOnly => CL_MEM_READ_ONLY,
            Access::ReadWrite => CL_MEM_READ_WRITE,
        };
        let mut ext = MemExtPtr {
            flags: request.partition.topology_flags(),
            obj: ptr::null_mut(),
            param: ptr::null_mut(),
        };
        // The extension struct is only read during the call.
        unsafe {
            Buffer::<cl_uint>::create(
                &self.context,
                access | CL_MEM_EXT_PTR_XILINX,
                request.len,
                &mut ext as *mut MemExtPtr as *mut c_void,
            )
        }
        .map_err(cl_err("clCreateBuffer"))
    }

    fn enqueue_write(&self, buffer: &mut Buffer<cl_uint>, src: &[u32]) -> Result<Event, DeviceError> {
        unsafe { self.queue.enqueue_write_buffer(buffer, CL_BLOCKING, 0, src, &[]) }
            .map_err(cl_err("clEnqueueWriteBuffer"))
    }

    fn bind(&self, args: ChaseArgs<'_, Buffer<cl_uint>>) -> Result<(), DeviceError> {
        unsafe {
            self.kernel
                .set_arg(0, &args.permutation.get())
                .and_then(|()| self.kernel.set_arg(1, &args.count))
                .and_then(|()| self.kernel.set_arg(2, &args.state.get()))
        }
        .map_err(cl_err("clSetKernelArg"))
    }

    fn submit(&self) -> Result<Event, DeviceError> {
        let global = [1usize];
        unsafe {
            self.queue.enqueue_nd_range_kernel(
                self.kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                ptr::null(),
                &[],
            )
        }
        .map_err(cl_err("clEnqueueNDRangeKernel"))
    }

    fn enqueue_read(&self, buffer: &Buffer<cl_uint>, dst: &mut [u32]) -> Result<Event, DeviceError> {
        unsafe { self.queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, dst, &[]) }
            .map_err(cl_err("clEnqueueReadBuffer"))
    }

    fn wait(&self, ticket: Event) -> Result<(), DeviceError> {
        ticket.wait().map_err(cl_err("clWaitForEvents"))
    }
}
