//! [`ComputeRuntime`] over a real OpenCL ICD loader via `opencl3`.
//!
//! Requires the `opencl` feature. Handles are the `opencl3` wrapper types,
//! which release their underlying `cl_*` objects on drop.

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU};
use opencl3::error_codes::ClError;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, ClMem, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::platform::{get_platforms, Platform};
use opencl3::program::Program;
use opencl3::types::CL_BLOCKING;
use tracing::debug;

use crate::error::Status;
use crate::runtime::{
    ComputeRuntime, DeviceClass, KernelArg, MemAccess, PlatformAttribute, RuntimeResult,
};

fn status(e: ClError) -> Status {
    Status(e.0)
}

/// OpenCL runtime reached through the system ICD loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenClRuntime;

impl OpenClRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeRuntime for OpenClRuntime {
    type Platform = Platform;
    type Device = Device;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = Kernel;
    type Buffer = Buffer<f32>;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn platforms(&self) -> RuntimeResult<Vec<Platform>> {
        match get_platforms() {
            Ok(platforms) => Ok(platforms),
            // The ICD loader reports "no platforms" as an error code.
            Err(e) if Status(e.0) == Status::PLATFORM_NOT_FOUND_KHR => Ok(Vec::new()),
            Err(e) => Err(status(e)),
        }
    }

    fn platform_info(&self, platform: &Platform, attribute: PlatformAttribute) -> RuntimeResult<String> {
        let value = match attribute {
            PlatformAttribute::Profile => platform.profile(),
            PlatformAttribute::Version => platform.version(),
            PlatformAttribute::Name => platform.name(),
            PlatformAttribute::Vendor => platform.vendor(),
            PlatformAttribute::Extensions => platform.extensions(),
        };
        value.map_err(status)
    }

    fn device(&self, platform: &Platform, class: DeviceClass) -> RuntimeResult<Device> {
        let device_type = match class {
            DeviceClass::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceClass::Cpu => CL_DEVICE_TYPE_CPU,
        };
        let ids = platform.get_devices(device_type).map_err(status)?;
        let id = ids.first().copied().ok_or(Status::DEVICE_NOT_FOUND)?;
        debug!("{} device(s) of class {} on platform", ids.len(), class);
        Ok(Device::new(id))
    }

    fn device_name(&self, device: &Device) -> RuntimeResult<String> {
        device.name().map_err(status)
    }

    fn device_pci_bus_id(&self, device: &Device) -> RuntimeResult<u32> {
        device.pci_bus_id_nv().map_err(status)
    }

    fn create_context(&self, device: &Device) -> RuntimeResult<Context> {
        Context::from_device(device).map_err(status)
    }

    fn create_queue(&self, context: &Context, _device: &Device) -> RuntimeResult<CommandQueue> {
        // OpenCL 1.2 entry point: in-order, no properties. The context holds
        // exactly the one device.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(context, 0);
        queue.map_err(status)
    }

    fn create_program(&self, context: &Context, source: &str) -> RuntimeResult<Program> {
        Program::create_from_source(context, source).map_err(status)
    }

    fn build_program(&self, program: &mut Program, device: &Device, options: &str) -> RuntimeResult<()> {
        program.build(&[device.id()], options).map_err(status)
    }

    fn build_log(&self, program: &Program, device: &Device) -> RuntimeResult<String> {
        program.get_build_log(device.id()).map_err(status)
    }

    fn binary_sizes(&self, program: &Program) -> RuntimeResult<Vec<usize>> {
        program.get_binary_sizes().map_err(status)
    }

    fn read_binaries(&self, program: &Program, regions: &mut [&mut [u8]]) -> RuntimeResult<usize> {
        let binaries = program.get_binaries().map_err(status)?;
        for (region, binary) in regions.iter_mut().zip(&binaries) {
            if region.len() != binary.len() {
                return Err(Status::INVALID_VALUE);
            }
            region.copy_from_slice(binary);
        }
        Ok(binaries.len() * std::mem::size_of::<*mut u8>())
    }

    fn create_kernel(&self, program: &Program, name: &str) -> RuntimeResult<Kernel> {
        Kernel::create(program, name).map_err(status)
    }

    fn create_buffer(&self, context: &Context, access: MemAccess, len: usize) -> RuntimeResult<Buffer<f32>> {
        let flags = match access {
            MemAccess::ReadOnly => CL_MEM_READ_ONLY,
            MemAccess::WriteOnly => CL_MEM_WRITE_ONLY,
        };
        // SAFETY: no host pointer is passed, so the runtime owns the storage.
        unsafe { Buffer::<f32>::create(context, flags, len, std::ptr::null_mut()) }.map_err(status)
    }

    fn write_buffer(&self, queue: &CommandQueue, buffer: &mut Buffer<f32>, data: &[f32]) -> RuntimeResult<()> {
        // SAFETY: the write is blocking, so `data` outlives the transfer.
        unsafe { queue.enqueue_write_buffer(buffer, CL_BLOCKING, 0, data, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn read_buffer(&self, queue: &CommandQueue, buffer: &Buffer<f32>, out: &mut [f32]) -> RuntimeResult<()> {
        // SAFETY: the read is blocking, so `out` outlives the transfer.
        unsafe { queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, out, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn set_kernel_arg(&self, kernel: &Kernel, index: u32, arg: KernelArg<'_, Buffer<f32>>) -> RuntimeResult<()> {
        // SAFETY: argument types match the `square` signature
        // (`__global float*`, `__global float*`, `unsigned int`).
        let result = match arg {
            KernelArg::Buffer(buffer) => unsafe { kernel.set_arg(index, &buffer.get()) },
            KernelArg::Uint(value) => unsafe { kernel.set_arg(index, &value) },
        };
        result.map_err(status)
    }

    fn kernel_work_group_size(&self, kernel: &Kernel, device: &Device) -> RuntimeResult<usize> {
        kernel.get_work_group_size(device.id()).map_err(status)
    }

    fn enqueue_kernel(&self, queue: &CommandQueue, kernel: &Kernel, global: usize, local: usize) -> RuntimeResult<()> {
        let global = [global];
        let local = [local];
        // SAFETY: one work dimension; the size arrays live across the call and
        // every kernel argument has been bound.
        unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                std::ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                &[],
            )
        }
        .map(drop)
        .map_err(status)
    }

    fn finish(&self, queue: &CommandQueue) -> RuntimeResult<()> {
        queue.finish().map_err(status)
    }
}
