//! The compute runtime boundary.
//!
//! [`ComputeRuntime`] is the thin, status-code level surface every
//! device-facing step goes through: discovery, context and queue creation,
//! program build and binary queries, kernel and buffer lifecycle, and the
//! enqueue verbs. Handles are associated types and release themselves on
//! drop; callers hold them in [`crate::scope::Scoped`] guards.
//!
//! Abstracted to allow running the pipeline without GPU hardware (see
//! [`crate::reference::ReferenceRuntime`]).

use std::fmt;

use crate::error::Status;

/// Result of a single runtime call: the value or the raw runtime status.
pub type RuntimeResult<T> = std::result::Result<T, Status>;

/// Class of device requested from a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceClass {
    #[default]
    Gpu,
    Cpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown device class '{other}'. Expected one of: gpu, cpu")),
        }
    }
}

/// Direction of a device buffer, from the kernel's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemAccess {
    ReadOnly,
    WriteOnly,
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::WriteOnly => write!(f, "write-only"),
        }
    }
}

/// Descriptive string attributes a platform can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformAttribute {
    Profile,
    Version,
    Name,
    Vendor,
    Extensions,
}

/// Platform attributes reported at startup, in display order.
pub const PLATFORM_ATTRIBUTES: [(PlatformAttribute, &str); 5] = [
    (PlatformAttribute::Profile, "Profile"),
    (PlatformAttribute::Version, "Version"),
    (PlatformAttribute::Name, "Name"),
    (PlatformAttribute::Vendor, "Vendor"),
    (PlatformAttribute::Extensions, "Extensions"),
];

/// A positional kernel argument.
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    Uint(u32),
}

/// Client surface of a vendor-neutral compute runtime.
///
/// Every method maps onto one runtime verb and reports failure as the raw
/// [`Status`]; callers attach operation context when turning it into a
/// [`crate::error::ComputeError`] or [`crate::error::DumpError`].
pub trait ComputeRuntime {
    type Platform;
    type Device;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Buffer;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn platforms(&self) -> RuntimeResult<Vec<Self::Platform>>;

    fn platform_info(
        &self,
        platform: &Self::Platform,
        attribute: PlatformAttribute,
    ) -> RuntimeResult<String>;

    /// First device of `class` on `platform`.
    fn device(&self, platform: &Self::Platform, class: DeviceClass) -> RuntimeResult<Self::Device>;

    fn device_name(&self, device: &Self::Device) -> RuntimeResult<String>;

    /// PCI bus id through the NVIDIA vendor extension.
    fn device_pci_bus_id(&self, device: &Self::Device) -> RuntimeResult<u32>;

    fn create_context(&self, device: &Self::Device) -> RuntimeResult<Self::Context>;

    /// In-order queue with default properties.
    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
    ) -> RuntimeResult<Self::Queue>;

    fn create_program(&self, context: &Self::Context, source: &str) -> RuntimeResult<Self::Program>;

    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &Self::Device,
        options: &str,
    ) -> RuntimeResult<()>;

    fn build_log(&self, program: &Self::Program, device: &Self::Device) -> RuntimeResult<String>;

    /// Size in bytes of each compiled binary, one per device.
    fn binary_sizes(&self, program: &Self::Program) -> RuntimeResult<Vec<usize>>;

    /// Fill one caller-partitioned region per binary.
    ///
    /// Returns the size in bytes of the descriptor array the runtime
    /// consumed, i.e. `regions.len() * size_of::<*mut u8>()` when it filled
    /// every region.
    fn read_binaries(
        &self,
        program: &Self::Program,
        regions: &mut [&mut [u8]],
    ) -> RuntimeResult<usize>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> RuntimeResult<Self::Kernel>;

    /// Device buffer of `len` `f32` elements.
    fn create_buffer(
        &self,
        context: &Self::Context,
        access: MemAccess,
        len: usize,
    ) -> RuntimeResult<Self::Buffer>;

    /// Blocking host-to-device copy.
    fn write_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &mut Self::Buffer,
        data: &[f32],
    ) -> RuntimeResult<()>;

    /// Blocking device-to-host copy.
    fn read_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        out: &mut [f32],
    ) -> RuntimeResult<()>;

    fn set_kernel_arg(
        &self,
        kernel: &Self::Kernel,
        index: u32,
        arg: KernelArg<'_, Self::Buffer>,
    ) -> RuntimeResult<()>;

    /// `CL_KERNEL_WORK_GROUP_SIZE` of `kernel` on `device`.
    fn kernel_work_group_size(
        &self,
        kernel: &Self::Kernel,
        device: &Self::Device,
    ) -> RuntimeResult<usize>;

    /// One-dimensional range dispatch.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: usize,
        local: usize,
    ) -> RuntimeResult<()>;

    /// Block until every command on `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> RuntimeResult<()>;
}
