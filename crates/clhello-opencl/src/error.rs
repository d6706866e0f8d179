//! Error types for session setup, program build, dispatch, and binary dumps.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::runtime::{DeviceClass, MemAccess};

/// Raw status code returned by the compute runtime (an OpenCL `cl_int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Self = Self(0);
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    pub const BUILD_PROGRAM_FAILURE: Self = Self(-11);
    pub const INVALID_VALUE: Self = Self(-30);
    pub const INVALID_DEVICE_TYPE: Self = Self(-31);
    pub const INVALID_PLATFORM: Self = Self(-32);
    pub const INVALID_DEVICE: Self = Self(-33);
    pub const INVALID_MEM_OBJECT: Self = Self(-38);
    pub const INVALID_BUILD_OPTIONS: Self = Self(-43);
    pub const INVALID_PROGRAM_EXECUTABLE: Self = Self(-45);
    pub const INVALID_KERNEL_NAME: Self = Self(-46);
    pub const INVALID_ARG_INDEX: Self = Self(-49);
    pub const INVALID_ARG_VALUE: Self = Self(-50);
    pub const INVALID_KERNEL_ARGS: Self = Self(-52);
    pub const INVALID_WORK_GROUP_SIZE: Self = Self(-54);
    pub const INVALID_GLOBAL_WORK_SIZE: Self = Self(-63);
    pub const INVALID_BUFFER_SIZE: Self = Self(-61);
    pub const PLATFORM_NOT_FOUND_KHR: Self = Self(-1001);

    /// The symbolic OpenCL name of this status, if it is one we know.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "CL_SUCCESS",
            -1 => "CL_DEVICE_NOT_FOUND",
            -2 => "CL_DEVICE_NOT_AVAILABLE",
            -3 => "CL_COMPILER_NOT_AVAILABLE",
            -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            -5 => "CL_OUT_OF_RESOURCES",
            -6 => "CL_OUT_OF_HOST_MEMORY",
            -11 => "CL_BUILD_PROGRAM_FAILURE",
            -30 => "CL_INVALID_VALUE",
            -31 => "CL_INVALID_DEVICE_TYPE",
            -32 => "CL_INVALID_PLATFORM",
            -33 => "CL_INVALID_DEVICE",
            -34 => "CL_INVALID_CONTEXT",
            -36 => "CL_INVALID_COMMAND_QUEUE",
            -38 => "CL_INVALID_MEM_OBJECT",
            -43 => "CL_INVALID_BUILD_OPTIONS",
            -44 => "CL_INVALID_PROGRAM",
            -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
            -46 => "CL_INVALID_KERNEL_NAME",
            -48 => "CL_INVALID_KERNEL",
            -49 => "CL_INVALID_ARG_INDEX",
            -50 => "CL_INVALID_ARG_VALUE",
            -51 => "CL_INVALID_ARG_SIZE",
            -52 => "CL_INVALID_KERNEL_ARGS",
            -53 => "CL_INVALID_WORK_DIMENSION",
            -54 => "CL_INVALID_WORK_GROUP_SIZE",
            -55 => "CL_INVALID_WORK_ITEM_SIZE",
            -61 => "CL_INVALID_BUFFER_SIZE",
            -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
            -1001 => "CL_PLATFORM_NOT_FOUND_KHR",
            _ => return None,
        };
        Some(name)
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Fatal errors: any of these ends the run.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("unable to get platform IDs: {0}")]
    PlatformQuery(Status),

    #[error("no compute platforms found")]
    NoPlatforms,

    #[error("failed to get a {class} device: {status}")]
    DeviceQuery { class: DeviceClass, status: Status },

    #[error("failed to create a compute context: {0}")]
    ContextCreation(Status),

    #[error("failed to create a command queue: {0}")]
    QueueCreation(Status),

    #[error("failed to create compute program: {0}")]
    ProgramCreation(Status),

    #[error("failed to build program executable: {status}\n{log}")]
    Build { status: Status, log: String },

    #[error("failed to create compute kernel '{name}': {status}")]
    KernelCreation { name: String, status: Status },

    #[error("failed to allocate {access} device buffer of {bytes} bytes: {status}")]
    BufferAllocation { access: MemAccess, bytes: usize, status: Status },

    #[error("failed to write to source array: {0}")]
    Write(Status),

    #[error("failed to set kernel argument {index}: {status}")]
    KernelArg { index: u32, status: Status },

    #[error("failed to retrieve kernel work group info: {0}")]
    WorkGroupQuery(Status),

    #[error("failed to execute kernel: {0}")]
    Enqueue(Status),

    #[error("failed waiting for the command queue to drain: {0}")]
    Finish(Status),

    #[error("failed to read output array: {0}")]
    Read(Status),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Recoverable errors from the binary dump; the run continues past these.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("error requesting program binary sizes: {0}")]
    SizeQuery(Status),

    #[error("program binaries query failed: {0}")]
    BinaryFetch(Status),

    #[error("program binaries size mismatch: expected {expected} descriptor bytes, runtime reported {actual}")]
    DescriptorMismatch { expected: usize, actual: usize },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience result alias for fatal pipeline errors.
pub type Result<T> = std::result::Result<T, ComputeError>;
