//! Elementwise-square dispatch over a vendor-neutral compute runtime.
//!
//! This crate provides:
//! - [`runtime`]: the [`ComputeRuntime`] boundary every device call goes through
//! - [`session`]: platform discovery, device selection, context and queue
//! - [`program`]: kernel source, program build with build-log retrieval
//! - [`dump`]: extraction of compiled device binaries to disk
//! - [`dispatch`]: buffers, argument binding, 1-D dispatch and read-back
//! - [`pipeline`]: the end-to-end run and its report
//! - [`reference`]: a host reference runtime for machines without OpenCL
//! - `opencl` (feature `opencl`): the real runtime via `opencl3`
//!
//! Every runtime handle is held in a [`scope::Scoped`] guard and released
//! exactly once, children before the context, on every exit path.

pub mod dispatch;
pub mod dump;
pub mod error;
pub mod host;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod pipeline;
pub mod program;
pub mod reference;
pub mod runtime;
pub mod scope;
pub mod session;

// Re-export primary public types.
pub use dispatch::{run_square, run_unary, DispatchOutcome, WorkSize};
pub use dump::{dump_binaries, DumpOptions, DumpReport, DumpedBinary, BINARY_EXTENSION};
pub use error::{ComputeError, DumpError, Result, Status};
pub use host::{random_input, validate_squares, Validation};
#[cfg(feature = "opencl")]
pub use opencl::OpenClRuntime;
pub use pipeline::{run, run_with, PipelineConfig, Progress, RunReport};
pub use program::{
    build_program, BuiltProgram, DEFAULT_BUILD_OPTIONS, SQUARE_KERNEL_NAME, SQUARE_KERNEL_SOURCE,
};
pub use reference::ReferenceRuntime;
pub use runtime::{
    ComputeRuntime, DeviceClass, KernelArg, MemAccess, PlatformAttribute, RuntimeResult,
    PLATFORM_ATTRIBUTES,
};
pub use session::{DeviceSummary, PlatformEntry, PlatformReport, Session};
