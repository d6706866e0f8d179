//! Kernel dispatch: buffers in, one-dimensional range, results out.

use tracing::{debug, info};

use crate::error::{ComputeError, Result};
use crate::program::{BuiltProgram, SQUARE_KERNEL_NAME};
use crate::runtime::{ComputeRuntime, KernelArg, MemAccess};
use crate::scope::Scoped;
use crate::session::Session;

/// Global and local sizes of a one-dimensional dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    pub global: usize,
    pub local: usize,
}

impl WorkSize {
    /// Use `max_local` lanes per group and round the global range up to a
    /// whole number of groups. Kernels guard the tail with `i < count`.
    pub fn for_count(count: usize, max_local: usize) -> Self {
        let local = max_local.max(1);
        Self { global: count.div_ceil(local) * local, local }
    }
}

/// Device results of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub output: Vec<f32>,
    pub work: WorkSize,
}

// Release order: both buffers, then the kernel.
struct DispatchResources<R: ComputeRuntime> {
    input: Scoped<R::Buffer>,
    output: Scoped<R::Buffer>,
    kernel: Scoped<R::Kernel>,
}

/// Run the `square` entry point over `input`.
pub fn run_square<R: ComputeRuntime>(
    runtime: &R,
    session: &Session<R>,
    program: &BuiltProgram<R>,
    input: &[f32],
) -> Result<DispatchOutcome> {
    run_unary(runtime, session, program, SQUARE_KERNEL_NAME, input)
}

/// Run a `(input, output, count)` entry point over `input`.
///
/// Writes `input` into a read-only device buffer, dispatches `kernel_name`
/// with the kernel's maximum work-group size as the local size, waits for
/// the queue to drain and reads the write-only output buffer back.
pub fn run_unary<R: ComputeRuntime>(
    runtime: &R,
    session: &Session<R>,
    program: &BuiltProgram<R>,
    kernel_name: &str,
    input: &[f32],
) -> Result<DispatchOutcome> {
    if input.is_empty() {
        return Err(ComputeError::InvalidArgument("element count must be non-zero".into()));
    }
    let count = u32::try_from(input.len()).map_err(|_| {
        ComputeError::InvalidArgument(format!("element count {} exceeds u32", input.len()))
    })?;

    let kernel = program.create_kernel(runtime, kernel_name)?;
    let input_buffer = allocate(runtime, session, MemAccess::ReadOnly, input.len())?;
    let output_buffer = allocate(runtime, session, MemAccess::WriteOnly, input.len())?;
    let mut res: DispatchResources<R> =
        DispatchResources { input: input_buffer, output: output_buffer, kernel };

    runtime.write_buffer(session.queue(), &mut res.input, input).map_err(ComputeError::Write)?;

    let args = [KernelArg::Buffer(&*res.input), KernelArg::Buffer(&*res.output), KernelArg::Uint(count)];
    for (index, arg) in (0u32..).zip(args) {
        runtime
            .set_kernel_arg(&res.kernel, index, arg)
            .map_err(|status| ComputeError::KernelArg { index, status })?;
    }

    let max_local = runtime
        .kernel_work_group_size(&res.kernel, session.device())
        .map_err(ComputeError::WorkGroupQuery)?;
    let work = WorkSize::for_count(input.len(), max_local);
    debug!("Dispatching '{}': global={}, local={}", kernel_name, work.global, work.local);

    runtime
        .enqueue_kernel(session.queue(), &res.kernel, work.global, work.local)
        .map_err(ComputeError::Enqueue)?;
    runtime.finish(session.queue()).map_err(ComputeError::Finish)?;

    let mut output = vec![0.0f32; input.len()];
    runtime.read_buffer(session.queue(), &res.output, &mut output).map_err(ComputeError::Read)?;
    info!("Read back {} results", output.len());

    Ok(DispatchOutcome { output, work })
}

fn allocate<R: ComputeRuntime>(
    runtime: &R,
    session: &Session<R>,
    access: MemAccess,
    len: usize,
) -> Result<Scoped<R::Buffer>> {
    let buffer = runtime.create_buffer(session.context(), access, len).map_err(|status| {
        ComputeError::BufferAllocation { access, bytes: len * std::mem::size_of::<f32>(), status }
    })?;
    Ok(Scoped::new("buffer", buffer))
}
