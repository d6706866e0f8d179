//! Program compilation and kernel instantiation.

use tracing::{debug, info, warn};

use crate::error::{ComputeError, Result};
use crate::runtime::ComputeRuntime;
use crate::scope::Scoped;
use crate::session::Session;

/// Entry point of [`SQUARE_KERNEL_SOURCE`].
pub const SQUARE_KERNEL_NAME: &str = "square";

/// Elementwise square of `count` floats.
pub const SQUARE_KERNEL_SOURCE: &str = r#"
__kernel void square(
   __global float* input,
   __global float* output,
   const unsigned int count)
{
   int i = get_global_id(0);
   if(i < count)
       output[i] = input[i] * input[i];
}
"#;

/// Language standard the kernel source is written against.
pub const DEFAULT_BUILD_OPTIONS: &str = "-cl-std=CL1.2";

/// A program that has been built for the session's device.
///
/// Only [`build_program`] produces one, so kernels can never be created from
/// source that did not compile.
pub struct BuiltProgram<R: ComputeRuntime> {
    program: Scoped<R::Program>,
}

impl<R: ComputeRuntime> BuiltProgram<R> {
    pub fn raw(&self) -> &R::Program {
        &self.program
    }

    /// Instantiate the named entry point.
    pub fn create_kernel(&self, runtime: &R, name: &str) -> Result<Scoped<R::Kernel>> {
        let kernel = runtime.create_kernel(&self.program, name).map_err(|status| {
            ComputeError::KernelCreation { name: name.to_string(), status }
        })?;
        debug!("Created kernel '{}'", name);
        Ok(Scoped::new("kernel", kernel))
    }
}

impl<R: ComputeRuntime> std::fmt::Debug for BuiltProgram<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltProgram").finish_non_exhaustive()
    }
}

/// Compile `source` for the session's device.
///
/// On build failure the device build log is fetched and returned inside
/// [`ComputeError::Build`].
pub fn build_program<R: ComputeRuntime>(
    runtime: &R,
    session: &Session<R>,
    source: &str,
    options: &str,
) -> Result<BuiltProgram<R>> {
    let mut program = Scoped::new(
        "program",
        runtime.create_program(session.context(), source).map_err(ComputeError::ProgramCreation)?,
    );

    if let Err(status) = runtime.build_program(&mut program, session.device(), options) {
        let log = match runtime.build_log(&program, session.device()) {
            Ok(log) => log,
            Err(log_status) => {
                warn!("Unable to retrieve build log: {}", log_status);
                String::new()
            }
        };
        debug!("Build log size: {}", log.len());
        return Err(ComputeError::Build { status, log });
    }

    info!("Built program with options '{}'", options);
    Ok(BuiltProgram { program })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_source_declares_entry_point() {
        assert!(SQUARE_KERNEL_SOURCE.contains("__kernel void square("));
        assert!(SQUARE_KERNEL_SOURCE.contains("if(i < count)"));
    }

    #[test]
    fn build_options_pin_language_standard() {
        assert_eq!(DEFAULT_BUILD_OPTIONS, "-cl-std=CL1.2");
    }
}
