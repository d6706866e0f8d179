//! Backend selection and the run driver behind `main`.

use std::io::Write;

use anyhow::{Context, Result};
use clhello_opencl::{run_with, ComputeRuntime, ReferenceRuntime, Validation};
use tracing::{info, warn};

use crate::config::{Backend, CliConfig};
use crate::exit::{EXIT_GENERIC_FAIL, EXIT_SUCCESS};
use crate::output::{write_progress, write_summary};

/// Run the pipeline described by `config`, writing the report to `out`.
///
/// Returns the process exit code. Fatal runtime errors come back as `Err`.
pub fn execute(config: &CliConfig, out: &mut impl Write) -> Result<i32> {
    info!("Using {} backend", config.backend);
    match config.backend {
        Backend::Reference => run_on(&ReferenceRuntime::new(), config, out),
        #[cfg(feature = "opencl")]
        Backend::OpenCl => run_on(&clhello_opencl::OpenClRuntime::new(), config, out),
        #[cfg(not(feature = "opencl"))]
        Backend::OpenCl => anyhow::bail!(
            "the opencl backend is not compiled in; rebuild with `--features opencl` or use `--backend reference`"
        ),
    }
}

fn run_on<R: ComputeRuntime>(runtime: &R, config: &CliConfig, out: &mut impl Write) -> Result<i32> {
    let pipeline = config.to_pipeline()?;

    let mut written: std::io::Result<()> = Ok(());
    let result = run_with(runtime, &pipeline, |progress| {
        if written.is_ok() {
            written = write_progress(&mut *out, &progress);
        }
    });
    written.context("Failed to write report")?;
    let report = result.context("Run failed")?;

    write_summary(&mut *out, &report.validation).context("Failed to write report")?;
    out.flush()?;

    Ok(exit_code(&report.validation, config.run.strict))
}

/// Map a completed validation to the process exit code.
///
/// Mismatches are only fatal under `strict`.
pub fn exit_code(validation: &Validation, strict: bool) -> i32 {
    if validation.is_exact() {
        return EXIT_SUCCESS;
    }
    warn!("{} of {} results differ from the host", validation.mismatches(), validation.total);
    if strict {
        EXIT_GENERIC_FAIL
    } else {
        EXIT_SUCCESS
    }
}
