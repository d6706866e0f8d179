//! The end-to-end run: session, build, dump, dispatch, validate.

use tracing::{info, warn};

use crate::dispatch::{run_square, WorkSize};
use crate::dump::{dump_binaries, DumpOptions, DumpReport};
use crate::error::{ComputeError, DumpError, Result};
use crate::host::{random_input, validate_squares, Validation, DEFAULT_COUNT, DEFAULT_SEED};
use crate::program::{build_program, DEFAULT_BUILD_OPTIONS, SQUARE_KERNEL_SOURCE};
use crate::runtime::{ComputeRuntime, DeviceClass};
use crate::session::{DeviceSummary, PlatformReport, Session};

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub device_class: DeviceClass,
    pub count: usize,
    pub seed: u64,
    pub build_options: String,
    /// `None` skips the binary dump.
    pub dump: Option<DumpOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::Gpu,
            count: DEFAULT_COUNT,
            seed: DEFAULT_SEED,
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            dump: Some(DumpOptions::default()),
        }
    }
}

/// Milestones reported while the run is in progress.
#[derive(Debug)]
pub enum Progress<'a> {
    Platform(&'a PlatformReport),
    Device(&'a DeviceSummary),
    Built,
    Dump(&'a std::result::Result<DumpReport, DumpError>),
    Dispatched(&'a WorkSize),
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub platform: PlatformReport,
    pub device: DeviceSummary,
    /// `None` when dumping was disabled.
    pub dump: Option<std::result::Result<DumpReport, DumpError>>,
    pub work: WorkSize,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    pub validation: Validation,
}

/// Run the whole pipeline on `runtime`.
pub fn run<R: ComputeRuntime>(runtime: &R, config: &PipelineConfig) -> Result<RunReport> {
    run_with(runtime, config, |_| {})
}

/// Run the whole pipeline, handing each milestone to `observer` as it
/// happens. Every handle acquired is released before this returns, whether
/// it returns `Ok` or `Err`.
pub fn run_with<R: ComputeRuntime>(
    runtime: &R,
    config: &PipelineConfig,
    mut observer: impl FnMut(Progress<'_>),
) -> Result<RunReport> {
    if config.count == 0 {
        return Err(ComputeError::InvalidArgument("element count must be non-zero".into()));
    }
    let input = random_input(config.count, config.seed);

    let session = Session::open_with(runtime, config.device_class, |report| {
        observer(Progress::Platform(report))
    })?;
    observer(Progress::Device(session.device_summary()));

    let program = build_program(runtime, &session, SQUARE_KERNEL_SOURCE, &config.build_options)?;
    observer(Progress::Built);

    let dump = config.dump.as_ref().map(|options| {
        let result = dump_binaries(runtime, &program, options);
        if let Err(e) = &result {
            warn!("Binary dump abandoned: {}", e);
        }
        observer(Progress::Dump(&result));
        result
    });

    let outcome = run_square(runtime, &session, &program, &input)?;
    observer(Progress::Dispatched(&outcome.work));

    let validation = validate_squares(&input, &outcome.output);
    info!("{}", validation);

    let platform = session.platform_report().clone();
    let device = session.device_summary().clone();

    // Program before session: children go before the context.
    drop(program);
    drop(session);

    Ok(RunReport {
        platform,
        device,
        dump,
        work: outcome.work,
        input,
        output: outcome.output,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.count, 1024);
        assert_eq!(config.device_class, DeviceClass::Gpu);
        assert_eq!(config.build_options, "-cl-std=CL1.2");
        assert_eq!(config.dump.as_ref().map(|d| d.prefix.as_str()), Some("square"));
    }
}
