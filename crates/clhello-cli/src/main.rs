//! clhello CLI application
//!
//! Squares a batch of random floats on an OpenCL device, dumps the compiled
//! kernel binaries and checks every result against the host.

use std::io;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use clhello_cli::app::execute;
use clhello_cli::config::{Backend, CliConfig, ConfigBuilder, DEFAULT_CONFIG_FILE};
use clhello_cli::exit::{EXIT_GENERIC_FAIL, EXIT_SUCCESS};
use console::style;
use tracing::{debug, error};

/// clhello - OpenCL square-kernel smoke test
#[derive(Parser)]
#[command(name = "clhello")]
#[command(about = "Square floats on an OpenCL device and dump the compiled kernel")]
#[command(long_about = r#"
clhello builds a one-line OpenCL kernel that squares its input, runs it over
1024 random floats on the first platform's first device, writes each compiled
device binary to <prefix><index>.gallium_bin and reports how many results
match the host.

Examples:
  # Default run on the reference backend
  clhello --backend reference

  # Real hardware, CPU device, no binary dump
  clhello --backend opencl --cpu --no-dump

  # Bigger batch, binaries into ./out with a custom prefix
  clhello --count 1000000 --dump-dir out --dump-prefix sq_
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ./clhello.toml when present)
    #[arg(short, long, value_name = "PATH", env = "CLHELLO_CONFIG")]
    config: Option<PathBuf>,

    /// Runtime to execute on
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Device class to request (gpu, cpu)
    #[arg(short, long, value_name = "CLASS")]
    device: Option<String>,

    /// Shorthand for --device cpu
    #[arg(long, conflicts_with = "device")]
    cpu: bool,

    /// Number of elements to square
    #[arg(short = 'n', long, value_name = "N")]
    count: Option<usize>,

    /// Seed for the random input
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Options passed to the kernel compiler
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    build_options: Option<String>,

    /// File name prefix for dumped binaries
    #[arg(long, value_name = "PREFIX")]
    dump_prefix: Option<String>,

    /// Directory for dumped binaries
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,

    /// Skip the binary dump
    #[arg(long)]
    no_dump: bool,

    /// Exit with a non-zero code when any result is wrong
    #[arg(long)]
    strict: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            std::process::exit(EXIT_GENERIC_FAIL);
        }
    };

    if cli.print_config {
        match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                std::process::exit(EXIT_SUCCESS);
            }
            Err(e) => {
                eprintln!("{} {:#}", style("error:").red().bold(), e);
                std::process::exit(EXIT_GENERIC_FAIL);
            }
        }
    }

    if let Err(e) = setup_logging(&config) {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        std::process::exit(EXIT_GENERIC_FAIL);
    }
    debug!("Effective configuration: {:?}", config);

    let code = match execute(&config, &mut io::stdout().lock()) {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {:#}", e);
            // Printed unconditionally so `--log-level off` still shows the cause.
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            EXIT_GENERIC_FAIL
        }
    };
    std::process::exit(code);
}

/// Load configuration from file and CLI arguments
fn load_configuration(cli: &Cli) -> Result<CliConfig> {
    let builder = match &cli.config {
        Some(path) => ConfigBuilder::from_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.is_file() {
                ConfigBuilder::from_file(&default_path)?
            } else {
                ConfigBuilder::new()
            }
        }
    };

    let device = if cli.cpu { Some("cpu".to_string()) } else { cli.device.clone() };

    builder
        .backend(cli.backend)
        .device(device)
        .count(cli.count)
        .seed(cli.seed)
        .build_options(cli.build_options.clone())
        .dump_prefix(cli.dump_prefix.clone())
        .dump_dir(cli.dump_dir.clone())
        .no_dump(cli.no_dump)
        .strict(cli.strict)
        .log_level(cli.log_level.clone())
        .log_format(cli.log_format.clone())
        .build()
        .context("Failed to build configuration")
}

/// Setup logging based on configuration; `RUST_LOG` wins over the config.
fn setup_logging(config: &CliConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    let installed = match config.logging.format.as_str() {
        "json" => subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).try_init(),
        "compact" => subscriber.compact().try_init(),
        _ => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
