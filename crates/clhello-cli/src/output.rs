//! Human-readable run output.
//!
//! The report goes to stdout; diagnostics go through `tracing` to stderr.

use std::io::{self, Write};

use clhello_opencl::{DeviceSummary, Progress, Validation};
use console::style;

/// Print one pipeline milestone as it happens.
pub fn write_progress(out: &mut impl Write, progress: &Progress<'_>) -> io::Result<()> {
    match progress {
        Progress::Platform(report) => write!(out, "{report}"),
        Progress::Device(device) => write_device(out, device),
        Progress::Dump(Ok(dump)) => {
            writeln!(out, "Got back {} binaries, total size {}", dump.binaries.len(), dump.total_size)?;
            for binary in &dump.binaries {
                writeln!(
                    out,
                    "Binary {}: size {} dumped to {}",
                    binary.index,
                    binary.size,
                    binary.path.display()
                )?;
            }
            Ok(())
        }
        Progress::Dump(Err(e)) => writeln!(out, "{} {e}", style("Binary dump skipped:").yellow()),
        Progress::Built | Progress::Dispatched(_) => Ok(()),
    }
}

fn write_device(out: &mut impl Write, device: &DeviceSummary) -> io::Result<()> {
    write!(out, "Device: {}", device.class)?;
    if let Some(name) = &device.name {
        write!(out, " ({name})")?;
    }
    if let Some(bus) = device.pci_bus_id {
        write!(out, ", PCI bus {bus:#04x}")?;
    }
    writeln!(out, " [{} backend]", device.backend)
}

/// Print the final validation line.
pub fn write_summary(out: &mut impl Write, validation: &Validation) -> io::Result<()> {
    let line = validation.to_string();
    if validation.is_exact() {
        writeln!(out, "{}", style(line).green())
    } else {
        writeln!(out, "{}", style(line).red().bold())
    }
}
