//! Session setup: platform discovery, device selection, context and queue.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{ComputeError, Result};
use crate::runtime::{ComputeRuntime, DeviceClass, PLATFORM_ATTRIBUTES};
use crate::scope::Scoped;

/// One platform attribute as reported at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEntry {
    pub label: &'static str,
    /// `None` when the runtime could not answer the query.
    pub value: Option<String>,
}

/// Diagnostic description of the selected platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformReport {
    /// Zero-based position in the platform list.
    pub index: usize,
    pub entries: Vec<PlatformEntry>,
}

impl PlatformReport {
    /// Value of the attribute with the given label, if it was available.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.iter().find(|e| e.label == label).and_then(|e| e.value.as_deref())
    }
}

impl fmt::Display for PlatformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}. Platform", self.index + 1)?;
        for entry in &self.entries {
            match &entry.value {
                Some(value) => writeln!(f, "  {}: {}", entry.label, value)?,
                None => writeln!(f, "Unable to get platform {}", entry.label)?,
            }
        }
        Ok(())
    }
}

/// What we learned about the selected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    /// Runtime that answered, e.g. `reference` or `opencl`.
    pub backend: &'static str,
    pub class: DeviceClass,
    pub name: Option<String>,
    pub pci_bus_id: Option<u32>,
}

/// An open context and in-order queue bound to one device.
pub struct Session<R: ComputeRuntime> {
    // Release order: queue before the context that owns it.
    queue: Scoped<R::Queue>,
    context: Scoped<R::Context>,
    device: R::Device,
    platform_report: PlatformReport,
    device_summary: DeviceSummary,
}

impl<R: ComputeRuntime> Session<R> {
    /// Open a session on the first platform's first device of `class`.
    ///
    /// Fails with [`ComputeError::NoPlatforms`] before any device or context
    /// call when the runtime reports no platforms.
    pub fn open(runtime: &R, class: DeviceClass) -> Result<Self> {
        Self::open_with(runtime, class, |_| {})
    }

    /// Like [`Session::open`], handing the platform report to `on_platform`
    /// as soon as it is known (before device selection can fail).
    pub fn open_with(
        runtime: &R,
        class: DeviceClass,
        on_platform: impl FnOnce(&PlatformReport),
    ) -> Result<Self> {
        let platforms = runtime.platforms().map_err(ComputeError::PlatformQuery)?;
        let platform = platforms.into_iter().next().ok_or(ComputeError::NoPlatforms)?;

        let platform_report = describe_platform(runtime, &platform, 0);
        on_platform(&platform_report);

        let device = runtime
            .device(&platform, class)
            .map_err(|status| ComputeError::DeviceQuery { class, status })?;
        let device_summary = summarize_device(runtime, &device, class);
        info!(
            "Selected {} device: {}",
            class,
            device_summary.name.as_deref().unwrap_or("<unnamed>")
        );

        let context = Scoped::new(
            "context",
            runtime.create_context(&device).map_err(ComputeError::ContextCreation)?,
        );
        let queue = Scoped::new(
            "command queue",
            runtime.create_queue(&context, &device).map_err(ComputeError::QueueCreation)?,
        );
        debug!("Session open on {} backend", runtime.name());

        Ok(Self { queue, context, device, platform_report, device_summary })
    }

    pub fn context(&self) -> &R::Context {
        &self.context
    }

    pub fn queue(&self) -> &R::Queue {
        &self.queue
    }

    pub fn device(&self) -> &R::Device {
        &self.device
    }

    pub fn platform_report(&self) -> &PlatformReport {
        &self.platform_report
    }

    pub fn device_summary(&self) -> &DeviceSummary {
        &self.device_summary
    }
}

impl<R: ComputeRuntime> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("platform", &self.platform_report.get("Name"))
            .field("device", &self.device_summary)
            .finish()
    }
}

/// Query every attribute in [`PLATFORM_ATTRIBUTES`]; failures are skipped.
pub fn describe_platform<R: ComputeRuntime>(
    runtime: &R,
    platform: &R::Platform,
    index: usize,
) -> PlatformReport {
    let entries = PLATFORM_ATTRIBUTES
        .iter()
        .map(|&(attribute, label)| {
            let value = match runtime.platform_info(platform, attribute) {
                Ok(value) => Some(value),
                Err(status) => {
                    warn!("Unable to get platform {}: {}", label, status);
                    None
                }
            };
            PlatformEntry { label, value }
        })
        .collect();
    PlatformReport { index, entries }
}

fn summarize_device<R: ComputeRuntime>(
    runtime: &R,
    device: &R::Device,
    class: DeviceClass,
) -> DeviceSummary {
    let name = runtime.device_name(device).ok();
    let pci_bus_id = match runtime.device_pci_bus_id(device) {
        Ok(id) => Some(id),
        Err(status) => {
            debug!("PCI bus id unavailable: {}", status);
            None
        }
    };
    DeviceSummary { backend: runtime.name(), class, name, pci_bus_id }
}
