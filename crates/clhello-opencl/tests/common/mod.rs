//! Recording runtime shared by the integration tests.
//!
//! Wraps [`ReferenceRuntime`], logs every call, every handle acquisition
//! and every release into a ledger, and can inject a failure at one step.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use clhello_opencl::error::Status;
use clhello_opencl::reference::{
    ReferenceBuffer, ReferenceContext, ReferenceDevice, ReferenceKernel, ReferencePlatform,
    ReferenceProgram, ReferenceQueue,
};
use clhello_opencl::{
    ComputeRuntime, DeviceClass, KernelArg, MemAccess, PlatformAttribute, ReferenceRuntime,
    RuntimeResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Call(&'static str),
    Acquired(&'static str),
    Released(&'static str),
}

pub type Ledger = Rc<RefCell<Vec<Event>>>;

/// Step at which the runtime reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Platforms,
    Device,
    Context,
    Queue,
    Program,
    Build,
    Kernel,
    InputBuffer,
    OutputBuffer,
    Write,
    KernelArg(u32),
    WorkGroup,
    Enqueue,
    Finish,
    Read,
    /// Read succeeds but the first element comes back wrong.
    CorruptOutput,
    BinarySizes,
    BinaryFetch,
    /// Report one descriptor more than was filled.
    BinaryDescriptor,
}

pub const INJECTED: Status = Status::OUT_OF_RESOURCES;

/// A handle that records its release.
pub struct Tracked<T> {
    pub inner: T,
    kind: &'static str,
    ledger: Ledger,
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.ledger.borrow_mut().push(Event::Released(self.kind));
    }
}

pub struct RecordingRuntime {
    inner: ReferenceRuntime,
    ledger: Ledger,
    fault: Option<Fault>,
}

impl RecordingRuntime {
    pub fn new(inner: ReferenceRuntime) -> Self {
        Self { inner, ledger: Rc::default(), fault: None }
    }

    pub fn failing_at(inner: ReferenceRuntime, fault: Fault) -> Self {
        Self { fault: Some(fault), ..Self::new(inner) }
    }

    pub fn events(&self) -> Vec<Event> {
        self.ledger.borrow().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.filter(|e| match e {
            Event::Call(name) => Some(*name),
            _ => None,
        })
    }

    pub fn acquired(&self) -> Vec<&'static str> {
        self.filter(|e| match e {
            Event::Acquired(kind) => Some(*kind),
            _ => None,
        })
    }

    pub fn released(&self) -> Vec<&'static str> {
        self.filter(|e| match e {
            Event::Released(kind) => Some(*kind),
            _ => None,
        })
    }

    fn filter(&self, f: impl Fn(&Event) -> Option<&'static str>) -> Vec<&'static str> {
        self.ledger.borrow().iter().filter_map(f).collect()
    }

    fn call(&self, name: &'static str, fault: Fault) -> RuntimeResult<()> {
        self.ledger.borrow_mut().push(Event::Call(name));
        if self.fault == Some(fault) {
            Err(INJECTED)
        } else {
            Ok(())
        }
    }

    fn track<T>(&self, kind: &'static str, inner: T) -> Tracked<T> {
        self.ledger.borrow_mut().push(Event::Acquired(kind));
        Tracked { inner, kind, ledger: Rc::clone(&self.ledger) }
    }
}

impl ComputeRuntime for RecordingRuntime {
    type Platform = ReferencePlatform;
    type Device = ReferenceDevice;
    type Context = Tracked<ReferenceContext>;
    type Queue = Tracked<ReferenceQueue>;
    type Program = Tracked<ReferenceProgram>;
    type Kernel = Tracked<ReferenceKernel>;
    type Buffer = Tracked<ReferenceBuffer>;

    fn name(&self) -> &'static str {
        "recording"
    }

    fn platforms(&self) -> RuntimeResult<Vec<ReferencePlatform>> {
        self.call("platforms", Fault::Platforms)?;
        self.inner.platforms()
    }

    fn platform_info(
        &self,
        platform: &ReferencePlatform,
        attribute: PlatformAttribute,
    ) -> RuntimeResult<String> {
        self.ledger.borrow_mut().push(Event::Call("platform_info"));
        self.inner.platform_info(platform, attribute)
    }

    fn device(&self, platform: &ReferencePlatform, class: DeviceClass) -> RuntimeResult<ReferenceDevice> {
        self.call("device", Fault::Device)?;
        self.inner.device(platform, class)
    }

    fn device_name(&self, device: &ReferenceDevice) -> RuntimeResult<String> {
        self.inner.device_name(device)
    }

    fn device_pci_bus_id(&self, device: &ReferenceDevice) -> RuntimeResult<u32> {
        self.inner.device_pci_bus_id(device)
    }

    fn create_context(&self, device: &ReferenceDevice) -> RuntimeResult<Self::Context> {
        self.call("create_context", Fault::Context)?;
        Ok(self.track("context", self.inner.create_context(device)?))
    }

    fn create_queue(&self, context: &Self::Context, device: &ReferenceDevice) -> RuntimeResult<Self::Queue> {
        self.call("create_queue", Fault::Queue)?;
        Ok(self.track("queue", self.inner.create_queue(&context.inner, device)?))
    }

    fn create_program(&self, context: &Self::Context, source: &str) -> RuntimeResult<Self::Program> {
        self.call("create_program", Fault::Program)?;
        Ok(self.track("program", self.inner.create_program(&context.inner, source)?))
    }

    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &ReferenceDevice,
        options: &str,
    ) -> RuntimeResult<()> {
        if self.call("build_program", Fault::Build).is_err() {
            return Err(Status::BUILD_PROGRAM_FAILURE);
        }
        self.inner.build_program(&mut program.inner, device, options)
    }

    fn build_log(&self, program: &Self::Program, device: &ReferenceDevice) -> RuntimeResult<String> {
        self.ledger.borrow_mut().push(Event::Call("build_log"));
        if self.fault == Some(Fault::Build) {
            return Ok("<source>:1: error: injected build failure".to_string());
        }
        self.inner.build_log(&program.inner, device)
    }

    fn binary_sizes(&self, program: &Self::Program) -> RuntimeResult<Vec<usize>> {
        self.call("binary_sizes", Fault::BinarySizes)?;
        self.inner.binary_sizes(&program.inner)
    }

    fn read_binaries(&self, program: &Self::Program, regions: &mut [&mut [u8]]) -> RuntimeResult<usize> {
        self.call("read_binaries", Fault::BinaryFetch)?;
        let filled = self.inner.read_binaries(&program.inner, regions)?;
        if self.fault == Some(Fault::BinaryDescriptor) {
            return Ok(filled + std::mem::size_of::<*mut u8>());
        }
        Ok(filled)
    }

    fn create_kernel(&self, program: &Self::Program, name: &str) -> RuntimeResult<Self::Kernel> {
        self.call("create_kernel", Fault::Kernel)?;
        Ok(self.track("kernel", self.inner.create_kernel(&program.inner, name)?))
    }

    fn create_buffer(
        &self,
        context: &Self::Context,
        access: MemAccess,
        len: usize,
    ) -> RuntimeResult<Self::Buffer> {
        let (fault, kind) = match access {
            MemAccess::ReadOnly => (Fault::InputBuffer, "read-only buffer"),
            MemAccess::WriteOnly => (Fault::OutputBuffer, "write-only buffer"),
        };
        self.call("create_buffer", fault)?;
        Ok(self.track(kind, self.inner.create_buffer(&context.inner, access, len)?))
    }

    fn write_buffer(&self, queue: &Self::Queue, buffer: &mut Self::Buffer, data: &[f32]) -> RuntimeResult<()> {
        self.call("write_buffer", Fault::Write)?;
        self.inner.write_buffer(&queue.inner, &mut buffer.inner, data)
    }

    fn read_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, out: &mut [f32]) -> RuntimeResult<()> {
        self.call("read_buffer", Fault::Read)?;
        self.inner.read_buffer(&queue.inner, &buffer.inner, out)?;
        if self.fault == Some(Fault::CorruptOutput) {
            if let Some(first) = out.first_mut() {
                *first += 1.0;
            }
        }
        Ok(())
    }

    fn set_kernel_arg(
        &self,
        kernel: &Self::Kernel,
        index: u32,
        arg: KernelArg<'_, Self::Buffer>,
    ) -> RuntimeResult<()> {
        self.call("set_kernel_arg", Fault::KernelArg(index))?;
        let arg = match arg {
            KernelArg::Buffer(buffer) => KernelArg::Buffer(&buffer.inner),
            KernelArg::Uint(value) => KernelArg::Uint(value),
        };
        self.inner.set_kernel_arg(&kernel.inner, index, arg)
    }

    fn kernel_work_group_size(&self, kernel: &Self::Kernel, device: &ReferenceDevice) -> RuntimeResult<usize> {
        self.call("kernel_work_group_size", Fault::WorkGroup)?;
        self.inner.kernel_work_group_size(&kernel.inner, device)
    }

    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: usize,
        local: usize,
    ) -> RuntimeResult<()> {
        self.call("enqueue_kernel", Fault::Enqueue)?;
        self.inner.enqueue_kernel(&queue.inner, &kernel.inner, global, local)
    }

    fn finish(&self, queue: &Self::Queue) -> RuntimeResult<()> {
        self.call("finish", Fault::Finish)?;
        self.inner.finish(&queue.inner)
    }
}

/// Sorted copy, for comparing acquisitions against releases as multisets.
pub fn sorted(mut kinds: Vec<&'static str>) -> Vec<&'static str> {
    kinds.sort_unstable();
    kinds
}
