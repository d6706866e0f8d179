//! Host reference runtime.
//!
//! A [`ComputeRuntime`] that runs entirely on the host: one platform, one
//! device, a source checker standing in for the device compiler, and CPU
//! implementations of the kernels it knows. It prioritizes matching the
//! observable contract of an OpenCL runtime (status codes, build logs,
//! binary queries, work-group rules) over speed, and is the ground truth the
//! pipeline is tested against when no GPU is present.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::error::Status;
use crate::runtime::{
    ComputeRuntime, DeviceClass, KernelArg, MemAccess, PlatformAttribute, RuntimeResult,
};

/// First four bytes of every binary the reference compiler emits.
pub const REFERENCE_BINARY_MAGIC: [u8; 4] = *b"CLHR";

/// Work-group limit reported when none is configured.
pub const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 256;

const SUPPORTED_STANDARDS: [&str; 5] = ["CL1.0", "CL1.1", "CL1.2", "CL2.0", "CL3.0"];

// ── Host kernels ─────────────────────────────────────────────────────────────

type SharedData = Rc<RefCell<Vec<f32>>>;

#[derive(Clone)]
enum BoundArg {
    Buffer(SharedData),
    Uint(u32),
}

/// A kernel the reference runtime can execute.
struct HostKernel {
    name: &'static str,
    arity: usize,
    run: fn(global: usize, args: &[BoundArg]) -> RuntimeResult<()>,
}

static HOST_KERNELS: [HostKernel; 1] = [HostKernel { name: "square", arity: 3, run: square_kernel }];

fn host_kernel(name: &str) -> Option<&'static HostKernel> {
    HOST_KERNELS.iter().find(|k| k.name == name)
}

/// `output[i] = input[i] * input[i]` for every `i < min(global, count)`.
fn square_kernel(global: usize, args: &[BoundArg]) -> RuntimeResult<()> {
    let (input, output, count) = match args {
        [BoundArg::Buffer(input), BoundArg::Buffer(output), BoundArg::Uint(count)] => {
            (input, output, *count as usize)
        }
        _ => return Err(Status::INVALID_KERNEL_ARGS),
    };
    let active = global.min(count);

    if Rc::ptr_eq(input, output) {
        let mut data = output.borrow_mut();
        let data = data.get_mut(..active).ok_or(Status::OUT_OF_RESOURCES)?;
        data.iter_mut().for_each(|x| *x *= *x);
    } else {
        let src = input.borrow();
        let mut dst = output.borrow_mut();
        let src = src.get(..active).ok_or(Status::OUT_OF_RESOURCES)?;
        let dst = dst.get_mut(..active).ok_or(Status::OUT_OF_RESOURCES)?;
        for (out, &x) in dst.iter_mut().zip(src) {
            *out = x * x;
        }
    }
    Ok(())
}

// ── Compiler ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Punct(char),
}

/// Split OpenCL C source into words and punctuation, with line numbers.
/// Comments and string literals are skipped.
fn tokenize(source: &str) -> Vec<(Token, usize)> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut escaped = false;
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if !escaped && c == quote {
                        break;
                    }
                    escaped = !escaped && c == '\\';
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '.' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Word(word), line));
            }
            c => tokens.push((Token::Punct(c), line)),
        }
    }
    tokens
}

fn check_delimiters(tokens: &[(Token, usize)]) -> Result<(), String> {
    let mut open: Vec<(char, usize)> = Vec::new();
    for (token, line) in tokens {
        let Token::Punct(c) = token else { continue };
        match c {
            '(' | '{' | '[' => open.push((*c, *line)),
            ')' | '}' | ']' => {
                let expected = match c {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                match open.pop() {
                    Some((o, _)) if o == expected => {}
                    _ => return Err(format!("<source>:{line}: error: unexpected '{c}'")),
                }
            }
            _ => {}
        }
    }
    match open.pop() {
        Some((o, line)) => Err(format!("<source>:{line}: error: '{o}' is never closed")),
        None => Ok(()),
    }
}

/// Entry points declared as `__kernel void name(...)`, with parameter counts.
fn find_kernels(tokens: &[(Token, usize)]) -> Result<Vec<(String, usize, usize)>, String> {
    let mut kernels = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_qualifier =
            matches!(&tokens[i].0, Token::Word(w) if w == "__kernel" || w == "kernel");
        if !is_qualifier {
            i += 1;
            continue;
        }
        let line = tokens[i].1;
        let name = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
            (
                Some((Token::Word(ret), _)),
                Some((Token::Word(name), _)),
                Some((Token::Punct('('), _)),
            ) if ret == "void" => name.clone(),
            _ => {
                return Err(format!(
                    "<source>:{line}: error: kernel must be declared as '__kernel void name(...)'"
                ))
            }
        };

        let mut depth = 0usize;
        let mut params = 0usize;
        let mut saw_param_token = false;
        let mut j = i + 3;
        while let Some((token, _)) = tokens.get(j) {
            match token {
                Token::Punct('(') => depth += 1,
                Token::Punct(')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Token::Punct(',') if depth == 1 => params += 1,
                Token::Word(w) if depth == 1 && w == "void" && !saw_param_token => {}
                _ => saw_param_token = true,
            }
            j += 1;
        }
        if saw_param_token {
            params += 1;
        }
        kernels.push((name, params, line));
        i = j + 1;
    }
    Ok(kernels)
}

fn check_options(options: &str) -> Result<(), String> {
    for flag in options.split_whitespace() {
        if let Some(standard) = flag.strip_prefix("-cl-std=") {
            if !SUPPORTED_STANDARDS.contains(&standard) {
                return Err(format!("error: invalid value '{standard}' in '{flag}'"));
            }
        } else if !(flag.starts_with("-D")
            || flag.starts_with("-I")
            || flag.starts_with("-cl-")
            || flag == "-w"
            || flag == "-Werror")
        {
            return Err(format!("error: unknown argument: '{flag}'"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct ProgramImage {
    kernels: Vec<String>,
    binary: Vec<u8>,
}

fn compile(source: &str, options: &str) -> Result<ProgramImage, (Status, String)> {
    check_options(options).map_err(|log| (Status::INVALID_BUILD_OPTIONS, log))?;

    let failure = |log: String| (Status::BUILD_PROGRAM_FAILURE, log);
    let tokens = tokenize(source);
    check_delimiters(&tokens).map_err(failure)?;

    let declared = find_kernels(&tokens).map_err(failure)?;
    if declared.is_empty() {
        return Err(failure("<source>: error: no kernel entry points found".into()));
    }
    for (name, params, line) in &declared {
        let host = host_kernel(name).ok_or_else(|| {
            failure(format!("<source>:{line}: error: kernel '{name}' has no host implementation"))
        })?;
        if host.arity != *params {
            return Err(failure(format!(
                "<source>:{line}: error: kernel '{name}' takes {} arguments, found {params}",
                host.arity
            )));
        }
    }

    let mut binary = Vec::with_capacity(8 + options.len() + source.len());
    binary.extend_from_slice(&REFERENCE_BINARY_MAGIC);
    binary.extend_from_slice(&(options.len() as u32).to_le_bytes());
    binary.extend_from_slice(options.as_bytes());
    binary.extend_from_slice(source.as_bytes());

    Ok(ProgramImage { kernels: declared.into_iter().map(|(name, _, _)| name).collect(), binary })
}

// ── Handles ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePlatform {
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDevice {
    class: DeviceClass,
}

#[derive(Debug)]
pub struct ReferenceContext {
    device: ReferenceDevice,
}

#[derive(Debug, Default)]
pub struct ReferenceQueue {
    completed: Cell<u64>,
}

impl ReferenceQueue {
    /// Commands this queue has executed.
    pub fn completed(&self) -> u64 {
        self.completed.get()
    }

    fn complete(&self) {
        self.completed.set(self.completed.get() + 1);
    }
}

#[derive(Debug)]
pub struct ReferenceProgram {
    source: String,
    image: Option<ProgramImage>,
    log: String,
}

impl ReferenceProgram {
    pub fn is_built(&self) -> bool {
        self.image.is_some()
    }
}

pub struct ReferenceKernel {
    host: &'static HostKernel,
    args: RefCell<Vec<Option<BoundArg>>>,
}

impl std::fmt::Debug for ReferenceKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceKernel").field("name", &self.host.name).finish()
    }
}

#[derive(Debug)]
pub struct ReferenceBuffer {
    data: SharedData,
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Host-side [`ComputeRuntime`].
#[derive(Debug, Clone)]
pub struct ReferenceRuntime {
    platform_count: usize,
    device_classes: Vec<DeviceClass>,
    max_work_group_size: usize,
    missing_attributes: Vec<PlatformAttribute>,
}

impl Default for ReferenceRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceRuntime {
    /// One platform whose single device answers both GPU and CPU requests.
    pub fn new() -> Self {
        Self {
            platform_count: 1,
            device_classes: vec![DeviceClass::Gpu, DeviceClass::Cpu],
            max_work_group_size: DEFAULT_MAX_WORK_GROUP_SIZE,
            missing_attributes: Vec::new(),
        }
    }

    pub fn with_platform_count(mut self, count: usize) -> Self {
        self.platform_count = count;
        self
    }

    /// Restrict the device classes the platform exposes.
    pub fn with_device_classes(mut self, classes: &[DeviceClass]) -> Self {
        self.device_classes = classes.to_vec();
        self
    }

    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    /// Make a platform attribute query fail.
    pub fn without_attribute(mut self, attribute: PlatformAttribute) -> Self {
        self.missing_attributes.push(attribute);
        self
    }
}

impl ComputeRuntime for ReferenceRuntime {
    type Platform = ReferencePlatform;
    type Device = ReferenceDevice;
    type Context = ReferenceContext;
    type Queue = ReferenceQueue;
    type Program = ReferenceProgram;
    type Kernel = ReferenceKernel;
    type Buffer = ReferenceBuffer;

    fn name(&self) -> &'static str {
        "reference"
    }

    fn platforms(&self) -> RuntimeResult<Vec<ReferencePlatform>> {
        Ok((0..self.platform_count).map(|index| ReferencePlatform { index }).collect())
    }

    fn platform_info(
        &self,
        platform: &ReferencePlatform,
        attribute: PlatformAttribute,
    ) -> RuntimeResult<String> {
        if platform.index >= self.platform_count {
            return Err(Status::INVALID_PLATFORM);
        }
        if self.missing_attributes.contains(&attribute) {
            return Err(Status::INVALID_VALUE);
        }
        let value = match attribute {
            PlatformAttribute::Profile => "FULL_PROFILE",
            PlatformAttribute::Version => "OpenCL 1.2 clhello-reference",
            PlatformAttribute::Name => "clhello Reference",
            PlatformAttribute::Vendor => "clhello",
            PlatformAttribute::Extensions => "",
        };
        Ok(value.to_string())
    }

    fn device(&self, platform: &ReferencePlatform, class: DeviceClass) -> RuntimeResult<ReferenceDevice> {
        if platform.index >= self.platform_count {
            return Err(Status::INVALID_PLATFORM);
        }
        if !self.device_classes.contains(&class) {
            return Err(Status::DEVICE_NOT_FOUND);
        }
        Ok(ReferenceDevice { class })
    }

    fn device_name(&self, device: &ReferenceDevice) -> RuntimeResult<String> {
        Ok(format!("clhello Reference {} Device", device.class))
    }

    fn device_pci_bus_id(&self, _device: &ReferenceDevice) -> RuntimeResult<u32> {
        // Not a PCI device; the vendor extension query is unsupported.
        Err(Status::INVALID_VALUE)
    }

    fn create_context(&self, device: &ReferenceDevice) -> RuntimeResult<ReferenceContext> {
        Ok(ReferenceContext { device: *device })
    }

    fn create_queue(
        &self,
        context: &ReferenceContext,
        device: &ReferenceDevice,
    ) -> RuntimeResult<ReferenceQueue> {
        if context.device != *device {
            return Err(Status::INVALID_DEVICE);
        }
        Ok(ReferenceQueue::default())
    }

    fn create_program(&self, _context: &ReferenceContext, source: &str) -> RuntimeResult<ReferenceProgram> {
        if source.is_empty() {
            return Err(Status::INVALID_VALUE);
        }
        Ok(ReferenceProgram { source: source.to_string(), image: None, log: String::new() })
    }

    fn build_program(
        &self,
        program: &mut ReferenceProgram,
        _device: &ReferenceDevice,
        options: &str,
    ) -> RuntimeResult<()> {
        match compile(&program.source, options) {
            Ok(image) => {
                debug!("Reference build: kernels {:?}", image.kernels);
                program.image = Some(image);
                program.log.clear();
                Ok(())
            }
            Err((status, log)) => {
                program.image = None;
                program.log = log;
                Err(status)
            }
        }
    }

    fn build_log(&self, program: &ReferenceProgram, _device: &ReferenceDevice) -> RuntimeResult<String> {
        Ok(program.log.clone())
    }

    fn binary_sizes(&self, program: &ReferenceProgram) -> RuntimeResult<Vec<usize>> {
        Ok(program.image.iter().map(|image| image.binary.len()).collect())
    }

    fn read_binaries(
        &self,
        program: &ReferenceProgram,
        regions: &mut [&mut [u8]],
    ) -> RuntimeResult<usize> {
        let image = program.image.as_ref().ok_or(Status::INVALID_PROGRAM_EXECUTABLE)?;
        let region = regions.first_mut().ok_or(Status::INVALID_VALUE)?;
        if region.len() != image.binary.len() {
            return Err(Status::INVALID_VALUE);
        }
        region.copy_from_slice(&image.binary);
        Ok(std::mem::size_of::<*mut u8>())
    }

    fn create_kernel(&self, program: &ReferenceProgram, name: &str) -> RuntimeResult<ReferenceKernel> {
        let image = program.image.as_ref().ok_or(Status::INVALID_PROGRAM_EXECUTABLE)?;
        if !image.kernels.iter().any(|k| k == name) {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        let host = host_kernel(name).ok_or(Status::INVALID_KERNEL_NAME)?;
        Ok(ReferenceKernel { host, args: RefCell::new(vec![None; host.arity]) })
    }

    fn create_buffer(
        &self,
        _context: &ReferenceContext,
        access: MemAccess,
        len: usize,
    ) -> RuntimeResult<ReferenceBuffer> {
        if len == 0 {
            return Err(Status::INVALID_BUFFER_SIZE);
        }
        debug!("Reference {} buffer of {} floats", access, len);
        Ok(ReferenceBuffer { data: Rc::new(RefCell::new(vec![0.0; len])) })
    }

    fn write_buffer(
        &self,
        queue: &ReferenceQueue,
        buffer: &mut ReferenceBuffer,
        data: &[f32],
    ) -> RuntimeResult<()> {
        let mut dst = buffer.data.borrow_mut();
        dst.get_mut(..data.len()).ok_or(Status::INVALID_VALUE)?.copy_from_slice(data);
        queue.complete();
        Ok(())
    }

    fn read_buffer(
        &self,
        queue: &ReferenceQueue,
        buffer: &ReferenceBuffer,
        out: &mut [f32],
    ) -> RuntimeResult<()> {
        let src = buffer.data.borrow();
        let len = out.len();
        out.copy_from_slice(src.get(..len).ok_or(Status::INVALID_VALUE)?);
        queue.complete();
        Ok(())
    }

    fn set_kernel_arg(
        &self,
        kernel: &ReferenceKernel,
        index: u32,
        arg: KernelArg<'_, ReferenceBuffer>,
    ) -> RuntimeResult<()> {
        let mut args = kernel.args.borrow_mut();
        let slot = args.get_mut(index as usize).ok_or(Status::INVALID_ARG_INDEX)?;
        *slot = Some(match arg {
            KernelArg::Buffer(buffer) => BoundArg::Buffer(Rc::clone(&buffer.data)),
            KernelArg::Uint(value) => BoundArg::Uint(value),
        });
        Ok(())
    }

    fn kernel_work_group_size(
        &self,
        _kernel: &ReferenceKernel,
        _device: &ReferenceDevice,
    ) -> RuntimeResult<usize> {
        Ok(self.max_work_group_size)
    }

    fn enqueue_kernel(
        &self,
        queue: &ReferenceQueue,
        kernel: &ReferenceKernel,
        global: usize,
        local: usize,
    ) -> RuntimeResult<()> {
        if global == 0 {
            return Err(Status::INVALID_GLOBAL_WORK_SIZE);
        }
        if local == 0 || local > self.max_work_group_size || global % local != 0 {
            return Err(Status::INVALID_WORK_GROUP_SIZE);
        }
        let args = kernel
            .args
            .borrow()
            .iter()
            .cloned()
            .collect::<Option<Vec<BoundArg>>>()
            .ok_or(Status::INVALID_KERNEL_ARGS)?;
        (kernel.host.run)(global, &args)?;
        queue.complete();
        Ok(())
    }

    fn finish(&self, queue: &ReferenceQueue) -> RuntimeResult<()> {
        // Commands complete at enqueue time; nothing is ever pending.
        debug!("Reference queue drained after {} commands", queue.completed());
        Ok(())
    }
}
