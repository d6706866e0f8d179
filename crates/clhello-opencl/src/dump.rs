//! Extraction of compiled device binaries to disk.
//!
//! The runtime reports one binary per device the program was built for.
//! All of them are fetched into a single contiguous scratch buffer that is
//! partitioned into per-device regions, then each region is written to
//! `<prefix><index>.gallium_bin`. Every failure here is a [`DumpError`]:
//! the caller reports it and carries on.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::DumpError;
use crate::program::BuiltProgram;
use crate::runtime::ComputeRuntime;

/// File extension of dumped binaries.
pub const BINARY_EXTENSION: &str = "gallium_bin";

/// Default file name prefix, matching the kernel name.
pub const DEFAULT_DUMP_PREFIX: &str = "square";

/// Where and under which name binaries are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), prefix: DEFAULT_DUMP_PREFIX.to_string() }
    }
}

impl DumpOptions {
    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(binary_file_name(&self.prefix, index))
    }
}

/// `<prefix><index>.gallium_bin`
pub fn binary_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{index}.{BINARY_EXTENSION}")
}

/// One binary written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpedBinary {
    pub index: usize,
    pub path: PathBuf,
    pub size: usize,
}

/// Outcome of a successful dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpReport {
    pub binaries: Vec<DumpedBinary>,
    /// Sum of the sizes reported by the runtime's size query.
    pub total_size: usize,
}

/// Fetch every compiled binary of `program` and write one file per device.
pub fn dump_binaries<R: ComputeRuntime>(
    runtime: &R,
    program: &BuiltProgram<R>,
    options: &DumpOptions,
) -> Result<DumpReport, DumpError> {
    let sizes = runtime.binary_sizes(program.raw()).map_err(DumpError::SizeQuery)?;
    let total_size: usize = sizes.iter().sum();
    info!("Got back {} binaries, total size {}", sizes.len(), total_size);

    let mut data = vec![0u8; total_size];
    let mut regions = partition(&mut data, &sizes);

    let returned = runtime.read_binaries(program.raw(), &mut regions).map_err(DumpError::BinaryFetch)?;
    let expected = regions.len() * std::mem::size_of::<*mut u8>();
    if returned != expected {
        return Err(DumpError::DescriptorMismatch { expected, actual: returned });
    }

    let mut binaries = Vec::with_capacity(regions.len());
    for (index, region) in regions.iter().enumerate() {
        let path = options.path_for(index);
        write_binary(&path, region)?;
        info!("Binary {}: size {} dumped to {}", index, region.len(), path.display());
        binaries.push(DumpedBinary { index, path, size: region.len() });
    }

    Ok(DumpReport { binaries, total_size })
}

/// Split `data` into consecutive regions of the given sizes.
fn partition<'a>(data: &'a mut [u8], sizes: &[usize]) -> Vec<&'a mut [u8]> {
    let mut regions = Vec::with_capacity(sizes.len());
    let mut rest = data;
    for &size in sizes {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(size);
        regions.push(head);
        rest = tail;
    }
    regions
}

fn write_binary(path: &Path, bytes: &[u8]) -> Result<(), DumpError> {
    debug!("Writing {} bytes to {}", bytes.len(), path.display());
    std::fs::write(path, bytes).map_err(|source| DumpError::Io { path: path.to_path_buf(), source })
}
