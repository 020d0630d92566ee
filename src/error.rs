//! Error kinds for the emulation core.
//!
//! Configuration and resource errors abort machine construction atomically;
//! bus faults never propagate as `Result`s (see [`crate::bus::Bus`]) because
//! real hardware does not raise exceptions on a floating-bus read.

use crate::memory::Width;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("region '{name}' is not page-aligned (page size {page_size}): start=0x{start:x} size=0x{size:x}")]
    Misaligned { name: String, start: u32, size: u32, page_size: u32 },
    #[error("duplicate name '{0}' in profile")]
    DuplicateName(String),
    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),
    #[error("layer-0 mapping for '{new}' overlaps existing mapping '{existing}'")]
    OverlappingMapping { new: String, existing: String },
    #[error("slot {0} is out of range (expected 1-7)")]
    InvalidSlot(usize),
    #[error("address space of {0} bits is not supported")]
    InvalidAddressSpace(u32),
    #[error("swap group '{0}' was referenced but never created")]
    UnknownSwapGroup(String),
    #[error("library root is not configured, cannot resolve 'library://{0}'")]
    LibraryRootNotConfigured(String),
    #[error("region references unknown ROM image '{0}'")]
    UnknownRomImage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("ROM file '{0}' does not exist")]
    NotFound(PathBuf),
    #[error("embedded resource '{0}' not found")]
    EmbeddedResourceNotFound(String),
    #[error("failed to read '{path}': {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("ROM '{name}' failed hash verification (expected {expected}, got {actual})")]
    HashMismatch { name: String, expected: String, actual: String },
    #[error("required ROM '{0}' is missing")]
    RequiredRomMissing(String),
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    #[error("read/write to unmapped address 0x{address:06x}")]
    Unmapped { address: u32 },
    #[error("write to read-only address 0x{address:06x}")]
    WriteProtected { address: u32 },
    #[error("access width {width:?} unsupported at address 0x{address:06x}")]
    UnsupportedWidth { address: u32, width: Width },
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device '{device}' references unknown swap group '{group}'")]
    MissingSwapGroup { device: String, group: String },
}

/// Raised while parsing a profile document, before any of its contents are
/// acted on. Carries the file path (when the profile came from disk) so the
/// caller can report a location alongside `serde_json`'s own line/column.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile '{path}': {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed profile '{path}': {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("malformed profile: {0}")]
    ParseInMemory(#[source] serde_json::Error),
    #[error("invalid hex value '{0}' for '{1}'")]
    InvalidHex(String, String),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// A bus fault paired with the page it occurred on, kept on [`crate::bus::Bus`]'s
/// ring buffer for the debug `fault` command.
#[derive(Debug, Clone, Copy)]
pub struct FaultRecord {
    pub fault: BusFault,
    pub cycle: u64,
}
