//! The declarative machine profile: JSON schema, path resolution across the
//! `library://` / `app://` / `embedded://` / relative / absolute source
//! schemes, and ROM hash verification. [`crate::builder`] consumes a parsed
//! [`Profile`] to assemble a [`crate::machine::Machine`]; nothing in this
//! module touches the bus.

use crate::error::{ConfigurationError, ProfileError, ResourceError};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A hex-string value (`"0x4000"` or `"4000"`) as it appears for
/// `start`/`size`/`fill`/`sourceOffset` fields throughout the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HexU32(pub u32);

impl HexU32 {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HexU32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl<'de> Deserialize<'de> for HexU32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_hex(&raw).map(HexU32).map_err(serde::de::Error::custom)
    }
}

fn parse_hex(raw: &str) -> Result<u32, String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|_| format!("'{raw}' is not a valid hex value"))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(rename = "addressSpace")]
    pub address_space: u32,
    pub cpu: CpuProfile,
    #[serde(default)]
    pub memory: MemoryProfile,
    #[serde(default)]
    pub devices: DevicesProfile,
    #[serde(default)]
    pub boot: BootProfile,
}

impl Profile {
    /// Parses a profile from an in-memory JSON document (no associated file
    /// path — relative sources resolve against the app root).
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        serde_json::from_str(json).map_err(ProfileError::ParseInMemory)
    }

    /// Loads and parses a profile from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ProfileError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| ProfileError::Parse { path: path.to_path_buf(), source })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuProfile {
    #[serde(rename = "type")]
    pub cpu_type: String,
    #[serde(rename = "clockHz", default)]
    pub clock_hz: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryProfile {
    #[serde(rename = "rom-images", default)]
    pub rom_images: Vec<RomImage>,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(rename = "swap-groups", default)]
    pub swap_groups: Vec<SwapGroupSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomImage {
    pub name: String,
    pub source: String,
    pub size: HexU32,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub on_verification_fail: VerificationFailPolicy,
    #[serde(default)]
    pub hash: Option<RomHash>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationFailPolicy {
    #[default]
    Stop,
    Fallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomHash {
    pub sha256: Option<String>,
    pub md5: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub start: HexU32,
    pub size: HexU32,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "sourceOffset", default)]
    pub source_offset: Option<HexU32>,
    #[serde(default)]
    pub fill: Option<HexU32>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    Ram,
    Rom,
    Io,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapGroupSpec {
    pub name: String,
    pub start: HexU32,
    pub size: HexU32,
    #[serde(default)]
    pub controller: Option<String>,
    pub variants: Vec<SwapVariantSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapVariantSpec {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub offset: Option<HexU32>,
    #[serde(default)]
    pub permissions: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesProfile {
    #[serde(default)]
    pub motherboard: Vec<MotherboardDeviceSpec>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDeviceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotherboardDeviceSpec {
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotDeviceSpec {
    #[serde(rename = "type")]
    pub type_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootProfile {
    #[serde(rename = "autoStart", default)]
    pub auto_start: bool,
    #[serde(rename = "startupSlot", default)]
    pub startup_slot: Option<u8>,
}

/// Where a resolved source ultimately lives: a filesystem path, or a name
/// inside the embedded resource set (`embedded://` never touches disk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    File(PathBuf),
    Embedded(String),
}

/// The directories and roots needed to resolve a profile's `source` fields.
/// `profile_dir` is `None` when the profile was loaded in-memory, in which
/// case relative sources fall back to `app_root`.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    pub library_root: Option<PathBuf>,
    pub app_root: PathBuf,
    pub profile_dir: Option<PathBuf>,
}

impl ResourceContext {
    pub fn resolve(&self, source: &str) -> Result<ResolvedSource, ConfigurationError> {
        if let Some(rest) = source.strip_prefix("library://") {
            let root = self
                .library_root
                .as_ref()
                .ok_or_else(|| ConfigurationError::LibraryRootNotConfigured(rest.to_string()))?;
            Ok(ResolvedSource::File(root.join(rest)))
        } else if let Some(rest) = source.strip_prefix("app://") {
            Ok(ResolvedSource::File(self.app_root.join(rest)))
        } else if let Some(rest) = source.strip_prefix("embedded://") {
            Ok(ResolvedSource::Embedded(rest.to_string()))
        } else {
            let path = Path::new(source);
            if path.is_absolute() {
                Ok(ResolvedSource::File(path.to_path_buf()))
            } else {
                let base = self.profile_dir.as_deref().unwrap_or(&self.app_root);
                Ok(ResolvedSource::File(base.join(path)))
            }
        }
    }
}

/// Bundled resources addressed by `embedded://AssemblyOrBundle/Resource.Name`.
/// A profile loader with no bundle (the common case for a standalone build)
/// uses [`NoEmbeddedResources`].
pub trait EmbeddedResources {
    fn load(&self, name: &str) -> Option<Vec<u8>>;
}

pub struct NoEmbeddedResources;

impl EmbeddedResources for NoEmbeddedResources {
    fn load(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// An in-memory set of named resources, useful for tests and for embedding
/// ROM images directly into a binary at compile time.
#[derive(Default)]
pub struct MemoryEmbeddedResources(BTreeMap<String, Vec<u8>>);

impl MemoryEmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.0.insert(name.into(), bytes);
    }
}

impl EmbeddedResources for MemoryEmbeddedResources {
    fn load(&self, name: &str) -> Option<Vec<u8>> {
        self.0.get(name).cloned()
    }
}

/// Loads the raw bytes a resolved source points at.
pub fn load_bytes(
    resolved: &ResolvedSource,
    embedded: &dyn EmbeddedResources,
) -> Result<Vec<u8>, ResourceError> {
    match resolved {
        ResolvedSource::File(path) => {
            if !path.exists() {
                return Err(ResourceError::NotFound(path.clone()));
            }
            std::fs::read(path).map_err(|source| ResourceError::Io { path: path.clone(), source })
        }
        ResolvedSource::Embedded(name) => {
            embedded.load(name).ok_or_else(|| ResourceError::EmbeddedResourceNotFound(name.clone()))
        }
    }
}

/// Verifies `bytes` against `hash`, preferring SHA-256 when both are given.
/// A `hash` with neither field set verifies trivially (nothing declared).
pub fn verify_rom_hash(name: &str, bytes: &[u8], hash: &RomHash) -> Result<(), ResourceError> {
    if let Some(expected) = &hash.sha256 {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let actual = hex_encode(&hasher.finalize());
        return check(name, expected, &actual);
    }
    if let Some(expected) = &hash.md5 {
        use md5::{Digest, Md5};
        let mut hasher = Md5::new();
        hasher.update(bytes);
        let actual = hex_encode(&hasher.finalize());
        return check(name, expected, &actual);
    }
    Ok(())
}

fn check(name: &str, expected: &str, actual: &str) -> Result<(), ResourceError> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ResourceError::HashMismatch { name: name.to_string(), expected: expected.to_string(), actual: actual.to_string() })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "pocket2e",
        "addressSpace": 16,
        "cpu": { "type": "65C02", "clockHz": 1022727 },
        "memory": {
            "rom-images": [
                { "name": "monitor", "source": "library://roms/iie.rom", "size": "0x4000", "required": true,
                  "on_verification_fail": "stop" }
            ],
            "regions": [
                { "name": "main-ram", "type": "ram", "start": "0x0000", "size": "0xC000", "permissions": "rwx", "fill": "0x00" },
                { "name": "monitor-rom", "type": "rom", "start": "0xC000", "size": "0x4000", "permissions": "rx", "source": "monitor" }
            ]
        },
        "devices": {
            "motherboard": [
                { "type": "languagecard", "enabled": true }
            ],
            "slots": { "6": { "type": "diskii" } }
        },
        "boot": { "autoStart": true, "startupSlot": 6 }
    }"#;

    #[test]
    fn parses_the_documented_schema() {
        let profile = Profile::from_json(SAMPLE).unwrap();
        assert_eq!(profile.name, "pocket2e");
        assert_eq!(profile.address_space, 16);
        assert_eq!(profile.memory.regions.len(), 2);
        assert_eq!(profile.memory.regions[0].start.get(), 0x0000);
        assert_eq!(profile.memory.regions[1].start.get(), 0xC000);
        assert_eq!(profile.devices.slots.get("6").unwrap().type_id, "diskii");
        assert_eq!(profile.boot.startup_slot, Some(6));
    }

    #[test]
    fn plain_hex_without_0x_prefix_is_also_accepted() {
        let json = r#"{"name":"x","start":"C000"}"#;
        #[derive(Deserialize)]
        struct T {
            start: HexU32,
        }
        let t: T = serde_json::from_str(json).unwrap();
        assert_eq!(t.start.get(), 0xC000);
    }

    #[test]
    fn library_scheme_requires_a_configured_root() {
        let ctx = ResourceContext::default();
        let err = ctx.resolve("library://roms/iie.rom").unwrap_err();
        assert!(matches!(err, ConfigurationError::LibraryRootNotConfigured(_)));
    }

    #[test]
    fn relative_sources_resolve_against_the_profile_directory_when_present() {
        let ctx = ResourceContext {
            library_root: None,
            app_root: PathBuf::from("/app"),
            profile_dir: Some(PathBuf::from("/profiles/demo")),
        };
        let resolved = ctx.resolve("roms/iie.rom").unwrap();
        assert_eq!(resolved, ResolvedSource::File(PathBuf::from("/profiles/demo/roms/iie.rom")));
    }

    #[test]
    fn embedded_sources_never_touch_the_filesystem() {
        let ctx = ResourceContext::default();
        let resolved = ctx.resolve("embedded://Bundle/iie.rom").unwrap();
        assert_eq!(resolved, ResolvedSource::Embedded("Bundle/iie.rom".to_string()));
    }

    #[test]
    fn mismatching_sha256_is_rejected() {
        let hash = RomHash { sha256: Some("0".repeat(64)), md5: None };
        let err = verify_rom_hash("monitor", b"not the rom", &hash).unwrap_err();
        assert!(matches!(err, ResourceError::HashMismatch { .. }));
    }

    #[test]
    fn matching_sha256_verifies() {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"rom bytes");
        let digest = hex_encode(&hasher.finalize());
        let hash = RomHash { sha256: Some(digest), md5: None };
        assert!(verify_rom_hash("monitor", b"rom bytes", &hash).is_ok());
    }
}
