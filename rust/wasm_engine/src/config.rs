//! Declarative engine configuration and its fluent construction API.
//!
//! A [`VmConfig`] is owned by the caller and snapshotted by the engine
//! builder, so one configuration can seed any number of engines.  The
//! serializable subset deep-clones through [`VmConfig::quick_clone`]; I/O
//! handles, host functions, and the file reader are shared by reference and
//! re-attached by the builder.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::{FileReader, ImageConfig};
use crate::vm::VmState;

/// Classifies engine construction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmErrorKind {
    Undefined,
    ConfigInternalError,
    ConfigRequired,
    ImageError,
    MissingSizeOrFlatMemory,
    StrictModeAttemptRing0Reconfigure,
    RingAlreadyExists,
}

impl VmErrorKind {
    /// Stable name used in the rendered `[<kind>] <message>` form.
    pub fn name(&self) -> &'static str {
        match self {
            VmErrorKind::Undefined => "UndefinedVMInitError",
            VmErrorKind::ConfigInternalError => "VMConfigInternalError",
            VmErrorKind::ConfigRequired => "VMConfigRequired",
            VmErrorKind::ImageError => "VMImageError",
            VmErrorKind::MissingSizeOrFlatMemory => "MissingSizeOrFlatMemory",
            VmErrorKind::StrictModeAttemptRing0Reconfigure => "StrictModeAttemptRing0Reconfigure",
            VmErrorKind::RingAlreadyExists => "VMRingAlreadyExists",
        }
    }
}

impl fmt::Display for VmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed metadata payload carried by [`VmInitError`].
#[derive(Debug, Clone, PartialEq)]
pub enum VmErrorMeta {
    /// The image configuration a failed populate run was built from.
    Image(ImageConfig),
    /// The colliding key of a rejected fluent merge.
    Key(String),
}

/// Structured failure raised while building an engine.
#[derive(Debug, Error)]
#[error("[{kind}] {msg}")]
pub struct VmInitError {
    pub kind: VmErrorKind,
    pub msg: String,
    #[source]
    pub cause: Option<Box<dyn Error + Send + Sync>>,
    pub meta: Option<VmErrorMeta>,
}

impl VmInitError {
    pub fn new(kind: VmErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: None,
            meta: None,
        }
    }

    pub fn with_cause(
        kind: VmErrorKind,
        msg: impl Into<String>,
        cause: Box<dyn Error + Send + Sync>,
    ) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: Some(cause),
            meta: None,
        }
    }

    pub fn with_meta(kind: VmErrorKind, msg: impl Into<String>, meta: VmErrorMeta) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: None,
            meta: Some(meta),
        }
    }

    pub fn with_cause_and_meta(
        kind: VmErrorKind,
        msg: impl Into<String>,
        cause: Box<dyn Error + Send + Sync>,
        meta: VmErrorMeta,
    ) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: Some(cause),
            meta: Some(meta),
        }
    }
}

/// Aggregate of per-key collisions rejected by a fluent append.
///
/// The original map is left untouched when this is returned; rendering joins
/// the individual collision errors line by line.
#[derive(Debug)]
pub struct ConfigMergeError {
    pub errors: Vec<VmInitError>,
}

impl fmt::Display for ConfigMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl Error for ConfigMergeError {}

/// Protection-ring descriptor.  Ring 0 is forced to `enabled` by the engine
/// builder; the remaining rings are carried for the future protection model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    pub enabled: bool,
}

/// Shared readable stream handed to the engine.
pub type InputHandle = Arc<Mutex<dyn Read + Send>>;

/// Shared writable stream handed to the engine.
pub type OutputHandle = Arc<Mutex<dyn Write + Send>>;

/// Signature of a host function exposed to guest programs.
pub type HostFn =
    Arc<dyn Fn(&mut VmState, &[serde_json::Value]) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Host function descriptor.
///
/// No opcode invokes these yet; carrying them on the configuration is a
/// forward-compatibility contract only.
#[derive(Clone)]
pub struct ExposedFunc {
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub function: HostFn,
}

impl fmt::Debug for ExposedFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedFunc")
            .field("parameters", &self.parameters)
            .field("function", &"<host fn>")
            .finish()
    }
}

/// Declarative build input for the engine.
///
/// Mutators return `&mut Self` for chaining.  The builder never mutates the
/// caller's configuration; it works on a [`VmConfig::quick_clone`] copy.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Memory size in octets.  Ignored when `flat_memory` is provided.
    pub size: u64,
    /// Optional preallocated memory buffer, used verbatim as linear memory.
    pub flat_memory: Option<Vec<u8>>,
    /// Promote recoverable initialization anomalies to build errors.
    pub strict: bool,
    pub image: Option<ImageConfig>,
    pub rings: Option<BTreeMap<u8, RingConfig>>,
    /// Entry-point override; a non-zero value replaces the initial PC.
    pub start_override: Option<u64>,
    #[serde(skip)]
    pub stdin: Option<InputHandle>,
    #[serde(skip)]
    pub stdout: Option<OutputHandle>,
    #[serde(skip)]
    pub stderr: Option<OutputHandle>,
    #[serde(skip)]
    pub exposed_funcs: Option<BTreeMap<String, ExposedFunc>>,
    #[serde(skip)]
    pub file_reader: Option<Arc<dyn FileReader>>,
}

impl fmt::Debug for VmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmConfig")
            .field("size", &self.size)
            .field("flat_memory", &self.flat_memory.as_ref().map(Vec::len))
            .field("strict", &self.strict)
            .field("image", &self.image)
            .field("rings", &self.rings)
            .field("start_override", &self.start_override)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("exposed_funcs", &self.exposed_funcs.is_some())
            .field("file_reader", &self.file_reader.is_some())
            .finish()
    }
}

/// Merge `incoming` into `base` without overwriting.
///
/// Any key collision rejects the whole merge: no incoming entries are
/// applied and every colliding key is reported.
fn merge_maps<K, V>(
    base: &BTreeMap<K, V>,
    incoming: BTreeMap<K, V>,
    noun: &str,
) -> Result<BTreeMap<K, V>, ConfigMergeError>
where
    K: Ord + Clone + fmt::Display,
    V: Clone,
{
    let mut merged = base.clone();
    let mut conflicts = Vec::new();
    for (key, value) in incoming {
        if merged.contains_key(&key) {
            conflicts.push(VmInitError::with_meta(
                VmErrorKind::RingAlreadyExists,
                format!("the {noun} {key} is already present"),
                VmErrorMeta::Key(key.to_string()),
            ));
            continue;
        }
        merged.insert(key, value);
    }
    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(ConfigMergeError { errors: conflicts })
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_size(&mut self, size: u64) -> &mut Self {
        self.size = size;
        self
    }

    pub fn set_flat_memory(&mut self, memory: Vec<u8>) -> &mut Self {
        self.flat_memory = Some(memory);
        self
    }

    /// Concatenate onto any existing flat-memory buffer.
    pub fn append_flat_memory(&mut self, memory: &[u8]) -> &mut Self {
        self.flat_memory
            .get_or_insert_with(Vec::new)
            .extend_from_slice(memory);
        self
    }

    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    pub fn set_image(&mut self, image: ImageConfig) -> &mut Self {
        self.image = Some(image);
        self
    }

    pub fn set_ring_config(&mut self, rings: BTreeMap<u8, RingConfig>) -> &mut Self {
        self.rings = Some(rings);
        self
    }

    /// Merge additional rings without overwriting existing entries.
    pub fn append_ring_config(
        &mut self,
        rings: BTreeMap<u8, RingConfig>,
    ) -> Result<&mut Self, ConfigMergeError> {
        match self.rings.take() {
            None => {
                self.rings = Some(rings);
                Ok(self)
            }
            Some(existing) => match merge_maps(&existing, rings, "ring") {
                Ok(merged) => {
                    self.rings = Some(merged);
                    Ok(self)
                }
                Err(error) => {
                    self.rings = Some(existing);
                    Err(error)
                }
            },
        }
    }

    pub fn set_stdin(&mut self, stdin: InputHandle) -> &mut Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn set_stdout(&mut self, stdout: OutputHandle) -> &mut Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn set_stderr(&mut self, stderr: OutputHandle) -> &mut Self {
        self.stderr = Some(stderr);
        self
    }

    pub fn set_exposed_funcs(&mut self, funcs: BTreeMap<String, ExposedFunc>) -> &mut Self {
        self.exposed_funcs = Some(funcs);
        self
    }

    /// Merge additional host functions without overwriting existing entries.
    pub fn append_exposed_funcs(
        &mut self,
        funcs: BTreeMap<String, ExposedFunc>,
    ) -> Result<&mut Self, ConfigMergeError> {
        match self.exposed_funcs.take() {
            None => {
                self.exposed_funcs = Some(funcs);
                Ok(self)
            }
            Some(existing) => match merge_maps(&existing, funcs, "exposed function") {
                Ok(merged) => {
                    self.exposed_funcs = Some(merged);
                    Ok(self)
                }
                Err(error) => {
                    self.exposed_funcs = Some(existing);
                    Err(error)
                }
            },
        }
    }

    pub fn set_start_override(&mut self, start: u64) -> &mut Self {
        self.start_override = Some(start);
        self
    }

    pub fn set_file_reader(&mut self, reader: Arc<dyn FileReader>) -> &mut Self {
        self.file_reader = Some(reader);
        self
    }

    /// Deep-copy the serializable subset of the configuration.
    ///
    /// Round-trips through JSON, which intentionally drops the I/O handles,
    /// the exposed-function table, and the file reader; the engine builder
    /// re-attaches those from the original configuration.
    pub fn quick_clone(&self) -> Result<VmConfig, serde_json::Error> {
        let raw = serde_json::to_vec(self)?;
        serde_json::from_slice(&raw)
    }

    /// Build an engine from this configuration.
    pub fn build(&self) -> Result<VmState, VmInitError> {
        VmState::new(Some(self))
    }
}
