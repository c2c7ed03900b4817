//! Linear-memory image loading.
//!
//! An [`ImageConfig`] describes how the engine's memory is filled before
//! execution starts: from a file, a literal byte array, zero fill, or a list
//! of sparse segments.  [`populate_image`] applies the description in place
//! and reports anomalies either as warnings (lenient mode) or as a single
//! structured [`ImageInitError`] (strict mode).  A returned error is
//! authoritative; no warnings accompany it.

use std::collections::HashSet;
use std::fmt;
use std::io;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifies image initialization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageErrorKind {
    Undefined,
    UnknownImageType,
    FileImageOtherError,
    ImageSizeRequired,
    ImageSizeTooLargeForMemory,
    ImageInitArrayLargerThanConfig,
    SparseEntryOutOfBounds,
    SparseEntryMemoryOverwrite,
    SparseEntryMultipleTypes,
}

impl ImageErrorKind {
    /// Stable name used in the rendered `[<kind>] <message>` form.
    pub fn name(&self) -> &'static str {
        match self {
            ImageErrorKind::Undefined => "UndefinedImageError",
            ImageErrorKind::UnknownImageType => "UnknownImageType",
            ImageErrorKind::FileImageOtherError => "FileImageOtherError",
            ImageErrorKind::ImageSizeRequired => "ImageSizeRequired",
            ImageErrorKind::ImageSizeTooLargeForMemory => "ImageSizeTooLargeForMemory",
            ImageErrorKind::ImageInitArrayLargerThanConfig => "ImageInitArrayLargerThanConfig",
            ImageErrorKind::SparseEntryOutOfBounds => "SparseEntryOutOfBounds",
            ImageErrorKind::SparseEntryMemoryOverwrite => "SparseEntryMemoryOverwrite",
            ImageErrorKind::SparseEntryMultipleTypes => "SparseEntryMultipleTypes",
        }
    }
}

impl fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sizing details attached to file/array/empty image errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSizingMeta {
    pub filename: Option<String>,
    pub data_size: u64,
    pub config_size: u64,
    pub memory_size: u64,
}

/// One problematic sparse segment recorded during a strict populate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseProblemEntry {
    pub offset: u64,
    pub array: Vec<u8>,
    pub kind: ImageErrorKind,
}

/// Aggregate metadata for sparse populate failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseErrorMeta {
    pub config_size: u64,
    pub memory_size: u64,
    pub problem_entries: Vec<SparseProblemEntry>,
}

/// Typed metadata payload carried by [`ImageInitError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageErrorMeta {
    Sizing(ImageSizingMeta),
    Sparse(SparseErrorMeta),
}

/// Structured failure raised while populating linear memory.
#[derive(Debug, Error)]
#[error("[{kind}] {msg}")]
pub struct ImageInitError {
    pub kind: ImageErrorKind,
    pub msg: String,
    #[source]
    pub cause: Option<io::Error>,
    pub meta: Option<ImageErrorMeta>,
}

impl ImageInitError {
    pub fn new(kind: ImageErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: None,
            meta: None,
        }
    }

    pub fn with_cause(kind: ImageErrorKind, msg: impl Into<String>, cause: io::Error) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: Some(cause),
            meta: None,
        }
    }

    pub fn with_meta(kind: ImageErrorKind, msg: impl Into<String>, meta: ImageErrorMeta) -> Self {
        Self {
            kind,
            msg: msg.into(),
            cause: None,
            meta: Some(meta),
        }
    }
}

/// File access seam used by the `file` image variant.
///
/// The engine consults the reader carried on its configuration (or
/// [`FsReader`] when none is set), so tests can substitute fixture bytes
/// without touching the filesystem and without any process-global state.
pub trait FileReader: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Reads from the platform filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Image source variants understood by the loader.
///
/// Tags parse case-insensitively with surrounding whitespace trimmed;
/// anything unrecognized is preserved as [`ImageType::Unknown`] and rejected
/// by [`populate_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageType {
    File,
    Array,
    Empty,
    SparseArray,
    Unknown(String),
}

impl ImageType {
    pub fn from_tag(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => ImageType::File,
            "array" => ImageType::Array,
            "empty" => ImageType::Empty,
            "sparsearray" => ImageType::SparseArray,
            _ => ImageType::Unknown(raw.to_string()),
        }
    }

    /// Canonical lowercase tag used in serialized configurations.
    pub fn as_str(&self) -> &str {
        match self {
            ImageType::File => "file",
            ImageType::Array => "array",
            ImageType::Empty => "empty",
            ImageType::SparseArray => "sparsearray",
            ImageType::Unknown(raw) => raw.as_str(),
        }
    }
}

impl Default for ImageType {
    fn default() -> Self {
        ImageType::Unknown(String::new())
    }
}

impl Serialize for ImageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ImageType::from_tag(&raw))
    }
}

/// One contiguous fragment written into memory at `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseArrayEntry {
    pub offset: u64,
    pub array: Vec<u8>,
}

/// Declarative description of how linear memory is initially filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    #[serde(rename = "type")]
    pub image_type: ImageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub array: Vec<u8>,
    pub size: u64,
    #[serde(rename = "sparsearray", skip_serializing_if = "Vec::is_empty")]
    pub sparse: Vec<SparseArrayEntry>,
}

/// Parse a JSON image description.
pub fn parse_image_config(raw: &[u8]) -> Result<ImageConfig, serde_json::Error> {
    serde_json::from_slice(raw)
}

/// Fill `memory` according to `config`.
///
/// Returns the warnings accumulated along the way.  Strict mode promotes
/// recoverable anomalies to errors; the zero-size requirement of the array
/// and empty variants is a hard error in either mode.  When an error is
/// returned, memory is left in whatever partial state the run produced;
/// the engine builder discards it.
pub fn populate_image(
    memory: &mut [u8],
    config: &ImageConfig,
    strict: bool,
    reader: &dyn FileReader,
) -> Result<Vec<String>, ImageInitError> {
    match &config.image_type {
        ImageType::File => populate_file(memory, config, strict, reader),
        ImageType::Array => populate_array(memory, config, strict),
        ImageType::Empty => populate_empty(memory, config, strict),
        ImageType::SparseArray => populate_sparse(memory, config, strict),
        ImageType::Unknown(raw) => Err(ImageInitError::new(
            ImageErrorKind::UnknownImageType,
            format!("unknown image type: {raw}"),
        )),
    }
}

fn populate_file(
    memory: &mut [u8],
    config: &ImageConfig,
    strict: bool,
    reader: &dyn FileReader,
) -> Result<Vec<String>, ImageInitError> {
    let mut warnings = Vec::new();
    let filename = config.filename.as_deref().unwrap_or_default();
    let data = reader.read(filename).map_err(|cause| {
        ImageInitError::with_cause(
            ImageErrorKind::FileImageOtherError,
            "Error while reading image file",
            cause,
        )
    })?;
    if data.len() > memory.len() {
        let message = format!(
            "file entry image is larger than memory file:{} vs mem:{}",
            data.len(),
            memory.len()
        );
        if strict {
            return Err(ImageInitError::with_meta(
                ImageErrorKind::ImageSizeTooLargeForMemory,
                message,
                ImageErrorMeta::Sizing(ImageSizingMeta {
                    filename: config.filename.clone(),
                    data_size: data.len() as u64,
                    config_size: config.size,
                    memory_size: memory.len() as u64,
                }),
            ));
        }
        warnings.push(message);
    }
    let count = data.len().min(memory.len());
    memory[..count].copy_from_slice(&data[..count]);
    Ok(warnings)
}

fn populate_array(
    memory: &mut [u8],
    config: &ImageConfig,
    strict: bool,
) -> Result<Vec<String>, ImageInitError> {
    let mut warnings = Vec::new();
    let memory_size = memory.len() as u64;
    let sizing = |config_size: u64| {
        ImageErrorMeta::Sizing(ImageSizingMeta {
            filename: None,
            data_size: config.array.len() as u64,
            config_size,
            memory_size,
        })
    };
    if config.size == 0 {
        return Err(ImageInitError::with_meta(
            ImageErrorKind::ImageSizeRequired,
            "array type requires size",
            sizing(0),
        ));
    }
    if config.size > memory_size {
        let message = "array configured size larger than memory";
        if strict {
            return Err(ImageInitError::with_meta(
                ImageErrorKind::ImageSizeTooLargeForMemory,
                message,
                sizing(config.size),
            ));
        }
        warnings.push(message.to_string());
    }
    if config.size < config.array.len() as u64 {
        let message = "array entry larger than size";
        if strict {
            return Err(ImageInitError::with_meta(
                ImageErrorKind::ImageInitArrayLargerThanConfig,
                message,
                sizing(config.size),
            ));
        }
        warnings.push(message.to_string());
    }
    let count = config.array.len().min(memory.len());
    memory[..count].copy_from_slice(&config.array[..count]);
    let fill_end = config.size.min(memory_size) as usize;
    if count < fill_end {
        memory[count..fill_end].fill(0x00);
    }
    Ok(warnings)
}

fn populate_empty(
    memory: &mut [u8],
    config: &ImageConfig,
    strict: bool,
) -> Result<Vec<String>, ImageInitError> {
    let mut warnings = Vec::new();
    let memory_size = memory.len() as u64;
    if config.size == 0 {
        return Err(ImageInitError::with_meta(
            ImageErrorKind::ImageSizeRequired,
            "empty type requires size",
            ImageErrorMeta::Sizing(ImageSizingMeta {
                filename: None,
                data_size: 0,
                config_size: 0,
                memory_size,
            }),
        ));
    }
    if config.size > memory_size {
        let message = "memory is smaller than image size";
        if strict {
            return Err(ImageInitError::with_meta(
                ImageErrorKind::ImageSizeTooLargeForMemory,
                message,
                ImageErrorMeta::Sizing(ImageSizingMeta {
                    filename: None,
                    data_size: 0,
                    config_size: config.size,
                    memory_size,
                }),
            ));
        }
        warnings.push(message.to_string());
    }
    let fill_end = config.size.min(memory_size) as usize;
    memory[..fill_end].fill(0x00);
    Ok(warnings)
}

fn populate_sparse(
    memory: &mut [u8],
    config: &ImageConfig,
    strict: bool,
) -> Result<Vec<String>, ImageInitError> {
    let mut warnings = Vec::new();
    let mut problems: Vec<SparseProblemEntry> = Vec::new();
    // Dedup key: one problem record per (segment, kind) pair, in the order
    // the pair is first hit.  A segment that both overwrites and runs out of
    // bounds yields two records.
    let mut seen: HashSet<(usize, ImageErrorKind)> = HashSet::new();
    let memory_size = memory.len() as u64;

    for (index, entry) in config.sparse.iter().enumerate() {
        for (i, &byte) in entry.array.iter().enumerate() {
            // Saturating: an offset near u64::MAX classifies as out of
            // bounds instead of wrapping back into memory.
            let address = entry.offset.saturating_add(i as u64);
            if address >= memory_size {
                if strict {
                    record_problem(
                        &mut problems,
                        &mut seen,
                        index,
                        entry,
                        ImageErrorKind::SparseEntryOutOfBounds,
                    );
                } else {
                    warnings.push(format!(
                        "sparsearray entry out of bounds at offset {address}"
                    ));
                }
                continue;
            }
            let cell = &mut memory[address as usize];
            if *cell != 0x00 {
                if strict {
                    record_problem(
                        &mut problems,
                        &mut seen,
                        index,
                        entry,
                        ImageErrorKind::SparseEntryMemoryOverwrite,
                    );
                    continue;
                }
                warnings.push(format!("sparsearray: overwrite at offset {address}"));
            }
            *cell = byte;
        }
    }

    if problems.is_empty() {
        return Ok(warnings);
    }

    let out_of_bounds = problems
        .iter()
        .any(|p| p.kind == ImageErrorKind::SparseEntryOutOfBounds);
    let overwrite = problems
        .iter()
        .any(|p| p.kind == ImageErrorKind::SparseEntryMemoryOverwrite);
    let (kind, message) = match (out_of_bounds, overwrite) {
        (true, false) => (
            ImageErrorKind::SparseEntryOutOfBounds,
            "sparsearray entry out of bounds detected",
        ),
        (false, true) => (
            ImageErrorKind::SparseEntryMemoryOverwrite,
            "sparsearray: overwrite detected",
        ),
        _ => (
            ImageErrorKind::SparseEntryMultipleTypes,
            "sparsearray: multiple errors",
        ),
    };
    Err(ImageInitError::with_meta(
        kind,
        message,
        ImageErrorMeta::Sparse(SparseErrorMeta {
            config_size: config.size,
            memory_size,
            problem_entries: problems,
        }),
    ))
}

fn record_problem(
    problems: &mut Vec<SparseProblemEntry>,
    seen: &mut HashSet<(usize, ImageErrorKind)>,
    index: usize,
    entry: &SparseArrayEntry,
    kind: ImageErrorKind,
) {
    if seen.insert((index, kind)) {
        problems.push(SparseProblemEntry {
            offset: entry.offset,
            array: entry.array.clone(),
            kind,
        });
    }
}
