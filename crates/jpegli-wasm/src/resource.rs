//! Codec module resources.
//!
//! The codec ships as a WebAssembly binary that is usually gzip-compressed.
//! [`load_module_bytes`] reads a [`ModuleSource`] and hands back the bytes the
//! runtime can compile, unpacking gzip on the way.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use flate2::read::GzDecoder;

use crate::error::{CodecError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where the codec module bytes come from.
#[derive(Clone)]
pub enum ModuleSource {
    /// Bytes linked into the binary (e.g. via `include_bytes!`).
    Static(&'static [u8]),
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// A file on disk.
    Path(PathBuf),
}

impl ModuleSource {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Static(bytes) => format!("<static {} bytes>", bytes.len()),
            Self::Bytes(bytes) => format!("<memory {} bytes>", bytes.len()),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleSource").field(&self.name()).finish()
    }
}

/// Module image compiled in with the `embedded` feature.  The path comes
/// from `JPEGLI_WASM_GZ` at build time.
#[cfg(feature = "embedded")]
static EMBEDDED: Option<&[u8]> = Some(include_bytes!(env!("JPEGLI_WASM_GZ")));
#[cfg(not(feature = "embedded"))]
static EMBEDDED: Option<&[u8]> = None;

/// The module linked into this build, if any.
pub fn embedded() -> Option<ModuleSource> {
    EMBEDDED.map(ModuleSource::Static)
}

/// Returns `true` when `bytes` starts with the gzip member header.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Read the module bytes from `source`, decompressing gzip input.
pub fn load_module_bytes(source: &ModuleSource) -> Result<Vec<u8>> {
    let raw: std::borrow::Cow<'_, [u8]> = match source {
        ModuleSource::Static(bytes) => (*bytes).into(),
        ModuleSource::Bytes(bytes) => bytes.as_slice().into(),
        ModuleSource::Path(path) => std::fs::read(path)
            .map_err(|e| resource_error(source, format!("read failed: {e}")))?
            .into(),
    };

    if !is_gzip(&raw) {
        tracing::debug!(source = %source.name(), size_bytes = raw.len(), "loaded uncompressed module");
        return Ok(raw.into_owned());
    }

    let mut unpacked = Vec::with_capacity(raw.len() * 4);
    GzDecoder::new(raw.as_ref())
        .read_to_end(&mut unpacked)
        .map_err(|e| resource_error(source, format!("gzip decode failed: {e}")))?;

    tracing::debug!(
        source = %source.name(),
        compressed_bytes = raw.len(),
        size_bytes = unpacked.len(),
        "decompressed module"
    );
    Ok(unpacked)
}

fn resource_error(source: &ModuleSource, reason: String) -> CodecError {
    CodecError::Resource {
        source_name: source.name(),
        reason,
    }
}
