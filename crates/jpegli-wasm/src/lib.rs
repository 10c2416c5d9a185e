//! Host-side interop layer for a sandboxed jpegli codec.
//!
//! The codec is jpegli compiled to WebAssembly and exposing four exports:
//! `malloc`, `free`, `decode` and `encode`.  This crate runs it under
//! wasmtime and moves images across the sandbox boundary.
//!
//! - **[`resource`]** -- [`ModuleSource`] and gzip-aware loading of the module.
//!   With the `embedded` feature the gzip image named by `JPEGLI_WASM_GZ` at
//!   build time is linked in and used when no module path is configured.
//! - **[`runtime`]** -- [`CodecModule`] compiles once; [`WasmGuest`] is one
//!   instance with its own linear memory.
//! - **[`guest`]** -- the [`Guest`] trait the marshalers are written against.
//! - **[`memory`]** -- scoped sandbox buffers that are always freed.
//! - **[`geometry`]** -- colorspace tags, alignment and plane layout rules.
//! - **[`raster`]** -- host images, including CMYK and planar YCbCr.
//! - **[`decode`]** / **[`encode`]** -- the marshalers.
//! - **[`codec`]** -- [`Codec`], the pooled handle, and the process-wide
//!   instance behind the free functions below.
//! - **[`task`]** -- async wrappers running on tokio's blocking pool.
//!
//! ```ignore
//! let codec = Codec::new(&CodecConfig::from_env()?)?;
//! let decoded = codec.decode(std::fs::File::open("in.jpg")?)?;
//! codec.encode(std::fs::File::create("out.jpg")?, &decoded.image, None)?;
//! ```

pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod guest;
pub mod memory;
pub mod options;
pub mod raster;
pub mod resource;
pub mod runtime;
pub mod task;

#[cfg(test)]
mod testing;

use std::io::{Read, Write};

pub use codec::{Codec, CodecCell, ensure_ready, global, init_with_source};
pub use config::CodecConfig;
pub use decode::Decoded;
pub use error::{CodecError, Result};
pub use geometry::{ChromaSubsampling, ColorModel, ColorSpace, ImageDescriptor};
pub use guest::Guest;
pub use options::{DctMethod, DecodingOptions, EncodingOptions};
pub use raster::{CmykImage, Image, YCbCrImage};
pub use resource::ModuleSource;
pub use runtime::{CodecModule, WasmGuest};

/// Create the process-wide codec from `config` instead of the environment.
///
/// Returns `false` if the codec already exists.  Panics if creation fails.
pub fn init(config: CodecConfig) -> bool {
    codec::init_with(config)
}

/// Decode `reader` with default options using the process-wide codec.
pub fn decode<R: Read>(reader: R) -> Result<Decoded> {
    global().decode(reader)
}

pub fn decode_with_options<R: Read>(reader: R, opts: &DecodingOptions) -> Result<Decoded> {
    global().decode_with_options(reader, opts)
}

/// Image metadata from the head of `reader`; no pixels are decoded.
pub fn decode_config<R: Read>(reader: R) -> Result<ImageDescriptor> {
    global().describe(reader)
}

/// Encode `image` to `writer` using the process-wide codec.
pub fn encode<W: Write>(writer: W, image: &Image, opts: Option<&EncodingOptions>) -> Result<()> {
    global().encode(writer, image, opts)
}
