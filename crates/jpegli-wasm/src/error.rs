//! Codec error types.
//!
//! Every fallible operation in this crate returns [`CodecError`].  Boundary
//! transfer failures carry the name of the step that failed so callers can
//! tell a bad sandbox address apart from a codec-level rejection.
//!
//! Failures while compiling or instantiating the embedded codec are not part
//! of this taxonomy: they indicate a broken deployment and abort the process
//! (see [`crate::codec`]).

/// Unified error type for the sandboxed codec interop layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    // -- Boundary transfer ---------------------------------------------------
    /// Reading from sandbox linear memory failed (range not mapped).
    #[error("{step}: mem read failed ({len} bytes at {ptr:#x})")]
    MemRead {
        /// Marshaling step that issued the read.
        step: &'static str,
        /// Sandbox address of the first byte.
        ptr: u32,
        /// Number of bytes requested.
        len: usize,
    },

    /// Writing into sandbox linear memory failed (range not mapped).
    #[error("{step}: mem write failed ({len} bytes at {ptr:#x})")]
    MemWrite {
        step: &'static str,
        ptr: u32,
        len: usize,
    },

    /// The sandbox allocator returned a null pointer.
    #[error("{step}: sandbox allocation of {size} bytes failed")]
    AllocFailed { step: &'static str, size: usize },

    /// Calling an exported function trapped or otherwise failed.
    #[error("call to `{export}` failed: {reason}")]
    Call {
        /// Export name (`malloc`, `free`, `decode`, `encode`).
        export: &'static str,
        reason: String,
    },

    // -- Codec logic --------------------------------------------------------
    /// The codec's decode export returned a zero status.
    #[error("decode failed")]
    DecodeFailed,

    /// The codec's encode export reported a zero output size.
    #[error("encode failed")]
    EncodeFailed,

    /// The codec reported a colorspace tag outside the five known values.
    #[error("unsupported colorspace {0}")]
    UnsupportedColorspace(u32),

    /// A YCbCr image reported a chroma subsampling tag we cannot lay out.
    #[error("unsupported chroma subsampling {0}")]
    UnsupportedSubsampling(u32),

    /// A computed plane boundary does not fit the buffer it addresses.
    #[error("layout error: {reason}")]
    Layout { reason: String },

    /// A host image's pixel storage is inconsistent with its geometry.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    // -- Host I/O -----------------------------------------------------------
    /// Reading the compressed source stream failed.
    #[error("read: {0}")]
    StreamRead(#[source] std::io::Error),

    /// Writing the compressed result to the destination failed.
    #[error("write: {0}")]
    StreamWrite(#[source] std::io::Error),

    // -- Setup --------------------------------------------------------------
    /// The codec module bytes could not be loaded or unpacked.
    #[error("resource `{source_name}`: {reason}")]
    Resource { source_name: String, reason: String },

    /// Configuration could not be parsed or is out of range.
    #[error("config error: {0}")]
    Config(String),

    /// Building the wasm engine, module, or instance failed.
    #[error("sandbox setup failed: {0}")]
    Setup(String),

    /// A blocking codec task could not be joined.
    #[error("codec task failed: {0}")]
    Join(String),
}

impl CodecError {
    /// Returns `true` for failures at the host/sandbox memory boundary.
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            Self::MemRead { .. } | Self::MemWrite { .. } | Self::AllocFailed { .. }
        )
    }

    pub(crate) fn layout(reason: impl Into<String>) -> Self {
        Self::Layout {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the codec crate.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_read_display_names_step() {
        let err = CodecError::MemRead {
            step: "decode/meta",
            ptr: 0x400,
            len: 16,
        };
        assert_eq!(
            err.to_string(),
            "decode/meta: mem read failed (16 bytes at 0x400)"
        );
    }

    #[test]
    fn mem_write_display_names_step() {
        let err = CodecError::MemWrite {
            step: "encode/input",
            ptr: 0x10,
            len: 3,
        };
        assert_eq!(
            err.to_string(),
            "encode/input: mem write failed (3 bytes at 0x10)"
        );
    }

    #[test]
    fn codec_errors_display() {
        assert_eq!(CodecError::DecodeFailed.to_string(), "decode failed");
        assert_eq!(CodecError::EncodeFailed.to_string(), "encode failed");
        assert_eq!(
            CodecError::UnsupportedColorspace(9).to_string(),
            "unsupported colorspace 9"
        );
    }

    #[test]
    fn call_error_display() {
        let err = CodecError::Call {
            export: "decode",
            reason: "unreachable".into(),
        };
        assert_eq!(err.to_string(), "call to `decode` failed: unreachable");
    }

    #[test]
    fn stream_errors_wrap_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = CodecError::StreamWrite(io_err);
        assert_eq!(err.to_string(), "write: pipe gone");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn boundary_classification() {
        assert!(
            CodecError::MemRead {
                step: "x",
                ptr: 0,
                len: 1
            }
            .is_boundary()
        );
        assert!(
            CodecError::AllocFailed {
                step: "x",
                size: 1
            }
            .is_boundary()
        );
        assert!(!CodecError::DecodeFailed.is_boundary());
        assert!(!CodecError::EncodeFailed.is_boundary());
    }
}
