//! Encoding and decoding parameters.
//!
//! Both option sets are plain values.  [`EncodingOptions::clamped`] produces
//! the normalized copy that is actually handed to the codec.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::geometry::ChromaSubsampling;

/// Quality used when none (or a non-positive one) is given.
pub const DEFAULT_QUALITY: i32 = 75;

/// Highest progressive level the codec understands.
pub const MAX_PROGRESSIVE_LEVEL: i32 = 2;

/// DCT/IDCT algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DctMethod {
    /// Slow but accurate integer algorithm.
    #[default]
    ISlow = 0,
    /// Faster, less accurate integer method.
    IFast = 1,
    /// Floating point; accurate, fast on fast hardware.
    Float = 2,
}

impl DctMethod {
    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for DctMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ISlow => "islow",
            Self::IFast => "ifast",
            Self::Float => "float",
        })
    }
}

impl FromStr for DctMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "islow" => Ok(Self::ISlow),
            "ifast" => Ok(Self::IFast),
            "float" => Ok(Self::Float),
            other => Err(format!("unknown dct method `{other}` (expected islow|ifast|float)")),
        }
    }
}

/// Encoder parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncodingOptions {
    /// Quality in `(0, 100]`.  Default: **75**.
    pub quality: i32,
    /// Chroma subsampling for RGB sources.  Default: **4:2:0**.
    pub subsampling: ChromaSubsampling,
    /// Progressive level in `[0, 2]`; 0 is sequential.  Default: **0**.
    pub progressive_level: i32,
    /// Huffman code optimization.  Default: **true**.
    pub optimize_coding: bool,
    /// Adaptive quantization for more zero coefficients.  Default: **true**.
    pub adaptive_quantization: bool,
    /// Use the Annex K quantization tables instead of jpegli's own.
    /// Default: **false**.
    pub standard_quant_tables: bool,
    /// Default: **false**.
    pub fancy_downsampling: bool,
    pub dct_method: DctMethod,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            subsampling: ChromaSubsampling::Ratio420,
            progressive_level: 0,
            optimize_coding: true,
            adaptive_quantization: true,
            standard_quant_tables: false,
            fancy_downsampling: false,
            dct_method: DctMethod::ISlow,
        }
    }
}

impl EncodingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_subsampling(mut self, ratio: ChromaSubsampling) -> Self {
        self.subsampling = ratio;
        self
    }

    pub fn with_progressive_level(mut self, level: i32) -> Self {
        self.progressive_level = level;
        self
    }

    pub fn with_optimize_coding(mut self, enabled: bool) -> Self {
        self.optimize_coding = enabled;
        self
    }

    pub fn with_adaptive_quantization(mut self, enabled: bool) -> Self {
        self.adaptive_quantization = enabled;
        self
    }

    pub fn with_standard_quant_tables(mut self, enabled: bool) -> Self {
        self.standard_quant_tables = enabled;
        self
    }

    pub fn with_fancy_downsampling(mut self, enabled: bool) -> Self {
        self.fancy_downsampling = enabled;
        self
    }

    pub fn with_dct_method(mut self, method: DctMethod) -> Self {
        self.dct_method = method;
        self
    }

    /// Copy with quality and progressive level forced into range.
    ///
    /// A quality of zero or below falls back to [`DEFAULT_QUALITY`]; above
    /// 100 it is capped.  The progressive level is clamped into `[0, 2]`.
    pub fn clamped(&self) -> Self {
        let quality = match self.quality {
            q if q <= 0 => DEFAULT_QUALITY,
            q => q.min(100),
        };
        Self {
            quality,
            progressive_level: self.progressive_level.clamp(0, MAX_PROGRESSIVE_LEVEL),
            ..self.clone()
        }
    }
}

/// Decoder parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecodingOptions {
    /// Downscale so the output is at least this large (in 1/8 steps).
    /// Scaled output is always RGBA.
    pub scale_target: Option<(u32, u32)>,
    pub fancy_upsampling: bool,
    pub block_smoothing: bool,
    pub arith_coding: bool,
    pub dct_method: DctMethod,
}

impl DecodingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale_target(mut self, width: u32, height: u32) -> Self {
        self.scale_target = Some((width, height));
        self
    }

    pub fn with_fancy_upsampling(mut self, enabled: bool) -> Self {
        self.fancy_upsampling = enabled;
        self
    }

    pub fn with_block_smoothing(mut self, enabled: bool) -> Self {
        self.block_smoothing = enabled;
        self
    }

    pub fn with_arith_coding(mut self, enabled: bool) -> Self {
        self.arith_coding = enabled;
        self
    }

    pub fn with_dct_method(mut self, method: DctMethod) -> Self {
        self.dct_method = method;
        self
    }
}
