//! CLI argument definitions for `jpegli`.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use jpegli_wasm::{ChromaSubsampling, DctMethod, DecodingOptions, EncodingOptions};

/// jpegli -- JPEG encode/decode through a sandboxed WebAssembly codec.
#[derive(Parser)]
#[command(
    name = "jpegli",
    version,
    about = "JPEG encode/decode through a sandboxed jpegli module",
    long_about = "Runs the jpegli codec compiled to WebAssembly under wasmtime. The module \
                  path comes from --module, the config file, or JPEGLI_WASM."
)]
pub struct Cli {
    /// TOML file with codec settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Codec module (`.wasm` or `.wasm.gz`); overrides config and env.
    #[arg(long, global = true)]
    pub module: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print image metadata without decoding pixels.
    Info {
        input: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Decode a JPEG and save it in the format implied by the output path.
    Decode {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        opts: DecodeArgs,
    },

    /// Encode an image file as JPEG.
    Encode {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        opts: EncodeArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct DecodeArgs {
    /// Downscale to at least WIDTHxHEIGHT (output is RGBA).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_scale)]
    pub scale: Option<(u32, u32)>,

    #[arg(long)]
    pub fancy_upsampling: bool,

    #[arg(long)]
    pub block_smoothing: bool,

    #[arg(long)]
    pub arith_coding: bool,

    /// DCT method: islow, ifast or float.
    #[arg(long, default_value_t = DctMethod::ISlow)]
    pub dct: DctMethod,
}

impl DecodeArgs {
    pub fn to_options(&self) -> DecodingOptions {
        let mut opts = DecodingOptions::new()
            .with_fancy_upsampling(self.fancy_upsampling)
            .with_block_smoothing(self.block_smoothing)
            .with_arith_coding(self.arith_coding)
            .with_dct_method(self.dct);
        if let Some((w, h)) = self.scale {
            opts = opts.with_scale_target(w, h);
        }
        opts
    }
}

#[derive(Args, Debug, Clone)]
pub struct EncodeArgs {
    /// Quality in 1..=100; out-of-range values are clamped.
    #[arg(long, short, default_value_t = jpegli_wasm::options::DEFAULT_QUALITY)]
    pub quality: i32,

    /// Chroma subsampling: 444, 422, 420, 440, 411 or 410.
    #[arg(long, default_value_t = ChromaSubsampling::Ratio420)]
    pub subsampling: ChromaSubsampling,

    /// Progressive level 0..=2 (0 is sequential).
    #[arg(long, default_value_t = 0)]
    pub progressive: i32,

    #[arg(long)]
    pub no_optimize_coding: bool,

    #[arg(long)]
    pub no_adaptive_quantization: bool,

    #[arg(long)]
    pub standard_quant_tables: bool,

    #[arg(long)]
    pub fancy_downsampling: bool,

    /// DCT method: islow, ifast or float.
    #[arg(long, default_value_t = DctMethod::ISlow)]
    pub dct: DctMethod,
}

impl EncodeArgs {
    pub fn to_options(&self) -> EncodingOptions {
        EncodingOptions::new()
            .with_quality(self.quality)
            .with_subsampling(self.subsampling)
            .with_progressive_level(self.progressive)
            .with_optimize_coding(!self.no_optimize_coding)
            .with_adaptive_quantization(!self.no_adaptive_quantization)
            .with_standard_quant_tables(self.standard_quant_tables)
            .with_fancy_downsampling(self.fancy_downsampling)
            .with_dct_method(self.dct)
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_scale(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("bad dimension `{v}`: {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}
