//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use jpegli_wasm::config::ENV_MODULE;
use jpegli_wasm::resource;
use jpegli_wasm::task::{decode_async, describe_async, encode_async};
use jpegli_wasm::{Codec, CodecConfig, DecodingOptions, EncodingOptions, Image, ImageDescriptor};
use tracing::info;

/// Resolve the codec settings: config file (or defaults), then environment,
/// then `--module`.
pub fn load_config(path: Option<&Path>, module: Option<&Path>) -> Result<CodecConfig> {
    load_config_with(path, module, |key| std::env::var(key).ok())
}

/// [`load_config`] with environment lookups going through `var`.
pub fn load_config_with(
    path: Option<&Path>,
    module: Option<&Path>,
    var: impl Fn(&str) -> Option<String>,
) -> Result<CodecConfig> {
    let config = match path {
        Some(path) => CodecConfig::load(path)
            .and_then(|config| config.apply_vars(&var))
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CodecConfig::default()
            .apply_vars(&var)
            .context("invalid codec settings in environment")?,
    };
    let config = match module {
        Some(module) => config.with_module(module),
        None => config,
    };
    if config.module.is_none() && resource::embedded().is_none() {
        bail!("no codec module configured: pass --module or set {ENV_MODULE}");
    }
    Ok(config)
}

/// Compile and instantiate the codec off the async reactor.
pub async fn open_codec(config: CodecConfig) -> Result<Arc<Codec>> {
    let codec = tokio::task::spawn_blocking(move || Codec::new(&config))
        .await
        .context("codec setup task failed")?
        .context("failed to set up codec")?;
    Ok(Arc::new(codec))
}

pub async fn cmd_info(codec: Arc<Codec>, input: &Path, json: bool) -> Result<()> {
    let data = read_input(input).await?;
    let desc = describe_async(codec, data)
        .await
        .with_context(|| format!("failed to probe {}", input.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&desc)?);
    } else {
        println!("{}: {}", input.display(), summary(&desc));
    }
    Ok(())
}

pub async fn cmd_decode(
    codec: Arc<Codec>,
    input: &Path,
    output: &Path,
    opts: DecodingOptions,
) -> Result<()> {
    let started = Instant::now();
    let data = read_input(input).await?;
    let decoded = decode_async(codec, data, opts)
        .await
        .with_context(|| format!("failed to decode {}", input.display()))?;
    info!(
        input = %input.display(),
        image = %summary(&decoded.descriptor),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "decoded"
    );

    let target = output.to_path_buf();
    tokio::task::spawn_blocking(move || decoded.image.to_dynamic().save(&target))
        .await
        .context("save task failed")?
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

pub async fn cmd_encode(
    codec: Arc<Codec>,
    input: &Path,
    output: &Path,
    opts: EncodingOptions,
) -> Result<()> {
    let started = Instant::now();
    let source: PathBuf = input.to_path_buf();
    let image = tokio::task::spawn_blocking(move || image::open(&source))
        .await
        .context("load task failed")?
        .with_context(|| format!("failed to read image {}", input.display()))?;
    let image = Image::from_dynamic(image);

    let bytes = encode_async(codec, image, opts)
        .await
        .with_context(|| format!("failed to encode {}", input.display()))?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        output = %output.display(),
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "encoded"
    );
    Ok(())
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn summary(desc: &ImageDescriptor) -> String {
    let chroma = desc
        .chroma
        .map(|ratio| format!(" {ratio}"))
        .unwrap_or_default();
    format!(
        "{}x{} {:?}{chroma}",
        desc.width, desc.height, desc.colorspace
    )
}
