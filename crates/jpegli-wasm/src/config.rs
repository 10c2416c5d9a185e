//! Codec configuration.
//!
//! [`CodecConfig`] says where the codec module lives and how the sandbox that
//! runs it is provisioned.  Defaults come from the [`Default`] impl, a
//! builder-style API customises individual fields, and the same struct can be
//! read from a TOML file or overridden from the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CodecError, Result};

/// Environment variable naming the codec module (`.wasm` or `.wasm.gz`).
pub const ENV_MODULE: &str = "JPEGLI_WASM";
/// Environment variable overriding [`CodecConfig::pool_size`].
pub const ENV_POOL_SIZE: &str = "JPEGLI_POOL_SIZE";
/// Environment variable overriding [`CodecConfig::max_memory`].
pub const ENV_MAX_MEMORY: &str = "JPEGLI_MAX_MEMORY";

/// Sandbox provisioning for the codec module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Path to the compiled codec module, optionally gzip-compressed.
    ///
    /// Default: **none** (must be supplied by file, env, or builder).
    pub module: Option<PathBuf>,

    /// Number of independently instantiated codec instances.
    ///
    /// One instance serialises every call behind a single lock; more
    /// instances let that many calls run at once, each with its own linear
    /// memory.
    ///
    /// Default: **1**.
    pub pool_size: usize,

    /// Maximum linear memory a single instance may grow to, in bytes.
    ///
    /// Default: **1 GiB**.
    pub max_memory: usize,

    /// Whether the module's stdout is wired to the host's stdout.
    ///
    /// Default: **true**.
    pub inherit_stdout: bool,

    /// Whether the module's stderr is wired to the host's stderr.
    ///
    /// Default: **true**.
    pub inherit_stderr: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            module: None,
            pool_size: 1,
            max_memory: 1024 * 1024 * 1024,
            inherit_stdout: true,
            inherit_stderr: true,
        }
    }
}

impl CodecConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CodecError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CodecError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Override fields from `JPEGLI_WASM`, `JPEGLI_POOL_SIZE` and
    /// `JPEGLI_MAX_MEMORY` when they are set.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Like [`CodecConfig::apply_env`] with variables looked up through `var`.
    pub fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = var(ENV_MODULE).filter(|v| !v.is_empty()) {
            self.module = Some(PathBuf::from(path));
        }
        if let Some(raw) = var(ENV_POOL_SIZE) {
            self.pool_size = raw
                .trim()
                .parse()
                .map_err(|e| CodecError::Config(format!("{ENV_POOL_SIZE}={raw}: {e}")))?;
        }
        if let Some(raw) = var(ENV_MAX_MEMORY) {
            self.max_memory = raw
                .trim()
                .parse()
                .map_err(|e| CodecError::Config(format!("{ENV_MAX_MEMORY}={raw}: {e}")))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values no sandbox could be provisioned with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CodecError::Config("pool_size must be at least 1".into()));
        }
        if self.max_memory < 64 * 1024 {
            return Err(CodecError::Config(format!(
                "max_memory {} is below one wasm page",
                self.max_memory
            )));
        }
        Ok(())
    }

    /// Set the codec module path.
    pub fn with_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.module = Some(path.into());
        self
    }

    /// Set the number of pooled instances.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the per-instance linear memory cap (in bytes).
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Wire (or detach) the module's stdout and stderr.
    pub fn with_inherit_stdio(mut self, inherit: bool) -> Self {
        self.inherit_stdout = inherit;
        self.inherit_stderr = inherit;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let cfg = CodecConfig::default();
        assert!(cfg.module.is_none());
        assert_eq!(cfg.pool_size, 1);
        assert_eq!(cfg.max_memory, 1024 * 1024 * 1024);
        assert!(cfg.inherit_stdout);
        assert!(cfg.inherit_stderr);
    }

    #[test]
    fn builder_chaining() {
        let cfg = CodecConfig::new()
            .with_module("/opt/jpegli.wasm.gz")
            .with_pool_size(4)
            .with_max_memory(256 * 1024 * 1024)
            .with_inherit_stdio(false);
        assert_eq!(cfg.module.as_deref(), Some(Path::new("/opt/jpegli.wasm.gz")));
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.max_memory, 256 * 1024 * 1024);
        assert!(!cfg.inherit_stdout);
        assert!(!cfg.inherit_stderr);
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let cfg = CodecConfig::from_toml_str("module = \"codec.wasm\"\npool_size = 3\n").unwrap();
        assert_eq!(cfg.module.as_deref(), Some(Path::new("codec.wasm")));
        assert_eq!(cfg.pool_size, 3);
        assert!(cfg.inherit_stderr);
    }

    #[test]
    fn parse_rejects_zero_pool() {
        let err = CodecConfig::from_toml_str("pool_size = 0").unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));
    }

    #[test]
    fn parse_rejects_bad_toml() {
        assert!(CodecConfig::from_toml_str("pool_size = \"many\"").is_err());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().expect("tempdir creation must succeed in tests");
        let path = tmp.path().join("codec.toml");
        std::fs::write(&path, "max_memory = 1048576\ninherit_stdout = false\n")
            .expect("write must succeed");
        let cfg = CodecConfig::load(&path).unwrap();
        assert_eq!(cfg.max_memory, 1_048_576);
        assert!(!cfg.inherit_stdout);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = CodecConfig::load(Path::new("/nonexistent/codec.toml")).unwrap_err();
        assert!(matches!(err, CodecError::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = CodecConfig::default()
            .apply_vars(vars(&[
                (ENV_MODULE, "/srv/jpegli.wasm"),
                (ENV_POOL_SIZE, " 2 "),
                (ENV_MAX_MEMORY, "8388608"),
            ]))
            .unwrap();
        assert_eq!(cfg.module.as_deref(), Some(Path::new("/srv/jpegli.wasm")));
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.max_memory, 8_388_608);
    }

    #[test]
    fn empty_module_var_is_ignored() {
        let cfg = CodecConfig::new()
            .with_module("keep.wasm")
            .apply_vars(vars(&[(ENV_MODULE, "")]))
            .unwrap();
        assert_eq!(cfg.module.as_deref(), Some(Path::new("keep.wasm")));
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let err = CodecConfig::default()
            .apply_vars(vars(&[(ENV_POOL_SIZE, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_POOL_SIZE));
    }
}
