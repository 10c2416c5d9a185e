//! Codec handle and instance pool.
//!
//! A [`Codec`] owns one or more guests, each behind its own lock.  Every
//! logical operation (probe, decode, encode) takes exactly one guest for its
//! whole alloc/write/call/read/free sequence, so two operations never
//! interleave on the same linear memory.  Stream I/O and image flattening
//! happen outside the lock.
//!
//! The process-wide handle is created lazily through [`CodecCell`], which
//! runs the factory at most once even when many threads race on first use.
//! A factory failure is cached and every caller panics with the same message.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use std::time::Instant;

use image::DynamicImage;

use crate::config::{CodecConfig, ENV_MODULE};
use crate::decode::{self, Decoded};
use crate::encode::{self, Flattened};
use crate::error::{CodecError, Result};
use crate::geometry::ImageDescriptor;
use crate::guest::Guest;
use crate::options::{DecodingOptions, EncodingOptions};
use crate::raster::Image;
use crate::resource::{self, ModuleSource};
use crate::runtime::CodecModule;

/// Shared handle to a pool of codec instances.
pub struct Codec {
    slots: Vec<Mutex<Box<dyn Guest>>>,
    next: AtomicUsize,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("pool_size", &self.slots.len())
            .finish()
    }
}

impl Codec {
    /// Compile the module named by `config` and instantiate the pool.
    ///
    /// Without a configured path the module built in with the `embedded`
    /// feature is used.
    pub fn new(config: &CodecConfig) -> Result<Self> {
        let source = match &config.module {
            Some(path) => ModuleSource::Path(path.clone()),
            None => resource::embedded().ok_or_else(|| {
                CodecError::Setup(format!("no codec module configured (set {ENV_MODULE})"))
            })?,
        };
        Self::with_source(&source, config)
    }

    /// Like [`Codec::new`] but with an explicit module source, e.g. an
    /// image embedded with `include_bytes!`.
    pub fn with_source(source: &ModuleSource, config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        let module = CodecModule::load(source)?;
        let guests = (0..config.pool_size)
            .map(|_| {
                module
                    .instantiate(config)
                    .map(|guest| Box::new(guest) as Box<dyn Guest>)
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(source = %source.name(), pool_size = guests.len(), "codec pool ready");
        Self::from_guests(guests)
    }

    /// Build a pool from already instantiated guests.
    pub fn from_guests(guests: Vec<Box<dyn Guest>>) -> Result<Self> {
        if guests.is_empty() {
            return Err(CodecError::Config("codec pool needs at least one guest".into()));
        }
        Ok(Self {
            slots: guests.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    /// Image metadata from the first bytes of `reader`.
    pub fn describe<R: Read>(&self, reader: R) -> Result<ImageDescriptor> {
        let head = decode::read_probe(reader)?;
        self.with_guest(|g| decode::describe_bytes(g, &head, &DecodingOptions::default()))
    }

    /// Decode with default options.
    pub fn decode<R: Read>(&self, reader: R) -> Result<Decoded> {
        self.decode_with_options(reader, &DecodingOptions::default())
    }

    pub fn decode_with_options<R: Read>(&self, reader: R, opts: &DecodingOptions) -> Result<Decoded> {
        let data = decode::read_stream(reader)?;
        self.decode_bytes(&data, opts)
    }

    pub fn decode_bytes(&self, data: &[u8], opts: &DecodingOptions) -> Result<Decoded> {
        self.with_guest(|g| decode::decode_bytes(g, data, opts))
    }

    /// Encode `image` and write the compressed stream to `writer`.
    pub fn encode<W: Write>(
        &self,
        mut writer: W,
        image: &Image,
        opts: Option<&EncodingOptions>,
    ) -> Result<()> {
        let bytes = self.encode_to_vec(image, opts)?;
        writer.write_all(&bytes).map_err(CodecError::StreamWrite)
    }

    pub fn encode_dynamic<W: Write>(
        &self,
        mut writer: W,
        image: &DynamicImage,
        opts: Option<&EncodingOptions>,
    ) -> Result<()> {
        let opts = opts.cloned().unwrap_or_default().clamped();
        let flat = Flattened::from_dynamic(image, &opts);
        let bytes = self.with_guest(|g| encode::encode_flattened(g, &flat, &opts))?;
        writer.write_all(&bytes).map_err(CodecError::StreamWrite)
    }

    pub fn encode_to_vec(&self, image: &Image, opts: Option<&EncodingOptions>) -> Result<Vec<u8>> {
        let opts = opts.cloned().unwrap_or_default().clamped();
        let flat = Flattened::from_image(image, &opts)?;
        self.with_guest(|g| encode::encode_flattened(g, &flat, &opts))
    }

    /// Run `op` with exclusive access to one guest.
    ///
    /// The round-robin slot is tried first, then the others; if all are busy
    /// the caller waits on the round-robin slot.
    fn with_guest<T>(&self, op: impl FnOnce(&mut dyn Guest) -> Result<T>) -> Result<T> {
        let n = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;

        for i in 0..n {
            let idx = (start + i) % n;
            let guard = match self.slots[idx].try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(poisoned)) => {
                    tracing::warn!(slot = idx, "recovering poisoned codec slot");
                    poisoned.into_inner()
                }
            };
            return run_locked(guard, op);
        }

        let guard = self.slots[start].lock().unwrap_or_else(|poisoned| {
            tracing::warn!(slot = start, "recovering poisoned codec slot");
            poisoned.into_inner()
        });
        run_locked(guard, op)
    }
}

fn run_locked<T>(
    mut guard: MutexGuard<'_, Box<dyn Guest>>,
    op: impl FnOnce(&mut dyn Guest) -> Result<T>,
) -> Result<T> {
    op(&mut **guard)
}

// ---------------------------------------------------------------------------
// One-time initialization
// ---------------------------------------------------------------------------

/// Race-free, run-once holder for a [`Codec`].
pub struct CodecCell {
    cell: OnceLock<std::result::Result<Codec, String>>,
    inits: AtomicUsize,
}

impl CodecCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            inits: AtomicUsize::new(0),
        }
    }

    /// Return the codec, running `factory` if nobody has yet.
    ///
    /// Concurrent first callers block until the single factory run finishes.
    ///
    /// # Panics
    ///
    /// Panics if the factory failed, now or on an earlier call.
    pub fn get_or_init(&self, factory: impl FnOnce() -> Result<Codec>) -> &Codec {
        let slot = self.cell.get_or_init(|| {
            self.inits.fetch_add(1, Ordering::SeqCst);
            let started = Instant::now();
            match factory() {
                Ok(codec) => {
                    tracing::info!(
                        pool_size = codec.pool_size(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "codec initialized"
                    );
                    Ok(codec)
                }
                Err(err) => {
                    tracing::error!(error = %err, "codec initialization failed");
                    Err(err.to_string())
                }
            }
        });
        match slot {
            Ok(codec) => codec,
            Err(msg) => panic!("jpegli codec initialization failed: {msg}"),
        }
    }

    /// The codec, if it has been initialized successfully.
    pub fn get(&self) -> Option<&Codec> {
        self.cell.get().and_then(|slot| slot.as_ref().ok())
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of factory runs so far (0 or 1).
    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl Default for CodecCell {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: CodecCell = CodecCell::new();

/// The process-wide codec, configured from the environment on first use.
///
/// # Panics
///
/// Panics if the module cannot be loaded, compiled or instantiated.
pub fn global() -> &'static Codec {
    GLOBAL.get_or_init(|| CodecConfig::from_env().and_then(|config| Codec::new(&config)))
}

/// Make sure the process-wide codec exists.  Cheap after the first call.
pub fn ensure_ready() {
    global();
}

/// Create the process-wide codec from `config`.
///
/// Returns `false` (and leaves the existing codec alone) if it was already
/// created.
///
/// # Panics
///
/// Panics if this call creates the codec and creation fails.
pub fn init_with(config: CodecConfig) -> bool {
    install(|| Codec::new(&config))
}

/// Create the process-wide codec from an explicit module, e.g. a gzip image
/// linked in with `include_bytes!`.  Same contract as [`init_with`].
pub fn init_with_source(source: ModuleSource, config: CodecConfig) -> bool {
    install(|| Codec::with_source(&source, &config))
}

fn install(factory: impl FnOnce() -> Result<Codec>) -> bool {
    let mut installed = false;
    GLOBAL.get_or_init(|| {
        installed = true;
        factory()
    });
    installed
}
