//! Sandbox runtime.
//!
//! [`CodecModule`] owns the wasmtime [`Engine`] and the compiled codec
//! [`Module`]; each call to [`CodecModule::instantiate`] produces an
//! independent [`WasmGuest`] with its own store and linear memory.  The guest
//! is linked against the WASI preview-1 shim because the codec is built for
//! `wasm32-wasi`; only stdout and stderr are wired through, for diagnostics.

use std::time::Instant;

use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder, TypedFunc};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::guest::{DecodeCall, EncodeCall, Guest};
use crate::resource::{ModuleSource, load_module_bytes};

type DecodeParams = (i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32);
type EncodeParams = (i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32);

/// State stored in every guest's wasmtime [`Store`].
struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// A compiled codec module, ready to be instantiated.
pub struct CodecModule {
    engine: Engine,
    module: Module,
}

impl CodecModule {
    /// Load, unpack and compile the module behind `source`.
    pub fn load(source: &ModuleSource) -> Result<Self> {
        let bytes = load_module_bytes(source)?;
        let engine = new_engine()?;
        let module = compile(&engine, &bytes)?;
        Ok(Self { engine, module })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Create a fresh instance with its own linear memory.
    pub fn instantiate(&self, config: &CodecConfig) -> Result<WasmGuest> {
        WasmGuest::instantiate(&self.engine, &self.module, config)
    }
}

/// Build the engine used for codec modules.
pub fn new_engine() -> Result<Engine> {
    let mut wasm_config = wasmtime::Config::new();
    wasm_config.wasm_memory64(false);
    Engine::new(&wasm_config).map_err(|e| CodecError::Setup(format!("failed to create wasm engine: {e}")))
}

/// Compile module bytes (binary or text format).
pub fn compile(engine: &Engine, bytes: &[u8]) -> Result<Module> {
    let started = Instant::now();
    let module = Module::new(engine, bytes).map_err(|e| CodecError::Setup(format!("compile: {e:#}")))?;
    tracing::info!(
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "codec module compiled"
    );
    Ok(module)
}

/// One wasmtime instance of the codec.
pub struct WasmGuest {
    store: Store<HostState>,
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    decode: TypedFunc<DecodeParams, i32>,
    encode: TypedFunc<EncodeParams, i32>,
}

impl WasmGuest {
    /// Instantiate `module` and resolve the codec exports.
    pub fn instantiate(engine: &Engine, module: &Module, config: &CodecConfig) -> Result<Self> {
        let started = Instant::now();

        let mut linker: Linker<HostState> = Linker::new(engine);
        preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| &mut state.wasi)
            .map_err(|e| CodecError::Setup(format!("link wasi: {e:#}")))?;

        let mut wasi = WasiCtxBuilder::new();
        if config.inherit_stdout {
            wasi.inherit_stdout();
        }
        if config.inherit_stderr {
            wasi.inherit_stderr();
        }
        let state = HostState {
            wasi: wasi.build_p1(),
            limits: StoreLimitsBuilder::new().memory_size(config.max_memory).build(),
        };
        let mut store = Store::new(engine, state);
        store.limiter(|state| &mut state.limits);

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| CodecError::Setup(format!("instantiate: {e:#}")))?;

        // Reactor modules need their constructors run before any export.
        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, "_initialize") {
            init.call(&mut store, ())
                .map_err(|e| CodecError::Setup(format!("_initialize: {e:#}")))?;
        }

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| CodecError::Setup("module does not export `memory`".into()))?;
        let malloc = typed(&instance, &mut store, "malloc")?;
        let free = typed(&instance, &mut store, "free")?;
        let decode = typed(&instance, &mut store, "decode")?;
        let encode = typed(&instance, &mut store, "encode")?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            max_memory = config.max_memory,
            "codec instance ready"
        );

        Ok(Self {
            store,
            memory,
            malloc,
            free,
            decode,
            encode,
        })
    }

    /// Current size of the instance's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}

fn typed<P, R>(instance: &Instance, store: &mut Store<HostState>, name: &str) -> Result<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|e| CodecError::Setup(format!("export `{name}`: {e:#}")))
}

fn call_failed(export: &'static str, err: wasmtime::Error) -> CodecError {
    CodecError::Call {
        export,
        reason: format!("{err:#}"),
    }
}

impl Guest for WasmGuest {
    fn alloc(&mut self, size: u32) -> Result<u32> {
        let ptr = self
            .malloc
            .call(&mut self.store, size as i32)
            .map_err(|e| call_failed("malloc", e))?;
        Ok(ptr as u32)
    }

    fn free(&mut self, ptr: u32) -> Result<()> {
        self.free
            .call(&mut self.store, ptr as i32)
            .map_err(|e| call_failed("free", e))
    }

    fn decode(&mut self, call: &DecodeCall) -> Result<i32> {
        let p = call.to_params();
        let params = (
            p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8], p[9], p[10], p[11], p[12], p[13],
        );
        self.decode
            .call(&mut self.store, params)
            .map_err(|e| call_failed("decode", e))
    }

    fn encode(&mut self, call: &EncodeCall) -> Result<u32> {
        let p = call.to_params();
        let params = (
            p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8], p[9], p[10], p[11], p[12],
        );
        let ptr = self
            .encode
            .call(&mut self.store, params)
            .map_err(|e| call_failed("encode", e))?;
        Ok(ptr as u32)
    }

    fn read(&mut self, ptr: u32, len: u32) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.memory
            .read(&self.store, ptr as usize, &mut buf)
            .ok()
            .map(|()| buf)
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> bool {
        self.memory.write(&mut self.store, ptr as usize, bytes).is_ok()
    }
}
