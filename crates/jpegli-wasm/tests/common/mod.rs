//! Shared fixtures for the wasmtime tests: a small text-format module that
//! implements the codec ABI.
//!
//! The module reports every stream starting with `0xFF` as a 3x2 grayscale
//! image whose pixels are all 128, and encodes anything to the four bytes
//! `FF D8 FF D9`.

#![allow(dead_code)]

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

pub const CODEC_WAT: &str = r#"
(module
  (memory (export "memory") 2)
  (global $heap (mut i32) (i32.const 1024))

  (func $malloc (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap
      (i32.and
        (i32.add (i32.add (global.get $heap) (local.get $size)) (i32.const 15))
        (i32.const -16)))
    (local.get $ptr))

  (func (export "free") (param i32))

  (func (export "decode")
    (param $in i32) (param $len i32) (param $config_only i32)
    (param $w i32) (param $h i32) (param $cs i32) (param $chroma i32) (param $out i32)
    (param i32 i32 i32 i32 i32 i32)
    (result i32)
    (if (i32.eqz (local.get $len)) (then (return (i32.const 0))))
    (if (i32.ne (i32.load8_u (local.get $in)) (i32.const 0xff))
      (then (return (i32.const 0))))
    (i32.store (local.get $w) (i32.const 3))
    (i32.store (local.get $h) (i32.const 2))
    (i32.store (local.get $cs) (i32.const 1))
    (i32.store (local.get $chroma) (i32.const -1))
    (if (i32.eqz (local.get $config_only))
      (then (memory.fill (local.get $out) (i32.const 128) (i32.const 256))))
    (i32.const 1))

  (func (export "encode")
    (param $in i32) (param $w i32) (param $h i32) (param $cs i32) (param $chroma i32)
    (param $size i32)
    (param i32 i32 i32 i32 i32 i32 i32)
    (result i32)
    (local $out i32)
    (i64.store (local.get $size) (i64.const 4))
    (local.set $out (call $malloc (i32.const 4)))
    (i32.store (local.get $out) (i32.const 0xd9ffd8ff))
    (local.get $out)))
"#;

pub const SOI_EOI: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

/// The module above, gzip-compressed the way release builds ship it.
pub fn gzipped_module() -> Vec<u8> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(CODEC_WAT.as_bytes()).unwrap();
    gz.finish().unwrap()
}

pub fn gzipped_module_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".wasm.gz").tempfile().unwrap();
    file.write_all(&gzipped_module()).unwrap();
    file
}
