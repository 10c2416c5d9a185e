//! In-process stand-in for the codec module, used by unit tests.
//!
//! [`FakeCodec`] implements the four-export ABI over a plain `Vec<u8>` linear
//! memory with a bump allocator.  Its "compressed" format is a small header
//! followed by the raw pixel run exactly as it crossed the boundary, which is
//! enough to check every marshaling step end to end.  Allocation counters
//! and fault switches let tests verify resource hygiene on error paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CodecError, Result};
use crate::geometry::{ChromaSubsampling, ColorSpace, PlaneLayout, align};
use crate::guest::{DecodeCall, EncodeCall, Guest};

const MAGIC: &[u8; 4] = b"FJPG";
const HEADER_LEN: usize = 4 + 5 * 4;
const HEAP_BASE: u32 = 1024;

/// Call counters, shareable across threads.
#[derive(Debug, Default)]
pub(crate) struct FakeStats {
    allocs: AtomicUsize,
    frees: AtomicUsize,
    decode_calls: AtomicUsize,
    encode_calls: AtomicUsize,
    decode_log: Mutex<Vec<DecodeCall>>,
}

impl FakeStats {
    pub(crate) fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub(crate) fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub(crate) fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    /// Every `decode` call received, in order.
    pub(crate) fn decode_log(&self) -> Vec<DecodeCall> {
        self.decode_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Fault switches.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub null_alloc: bool,
    pub fail_write: bool,
    pub fail_read: bool,
    pub fail_free: bool,
    /// Fail only the pixel-producing decode call, not the probe.
    pub fail_full_decode: bool,
    /// Report this colorspace tag instead of the stream's.
    pub colorspace_tag: Option<u32>,
    pub zero_encode_size: bool,
    pub trap_encode: bool,
}

pub(crate) struct FakeCodec {
    memory: Vec<u8>,
    heap: u32,
    live: HashMap<u32, u32>,
    stats: Arc<FakeStats>,
    faults: Faults,
}

impl FakeCodec {
    pub(crate) fn new() -> Self {
        Self {
            memory: vec![0; 64 * 1024],
            heap: HEAP_BASE,
            live: HashMap::new(),
            stats: Arc::new(FakeStats::default()),
            faults: Faults::default(),
        }
    }

    pub(crate) fn stats(&self) -> &FakeStats {
        &self.stats
    }

    pub(crate) fn stats_handle(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub(crate) fn live_allocations(&self) -> usize {
        self.live.len()
    }

    fn range(&self, ptr: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = ptr as usize;
        let end = start.checked_add(len)?;
        (end <= self.memory.len()).then_some(start..end)
    }

    // Codec-internal memory access; fault switches only affect the host side.
    fn load(&self, ptr: u32, len: usize) -> Option<Vec<u8>> {
        let range = self.range(ptr, len)?;
        Some(self.memory[range].to_vec())
    }

    fn store(&mut self, ptr: u32, bytes: &[u8]) -> bool {
        match self.range(ptr, bytes.len()) {
            Some(range) => {
                self.memory[range].copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    fn store_u32(&mut self, ptr: u32, value: u32) -> bool {
        self.store(ptr, &value.to_le_bytes())
    }
}

/// Build a stream in the fake codec's format.
pub(crate) fn fake_stream(
    width: u32,
    height: u32,
    colorspace: u32,
    chroma: u32,
    quality: i32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    for field in [width, height, colorspace, chroma, quality as u32] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(payload);
    out
}

/// Parsed header of a fake stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakeHeader {
    pub width: u32,
    pub height: u32,
    pub colorspace: u32,
    pub chroma: u32,
    pub quality: i32,
}

pub(crate) fn parse_fake_stream(stream: &[u8]) -> Option<(FakeHeader, &[u8])> {
    if stream.len() < HEADER_LEN || &stream[..4] != MAGIC {
        return None;
    }
    let field = |i: usize| {
        let at = 4 + i * 4;
        u32::from_le_bytes([stream[at], stream[at + 1], stream[at + 2], stream[at + 3]])
    };
    let header = FakeHeader {
        width: field(0),
        height: field(1),
        colorspace: field(2),
        chroma: field(3),
        quality: field(4) as i32,
    };
    Some((header, &stream[HEADER_LEN..]))
}

/// Bytes the codec expects for an encode input of this shape.
fn input_len(width: u32, height: u32, colorspace: u32, chroma: u32) -> Option<usize> {
    let (w, h) = (width as usize, height as usize);
    match ColorSpace::from_tag(colorspace).ok()? {
        ColorSpace::Grayscale => Some(w * h),
        ColorSpace::Rgb | ColorSpace::Cmyk => Some(w * h * 4),
        ColorSpace::YCbCr => {
            let ratio = ChromaSubsampling::from_tag(chroma).ok()?;
            Some(PlaneLayout::ycbcr(w, h, ratio).total())
        }
        ColorSpace::Ycck => None,
    }
}

impl Guest for FakeCodec {
    fn alloc(&mut self, size: u32) -> Result<u32> {
        if self.faults.null_alloc {
            return Ok(0);
        }
        let ptr = self.heap;
        self.heap += align(size.max(1) as usize) as u32;
        if self.memory.len() < self.heap as usize {
            self.memory.resize(self.heap as usize * 2, 0);
        }
        self.live.insert(ptr, size);
        self.stats.allocs.fetch_add(1, Ordering::SeqCst);
        Ok(ptr)
    }

    fn free(&mut self, ptr: u32) -> Result<()> {
        if self.faults.fail_free {
            return Err(CodecError::Call {
                export: "free",
                reason: "injected".into(),
            });
        }
        if ptr == 0 {
            return Ok(());
        }
        if self.live.remove(&ptr).is_none() {
            return Err(CodecError::Call {
                export: "free",
                reason: format!("free of unknown pointer {ptr:#x}"),
            });
        }
        self.stats.frees.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn decode(&mut self, call: &DecodeCall) -> Result<i32> {
        self.stats.decode_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .decode_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(*call);
        let Some(input) = self.load(call.in_ptr, call.in_len as usize) else {
            return Ok(0);
        };
        let Some((header, payload)) = parse_fake_stream(&input) else {
            return Ok(0);
        };
        let colorspace = self.faults.colorspace_tag.unwrap_or(header.colorspace);
        let chroma = if colorspace == ColorSpace::YCbCr.tag() {
            header.chroma
        } else {
            u32::MAX
        };
        let stored = self.store_u32(call.width_ptr, header.width)
            && self.store_u32(call.height_ptr, header.height)
            && self.store_u32(call.colorspace_ptr, colorspace)
            && self.store_u32(call.chroma_ptr, chroma);
        if !stored {
            return Ok(0);
        }
        if call.config_only {
            return Ok(1);
        }
        if self.faults.fail_full_decode || call.out_ptr == 0 {
            return Ok(0);
        }
        let payload = payload.to_vec();
        Ok(i32::from(self.store(call.out_ptr, &payload)))
    }

    fn encode(&mut self, call: &EncodeCall) -> Result<u32> {
        self.stats.encode_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.trap_encode {
            return Err(CodecError::Call {
                export: "encode",
                reason: "unreachable".into(),
            });
        }
        let zero = 0u64.to_le_bytes();
        let Some(len) = input_len(call.width, call.height, call.colorspace, call.chroma) else {
            self.store(call.size_ptr, &zero);
            return Ok(0);
        };
        let Some(input) = self.load(call.in_ptr, len) else {
            self.store(call.size_ptr, &zero);
            return Ok(0);
        };
        let chroma = if call.colorspace == ColorSpace::YCbCr.tag() {
            call.chroma
        } else {
            u32::MAX
        };
        let stream = fake_stream(
            call.width,
            call.height,
            call.colorspace,
            chroma,
            call.quality,
            &input,
        );
        let out = self.alloc(stream.len() as u32)?;
        self.store(out, &stream);
        let size = if self.faults.zero_encode_size {
            0
        } else {
            stream.len() as u64
        };
        self.store(call.size_ptr, &size.to_le_bytes());
        Ok(out)
    }

    fn read(&mut self, ptr: u32, len: u32) -> Option<Vec<u8>> {
        if self.faults.fail_read {
            return None;
        }
        self.load(ptr, len as usize)
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> bool {
        !self.faults.fail_write && self.store(ptr, bytes)
    }
}
