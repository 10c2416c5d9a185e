//! The codec ABI as seen from the host.
//!
//! A [`Guest`] is one live instance of the codec module: four exported
//! functions plus raw access to its linear memory.  The marshalers in
//! [`crate::decode`] and [`crate::encode`] are written against this trait;
//! [`crate::runtime::WasmGuest`] is the wasmtime-backed implementation.
//!
//! Memory transfers report plain success flags, the same way the underlying
//! runtime does.  [`crate::memory`] turns them into typed errors.

use crate::error::Result;

/// Arguments of the `decode` export, in ABI order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCall {
    pub in_ptr: u32,
    pub in_len: u32,
    /// Non-zero: fill in the four metadata fields and stop.
    pub config_only: bool,
    pub width_ptr: u32,
    pub height_ptr: u32,
    pub colorspace_ptr: u32,
    pub chroma_ptr: u32,
    /// Output pixel buffer; zero during the metadata probe.
    pub out_ptr: u32,
    pub fancy_upsampling: bool,
    pub block_smoothing: bool,
    pub arith_coding: bool,
    pub dct_method: i32,
    pub target_width: u32,
    pub target_height: u32,
}

impl DecodeCall {
    /// Flatten to the 14 `i32` parameters the export takes.
    pub fn to_params(&self) -> [i32; 14] {
        [
            self.in_ptr as i32,
            self.in_len as i32,
            i32::from(self.config_only),
            self.width_ptr as i32,
            self.height_ptr as i32,
            self.colorspace_ptr as i32,
            self.chroma_ptr as i32,
            self.out_ptr as i32,
            i32::from(self.fancy_upsampling),
            i32::from(self.block_smoothing),
            i32::from(self.arith_coding),
            self.dct_method,
            self.target_width as i32,
            self.target_height as i32,
        ]
    }
}

/// Arguments of the `encode` export, in ABI order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeCall {
    pub in_ptr: u32,
    pub width: u32,
    pub height: u32,
    pub colorspace: u32,
    pub chroma: u32,
    /// Slot the codec writes the compressed size into (64-bit LE).
    pub size_ptr: u32,
    pub quality: i32,
    pub progressive_level: i32,
    pub optimize_coding: bool,
    pub adaptive_quantization: bool,
    pub standard_quant_tables: bool,
    pub fancy_downsampling: bool,
    pub dct_method: i32,
}

impl EncodeCall {
    /// Flatten to the 13 `i32` parameters the export takes.
    pub fn to_params(&self) -> [i32; 13] {
        [
            self.in_ptr as i32,
            self.width as i32,
            self.height as i32,
            self.colorspace as i32,
            self.chroma as i32,
            self.size_ptr as i32,
            self.quality,
            self.progressive_level,
            i32::from(self.optimize_coding),
            i32::from(self.adaptive_quantization),
            i32::from(self.standard_quant_tables),
            i32::from(self.fancy_downsampling),
            self.dct_method,
        ]
    }
}

/// One instance of the sandboxed codec.
///
/// Implementations are not expected to be reentrant: callers hold exclusive
/// access for a whole logical operation.
pub trait Guest: Send {
    /// `malloc(size) -> ptr`; a null pointer means the allocation failed.
    fn alloc(&mut self, size: u32) -> Result<u32>;

    /// `free(ptr)`.
    fn free(&mut self, ptr: u32) -> Result<()>;

    /// `decode(..) -> status`; zero is failure.
    fn decode(&mut self, call: &DecodeCall) -> Result<i32>;

    /// `encode(..) -> out_ptr`; the buffer belongs to the codec's allocator
    /// and must be released with [`Guest::free`].
    fn encode(&mut self, call: &EncodeCall) -> Result<u32>;

    /// Copy `len` bytes out of linear memory; `None` if out of range.
    fn read(&mut self, ptr: u32, len: u32) -> Option<Vec<u8>>;

    /// Copy `bytes` into linear memory; `false` if out of range.
    fn write(&mut self, ptr: u32, bytes: &[u8]) -> bool;
}

impl<G: Guest + ?Sized> Guest for Box<G> {
    fn alloc(&mut self, size: u32) -> Result<u32> {
        (**self).alloc(size)
    }

    fn free(&mut self, ptr: u32) -> Result<()> {
        (**self).free(ptr)
    }

    fn decode(&mut self, call: &DecodeCall) -> Result<i32> {
        (**self).decode(call)
    }

    fn encode(&mut self, call: &EncodeCall) -> Result<u32> {
        (**self).encode(call)
    }

    fn read(&mut self, ptr: u32, len: u32) -> Option<Vec<u8>> {
        (**self).read(ptr, len)
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> bool {
        (**self).write(ptr, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_params_follow_abi_order() {
        let call = DecodeCall {
            in_ptr: 100,
            in_len: 42,
            config_only: true,
            width_ptr: 200,
            height_ptr: 204,
            colorspace_ptr: 208,
            chroma_ptr: 212,
            out_ptr: 0,
            fancy_upsampling: true,
            block_smoothing: false,
            arith_coding: true,
            dct_method: 2,
            target_width: 64,
            target_height: 32,
        };
        assert_eq!(
            call.to_params(),
            [100, 42, 1, 200, 204, 208, 212, 0, 1, 0, 1, 2, 64, 32]
        );
    }

    #[test]
    fn encode_params_follow_abi_order() {
        let call = EncodeCall {
            in_ptr: 16,
            width: 3,
            height: 4,
            colorspace: 2,
            chroma: 2,
            size_ptr: 64,
            quality: 90,
            progressive_level: 1,
            optimize_coding: true,
            adaptive_quantization: false,
            standard_quant_tables: true,
            fancy_downsampling: false,
            dct_method: 1,
        };
        assert_eq!(
            call.to_params(),
            [16, 3, 4, 2, 2, 64, 90, 1, 1, 0, 1, 0, 1]
        );
    }
}
