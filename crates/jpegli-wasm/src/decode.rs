//! Decode marshaler.
//!
//! Both phases share one skeleton: copy the compressed bytes into the
//! sandbox, run the metadata probe into a 16-byte field block, and (unless
//! only the descriptor was asked for) size an output buffer from the
//! descriptor and run the full decode into it.  Every buffer is scoped, so
//! nothing outlives the call that allocated it.

use std::io::Read;

use crate::error::{CodecError, Result};
use crate::geometry::{ImageDescriptor, OutputLayout};
use crate::guest::{DecodeCall, Guest};
use crate::memory::{self, LinearBuffer, with_buffer};
use crate::options::DecodingOptions;
use crate::raster::Image;

/// Bytes read from the stream for a metadata-only probe.
pub const PROBE_LEN: usize = 1024;

/// Width, height, colorspace and chroma tag, 4 bytes each.
const META_LEN: usize = 16;

/// A fully decoded image together with the metadata the probe reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub descriptor: ImageDescriptor,
    pub image: Image,
}

/// Report the image metadata using only the head of `reader`.
pub fn describe<G, R>(guest: &mut G, reader: R) -> Result<ImageDescriptor>
where
    G: Guest + ?Sized,
    R: Read,
{
    let head = read_probe(reader)?;
    describe_bytes(guest, &head, &DecodingOptions::default())
}

/// Read all of `reader` and decode it.
pub fn decode<G, R>(guest: &mut G, reader: R, opts: &DecodingOptions) -> Result<Decoded>
where
    G: Guest + ?Sized,
    R: Read,
{
    let data = read_stream(reader)?;
    decode_bytes(guest, &data, opts)
}

/// The first [`PROBE_LEN`] bytes of `reader`.
pub fn read_probe<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(PROBE_LEN);
    reader
        .take(PROBE_LEN as u64)
        .read_to_end(&mut head)
        .map_err(CodecError::StreamRead)?;
    Ok(head)
}

/// All of `reader`.
pub fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(CodecError::StreamRead)?;
    Ok(data)
}

/// Metadata probe over an in-memory stream.
pub fn describe_bytes<G: Guest + ?Sized>(
    guest: &mut G,
    data: &[u8],
    opts: &DecodingOptions,
) -> Result<ImageDescriptor> {
    let (descriptor, _) = run(guest, data, opts, true)?;
    Ok(descriptor)
}

/// Full decode of an in-memory stream.
pub fn decode_bytes<G: Guest + ?Sized>(
    guest: &mut G,
    data: &[u8],
    opts: &DecodingOptions,
) -> Result<Decoded> {
    let (descriptor, output) = run(guest, data, opts, false)?;
    let (layout, raw) = output.ok_or(CodecError::DecodeFailed)?;
    let image = layout.assemble(raw)?;
    tracing::debug!(
        width = descriptor.width,
        height = descriptor.height,
        colorspace = ?descriptor.colorspace,
        chroma = ?descriptor.chroma,
        input_bytes = data.len(),
        "decoded image"
    );
    Ok(Decoded { descriptor, image })
}

type RawOutput = Option<(OutputLayout, Vec<u8>)>;

fn run<G: Guest + ?Sized>(
    guest: &mut G,
    data: &[u8],
    opts: &DecodingOptions,
    config_only: bool,
) -> Result<(ImageDescriptor, RawOutput)> {
    if data.is_empty() {
        return Err(CodecError::DecodeFailed);
    }

    with_buffer(guest, "decode/input", data.len(), |g, input| {
        memory::write(g, "decode/input", input, data)?;

        with_buffer(g, "decode/meta", META_LEN, |g, meta| {
            memory::write(g, "decode/meta", meta, &[0; META_LEN])?;

            let (target_width, target_height) = opts.scale_target.unwrap_or((0, 0));
            let mut call = DecodeCall {
                in_ptr: input.ptr(),
                in_len: input.len() as u32,
                config_only: true,
                width_ptr: meta.at(0),
                height_ptr: meta.at(4),
                colorspace_ptr: meta.at(8),
                chroma_ptr: meta.at(12),
                out_ptr: 0,
                fancy_upsampling: opts.fancy_upsampling,
                block_smoothing: opts.block_smoothing,
                arith_coding: opts.arith_coding,
                dct_method: opts.dct_method.tag(),
                target_width,
                target_height,
            };
            if g.decode(&call)? == 0 {
                return Err(CodecError::DecodeFailed);
            }
            let descriptor = read_descriptor(g, meta)?;
            if config_only {
                return Ok((descriptor, None));
            }
            if descriptor.width == 0 || descriptor.height == 0 {
                return Err(CodecError::layout(format!(
                    "codec reported an empty {}x{} image",
                    descriptor.width, descriptor.height
                )));
            }

            let layout = OutputLayout::for_descriptor(&descriptor)?;
            let size = layout.size();
            let raw = with_buffer(g, "decode/output", size, |g, out| {
                call.config_only = false;
                call.out_ptr = out.ptr();
                if g.decode(&call)? == 0 {
                    return Err(CodecError::DecodeFailed);
                }
                memory::read(g, "decode/output", out, size)
            })?;
            Ok((descriptor, Some((layout, raw))))
        })
    })
}

fn read_descriptor<G: Guest + ?Sized>(guest: &mut G, meta: LinearBuffer) -> Result<ImageDescriptor> {
    let width = memory::read_u32_le(guest, "decode/meta", meta, 0)?;
    let height = memory::read_u32_le(guest, "decode/meta", meta, 4)?;
    let colorspace = memory::read_u32_le(guest, "decode/meta", meta, 8)?;
    let chroma = memory::read_u32_le(guest, "decode/meta", meta, 12)?;
    ImageDescriptor::from_raw(width, height, colorspace, chroma)
}
