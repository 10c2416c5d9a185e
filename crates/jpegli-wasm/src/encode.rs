//! Encode marshaler.
//!
//! A host image is first flattened into the single byte run the codec reads,
//! together with the colorspace and chroma tags that describe it.  The run is
//! copied into the sandbox, `encode` is called with a zeroed 8-byte size
//! slot, and the codec-allocated output is copied out and released.

use std::borrow::Cow;
use std::io::Write;

use image::DynamicImage;

use crate::error::{CodecError, Result};
use crate::geometry::{ChromaSubsampling, ColorSpace, PlaneLayout};
use crate::guest::{EncodeCall, Guest};
use crate::memory::{self, adopt, with_buffer};
use crate::options::EncodingOptions;
use crate::raster::Image;

const SIZE_SLOT_LEN: usize = 8;

/// Chroma tag passed for sources without chroma planes.
const NO_CHROMA: u32 = 0;

/// The pixel run and tags handed to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened<'a> {
    pub width: u32,
    pub height: u32,
    pub colorspace: ColorSpace,
    pub chroma: u32,
    pub data: Cow<'a, [u8]>,
}

impl<'a> Flattened<'a> {
    /// Pick the colorspace, chroma tag and byte run for `image`.
    ///
    /// Gray, RGBA and CMYK buffers are borrowed as they are.  YCbCr planes
    /// are repacked to the codec's aligned layout; ratios the encoder cannot
    /// take (4:1:1, 4:1:0) go through RGBA instead.
    pub fn from_image(image: &'a Image, opts: &EncodingOptions) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let requested = opts.subsampling.tag();
        let flat = match image {
            Image::Gray(img) => Self::new(width, height, ColorSpace::Grayscale, NO_CHROMA, img.as_raw().as_slice()),
            Image::Rgba(img) => Self::new(width, height, ColorSpace::Rgb, requested, img.as_raw().as_slice()),
            Image::Cmyk(img) => Self::new(width, height, ColorSpace::Cmyk, NO_CHROMA, img.as_raw()),
            Image::YCbCr(img) => match img.ratio() {
                ChromaSubsampling::Ratio411 | ChromaSubsampling::Ratio410 => Self::new(
                    width,
                    height,
                    ColorSpace::Rgb,
                    requested,
                    img.to_rgba().into_raw(),
                ),
                ratio => {
                    let planes = PlaneLayout::ycbcr(width as usize, height as usize, ratio);
                    Self::new(width, height, ColorSpace::YCbCr, ratio.tag(), planes.pack(img)?)
                }
            },
        };
        Ok(flat)
    }

    /// Same dispatch for the `image` crate's dynamic images.  Anything that is
    /// not 8-bit gray or RGBA is converted to RGBA first.
    pub fn from_dynamic(image: &'a DynamicImage, opts: &EncodingOptions) -> Self {
        let (width, height) = (image.width(), image.height());
        let requested = opts.subsampling.tag();
        match image {
            DynamicImage::ImageLuma8(img) => {
                Self::new(width, height, ColorSpace::Grayscale, NO_CHROMA, img.as_raw().as_slice())
            }
            DynamicImage::ImageRgba8(img) => {
                Self::new(width, height, ColorSpace::Rgb, requested, img.as_raw().as_slice())
            }
            other => Self::new(width, height, ColorSpace::Rgb, requested, other.to_rgba8().into_raw()),
        }
    }

    fn new(
        width: u32,
        height: u32,
        colorspace: ColorSpace,
        chroma: u32,
        data: impl Into<Cow<'a, [u8]>>,
    ) -> Self {
        Self {
            width,
            height,
            colorspace,
            chroma,
            data: data.into(),
        }
    }
}

/// Encode `image` and write the compressed stream to `writer`.
pub fn encode<G, W>(
    guest: &mut G,
    mut writer: W,
    image: &Image,
    opts: Option<&EncodingOptions>,
) -> Result<()>
where
    G: Guest + ?Sized,
    W: Write,
{
    let bytes = encode_to_vec(guest, image, opts)?;
    writer.write_all(&bytes).map_err(CodecError::StreamWrite)
}

/// Encode `image` into an owned buffer.
pub fn encode_to_vec<G: Guest + ?Sized>(
    guest: &mut G,
    image: &Image,
    opts: Option<&EncodingOptions>,
) -> Result<Vec<u8>> {
    let opts = opts.cloned().unwrap_or_default().clamped();
    let flat = Flattened::from_image(image, &opts)?;
    encode_flattened(guest, &flat, &opts)
}

/// Encode a [`DynamicImage`] and write the compressed stream to `writer`.
pub fn encode_dynamic<G, W>(
    guest: &mut G,
    mut writer: W,
    image: &DynamicImage,
    opts: Option<&EncodingOptions>,
) -> Result<()>
where
    G: Guest + ?Sized,
    W: Write,
{
    let opts = opts.cloned().unwrap_or_default().clamped();
    let flat = Flattened::from_dynamic(image, &opts);
    let bytes = encode_flattened(guest, &flat, &opts)?;
    writer.write_all(&bytes).map_err(CodecError::StreamWrite)
}

/// Run the codec over an already flattened image.  Options are clamped
/// before they cross the boundary.
pub fn encode_flattened<G: Guest + ?Sized>(
    guest: &mut G,
    flat: &Flattened<'_>,
    opts: &EncodingOptions,
) -> Result<Vec<u8>> {
    if flat.width == 0 || flat.height == 0 {
        return Err(CodecError::invalid_image(format!(
            "cannot encode an empty {}x{} image",
            flat.width, flat.height
        )));
    }
    let opts = opts.clamped();

    let out = with_buffer(guest, "encode/input", flat.data.len(), |g, input| {
        memory::write(g, "encode/input", input, &flat.data)?;

        with_buffer(g, "encode/size", SIZE_SLOT_LEN, |g, slot| {
            memory::write(g, "encode/size", slot, &[0; SIZE_SLOT_LEN])?;

            let call = EncodeCall {
                in_ptr: input.ptr(),
                width: flat.width,
                height: flat.height,
                colorspace: flat.colorspace.tag(),
                chroma: flat.chroma,
                size_ptr: slot.ptr(),
                quality: opts.quality,
                progressive_level: opts.progressive_level,
                optimize_coding: opts.optimize_coding,
                adaptive_quantization: opts.adaptive_quantization,
                standard_quant_tables: opts.standard_quant_tables,
                fancy_downsampling: opts.fancy_downsampling,
                dct_method: opts.dct_method.tag(),
            };
            let out_ptr = g.encode(&call)?;

            adopt(g, "encode/output", out_ptr, |g, out| {
                let size = memory::read_u64_le(g, "encode/size", slot, 0)?;
                if size == 0 || out.ptr() == 0 {
                    return Err(CodecError::EncodeFailed);
                }
                let len = usize::try_from(size)
                    .map_err(|_| CodecError::layout(format!("encoded size {size} exceeds host range")))?;
                memory::read(g, "encode/output", out.assume_len(len), len)
            })
        })
    })?;

    tracing::debug!(
        width = flat.width,
        height = flat.height,
        colorspace = ?flat.colorspace,
        quality = opts.quality,
        output_bytes = out.len(),
        "encoded image"
    );
    Ok(out)
}
