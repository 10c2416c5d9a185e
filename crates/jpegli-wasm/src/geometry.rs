//! Colorspace and buffer geometry rules.
//!
//! The codec sizes its intermediate buffers from dimensions rounded up to
//! [`ALIGN`], while host images keep their exact dimensions.  Everything that
//! converts between the two views lives here as pure functions: tag decoding,
//! chroma plane sizes, the decode output size per colorspace, and the
//! (bounds-checked) slicing of a raw output buffer into typed planes.

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::raster::{CmykImage, Image, YCbCrImage};

/// Alignment boundary for codec-side buffer dimensions.
pub const ALIGN: usize = 16;

/// Round `n` up to the next multiple of [`ALIGN`].
pub const fn align(n: usize) -> usize {
    (n + (ALIGN - 1)) & !(ALIGN - 1)
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Colorspace tag reported by (and passed to) the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Grayscale = 1,
    Rgb = 2,
    YCbCr = 3,
    Cmyk = 4,
    Ycck = 5,
}

impl ColorSpace {
    /// Decode a raw tag, rejecting anything outside the five known values.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Grayscale),
            2 => Ok(Self::Rgb),
            3 => Ok(Self::YCbCr),
            4 => Ok(Self::Cmyk),
            5 => Ok(Self::Ycck),
            other => Err(CodecError::UnsupportedColorspace(other)),
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Host color model a decoded image of this colorspace uses.
    pub fn color_model(self) -> ColorModel {
        match self {
            Self::Grayscale => ColorModel::Gray,
            Self::Rgb => ColorModel::Rgba,
            Self::YCbCr => ColorModel::YCbCr,
            Self::Cmyk | Self::Ycck => ColorModel::Cmyk,
        }
    }
}

/// Host-side pixel representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    Gray,
    Rgba,
    Cmyk,
    YCbCr,
}

/// Chroma subsampling family, tagged the way the codec numbers them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    #[serde(rename = "444")]
    Ratio444 = 0,
    #[serde(rename = "422")]
    Ratio422 = 1,
    #[default]
    #[serde(rename = "420")]
    Ratio420 = 2,
    #[serde(rename = "440")]
    Ratio440 = 3,
    #[serde(rename = "411")]
    Ratio411 = 4,
    #[serde(rename = "410")]
    Ratio410 = 5,
}

impl ChromaSubsampling {
    pub const ALL: [Self; 6] = [
        Self::Ratio444,
        Self::Ratio422,
        Self::Ratio420,
        Self::Ratio440,
        Self::Ratio411,
        Self::Ratio410,
    ];

    pub fn from_tag(tag: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.tag() == tag)
            .ok_or(CodecError::UnsupportedSubsampling(tag))
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Horizontal and vertical divisors of the chroma planes.
    pub fn divisors(self) -> (usize, usize) {
        match self {
            Self::Ratio444 => (1, 1),
            Self::Ratio422 => (2, 1),
            Self::Ratio420 => (2, 2),
            Self::Ratio440 => (1, 2),
            Self::Ratio411 => (4, 1),
            Self::Ratio410 => (4, 2),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ratio444 => "444",
            Self::Ratio422 => "422",
            Self::Ratio420 => "420",
            Self::Ratio440 => "440",
            Self::Ratio411 => "411",
            Self::Ratio410 => "410",
        }
    }
}

impl fmt::Display for ChromaSubsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChromaSubsampling {
    type Err = String;

    /// Accepts `420` as well as `4:2:0`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        Self::ALL
            .into_iter()
            .find(|r| r.label() == digits)
            .ok_or_else(|| format!("unknown chroma subsampling `{s}` (expected 444|422|420|440|411|410)"))
    }
}

/// Chroma plane size for a `width` x `height` image anchored at the origin.
pub fn chroma_size(width: usize, height: usize, ratio: ChromaSubsampling) -> (usize, usize) {
    let (dx, dy) = ratio.divisors();
    (width.div_ceil(dx), height.div_ceil(dy))
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Image metadata reported by the decode probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub colorspace: ColorSpace,
    /// Only meaningful (and only present) for [`ColorSpace::YCbCr`].
    pub chroma: Option<ChromaSubsampling>,
}

impl ImageDescriptor {
    /// Build a descriptor from the four raw fields the codec writes.
    pub fn from_raw(width: u32, height: u32, colorspace: u32, chroma: u32) -> Result<Self> {
        let colorspace = ColorSpace::from_tag(colorspace)?;
        let chroma = match colorspace {
            ColorSpace::YCbCr => Some(ChromaSubsampling::from_tag(chroma)?),
            _ => None,
        };
        Ok(Self {
            width,
            height,
            colorspace,
            chroma,
        })
    }

    pub fn color_model(&self) -> ColorModel {
        self.colorspace.color_model()
    }
}

// ---------------------------------------------------------------------------
// YCbCr planes
// ---------------------------------------------------------------------------

/// Plane geometry of a three-plane YCbCr buffer.
///
/// Plane regions are sized from the aligned rectangle; host strides come from
/// the unaligned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: usize,
    pub height: usize,
    pub ratio: ChromaSubsampling,
    pub chroma_width: usize,
    pub chroma_height: usize,
    pub aligned_width: usize,
    pub aligned_height: usize,
    pub aligned_chroma_width: usize,
    pub aligned_chroma_height: usize,
}

impl PlaneLayout {
    pub fn ycbcr(width: usize, height: usize, ratio: ChromaSubsampling) -> Self {
        let (chroma_width, chroma_height) = chroma_size(width, height, ratio);
        let (aligned_width, aligned_height) = (align(width), align(height));
        let (aligned_chroma_width, aligned_chroma_height) =
            chroma_size(aligned_width, aligned_height, ratio);
        Self {
            width,
            height,
            ratio,
            chroma_width,
            chroma_height,
            aligned_width,
            aligned_height,
            aligned_chroma_width,
            aligned_chroma_height,
        }
    }

    /// Host row stride of the Y plane.
    pub fn y_stride(&self) -> usize {
        self.width
    }

    /// Host row stride of the Cb and Cr planes.
    pub fn c_stride(&self) -> usize {
        self.chroma_width
    }

    /// Codec-side row pitch of the Y plane and of the chroma planes.
    pub fn aligned_strides(&self) -> (usize, usize) {
        (self.aligned_width, self.aligned_chroma_width)
    }

    pub fn y_len(&self) -> usize {
        self.aligned_width * self.aligned_height
    }

    pub fn c_len(&self) -> usize {
        self.aligned_chroma_width * self.aligned_chroma_height
    }

    pub fn cb_offset(&self) -> usize {
        self.y_len()
    }

    pub fn cr_offset(&self) -> usize {
        self.y_len() + self.c_len()
    }

    pub fn total(&self) -> usize {
        self.y_len() + 2 * self.c_len()
    }

    /// Split a codec-side buffer into host planes.
    ///
    /// Rows arrive at the codec's aligned pitch and are compacted in place to
    /// the host strides; plane lengths stay at their aligned sizes.
    pub fn split(&self, mut buf: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        if buf.len() != self.total() {
            return Err(CodecError::layout(format!(
                "ycbcr buffer is {} bytes, expected {}",
                buf.len(),
                self.total()
            )));
        }
        let mut cb = buf.split_off(self.cb_offset());
        let mut cr = cb.split_off(self.c_len());
        let mut y = buf;

        let (y_pitch, c_pitch) = self.aligned_strides();
        compact_rows(&mut y, y_pitch, self.width, self.height)?;
        compact_rows(&mut cb, c_pitch, self.chroma_width, self.chroma_height)?;
        compact_rows(&mut cr, c_pitch, self.chroma_width, self.chroma_height)?;
        Ok((y, cb, cr))
    }

    /// Lay host planes out the way the codec reads them: each plane at its
    /// aligned offset, rows at the aligned pitch, padding zeroed.
    pub fn pack(&self, image: &YCbCrImage) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.total()];
        let (y_region, chroma) = buf.split_at_mut(self.cb_offset());
        let (cb_region, cr_region) = chroma.split_at_mut(self.c_len());

        let (y_pitch, c_pitch) = self.aligned_strides();
        expand_rows(image.y(), image.y_stride(), y_region, y_pitch, self.width, self.height)?;
        for (src, dst) in [(image.cb(), cb_region), (image.cr(), cr_region)] {
            expand_rows(
                src,
                image.c_stride(),
                dst,
                c_pitch,
                self.chroma_width,
                self.chroma_height,
            )?;
        }
        Ok(buf)
    }
}

/// Move `rows` rows of `row_len` bytes from `pitch` spacing to `row_len`
/// spacing within `plane`.
fn compact_rows(plane: &mut [u8], pitch: usize, row_len: usize, rows: usize) -> Result<()> {
    if row_len > pitch || pitch * rows > plane.len() {
        return Err(CodecError::layout(format!(
            "{rows} rows of pitch {pitch} (row {row_len}) exceed plane of {} bytes",
            plane.len()
        )));
    }
    if pitch == row_len {
        return Ok(());
    }
    // Destination never overtakes source since row_len < pitch.
    for r in 1..rows {
        let start = r * pitch;
        plane.copy_within(start..start + row_len, r * row_len);
    }
    Ok(())
}

fn expand_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    pitch: usize,
    row_len: usize,
    rows: usize,
) -> Result<()> {
    if rows == 0 || row_len == 0 {
        return Ok(());
    }
    let src_needed = src_stride * (rows - 1) + row_len;
    if src_stride < row_len || src.len() < src_needed {
        return Err(CodecError::invalid_image(format!(
            "plane of {} bytes (stride {src_stride}) cannot hold {rows} rows of {row_len}",
            src.len()
        )));
    }
    if row_len > pitch || pitch * rows > dst.len() {
        return Err(CodecError::layout(format!(
            "{rows} rows of pitch {pitch} exceed region of {} bytes",
            dst.len()
        )));
    }
    for r in 0..rows {
        dst[r * pitch..r * pitch + row_len]
            .copy_from_slice(&src[r * src_stride..r * src_stride + row_len]);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decode output
// ---------------------------------------------------------------------------

/// How a decode output buffer is sized and turned back into an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// One byte per pixel at the image width, buffer sized from aligned
    /// dimensions.
    Gray { width: usize, height: usize },
    /// Interleaved RGBA, 4 bytes per pixel.
    Rgba { width: usize, height: usize },
    /// Interleaved CMYK, 4 bytes per pixel (also used for YCCK).
    Cmyk { width: usize, height: usize },
    YCbCr(PlaneLayout),
}

impl OutputLayout {
    pub fn for_descriptor(desc: &ImageDescriptor) -> Result<Self> {
        let width = desc.width as usize;
        let height = desc.height as usize;
        Ok(match desc.colorspace {
            ColorSpace::Grayscale => Self::Gray { width, height },
            ColorSpace::Rgb => Self::Rgba { width, height },
            ColorSpace::Cmyk | ColorSpace::Ycck => Self::Cmyk { width, height },
            ColorSpace::YCbCr => {
                let ratio = desc
                    .chroma
                    .ok_or_else(|| CodecError::layout("ycbcr descriptor without chroma ratio"))?;
                Self::YCbCr(PlaneLayout::ycbcr(width, height, ratio))
            }
        })
    }

    /// Number of bytes the codec writes for this layout.
    pub fn size(&self) -> usize {
        match *self {
            Self::Gray { width, height } => align(width) * align(height),
            Self::Rgba { width, height } | Self::Cmyk { width, height } => width * height * 4,
            Self::YCbCr(planes) => planes.total(),
        }
    }

    /// Reinterpret the raw output bytes as a typed image.
    pub fn assemble(&self, mut bytes: Vec<u8>) -> Result<Image> {
        if bytes.len() != self.size() {
            return Err(CodecError::layout(format!(
                "decode output is {} bytes, expected {}",
                bytes.len(),
                self.size()
            )));
        }
        match *self {
            Self::Gray { width, height } => {
                bytes.truncate(width * height);
                let (w, h) = dims_u32(width, height)?;
                GrayImage::from_raw(w, h, bytes)
                    .map(Image::Gray)
                    .ok_or_else(|| CodecError::layout("gray buffer does not fit dimensions"))
            }
            Self::Rgba { width, height } => {
                let (w, h) = dims_u32(width, height)?;
                RgbaImage::from_raw(w, h, bytes)
                    .map(Image::Rgba)
                    .ok_or_else(|| CodecError::layout("rgba buffer does not fit dimensions"))
            }
            Self::Cmyk { width, height } => {
                let (w, h) = dims_u32(width, height)?;
                CmykImage::from_raw(w, h, bytes)
                    .map(Image::Cmyk)
                    .ok_or_else(|| CodecError::layout("cmyk buffer does not fit dimensions"))
            }
            Self::YCbCr(planes) => {
                let (w, h) = dims_u32(planes.width, planes.height)?;
                let (y, cb, cr) = planes.split(bytes)?;
                let image = YCbCrImage::from_planes(
                    w,
                    h,
                    planes.ratio,
                    [y, cb, cr],
                    planes.y_stride(),
                    planes.c_stride(),
                )?;
                Ok(Image::YCbCr(image))
            }
        }
    }
}

fn dims_u32(width: usize, height: usize) -> Result<(u32, u32)> {
    let w = u32::try_from(width).map_err(|_| CodecError::layout("width exceeds u32"))?;
    let h = u32::try_from(height).map_err(|_| CodecError::layout("height exceeds u32"))?;
    Ok((w, h))
}
