//! Host raster containers.
//!
//! Grayscale and RGBA pixels use the `image` crate's buffers directly.  The
//! codec also produces interleaved CMYK and planar YCbCr, which `image` has no
//! container for, so [`CmykImage`] and [`YCbCrImage`] fill that gap.

use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

use crate::error::{CodecError, Result};
use crate::geometry::{ChromaSubsampling, ColorModel, chroma_size};

/// A decoded image, or an image ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    Gray(GrayImage),
    Rgba(RgbaImage),
    Cmyk(CmykImage),
    YCbCr(YCbCrImage),
}

impl Image {
    pub fn width(&self) -> u32 {
        match self {
            Self::Gray(img) => img.width(),
            Self::Rgba(img) => img.width(),
            Self::Cmyk(img) => img.width(),
            Self::YCbCr(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Gray(img) => img.height(),
            Self::Rgba(img) => img.height(),
            Self::Cmyk(img) => img.height(),
            Self::YCbCr(img) => img.height(),
        }
    }

    pub fn color_model(&self) -> ColorModel {
        match self {
            Self::Gray(_) => ColorModel::Gray,
            Self::Rgba(_) => ColorModel::Rgba,
            Self::Cmyk(_) => ColorModel::Cmyk,
            Self::YCbCr(_) => ColorModel::YCbCr,
        }
    }

    /// Take 8-bit gray as is and everything else as RGBA.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(img) => Self::Gray(img),
            DynamicImage::ImageRgba8(img) => Self::Rgba(img),
            other => Self::Rgba(other.to_rgba8()),
        }
    }

    /// Convert to a [`DynamicImage`], going through RGBA for the models the
    /// `image` crate cannot represent.
    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Self::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            Self::Rgba(img) => DynamicImage::ImageRgba8(img.clone()),
            Self::Cmyk(img) => DynamicImage::ImageRgba8(img.to_rgba()),
            Self::YCbCr(img) => DynamicImage::ImageRgba8(img.to_rgba()),
        }
    }
}

impl From<GrayImage> for Image {
    fn from(img: GrayImage) -> Self {
        Self::Gray(img)
    }
}

impl From<RgbaImage> for Image {
    fn from(img: RgbaImage) -> Self {
        Self::Rgba(img)
    }
}

impl From<CmykImage> for Image {
    fn from(img: CmykImage) -> Self {
        Self::Cmyk(img)
    }
}

impl From<YCbCrImage> for Image {
    fn from(img: YCbCrImage) -> Self {
        Self::YCbCr(img)
    }
}

// ---------------------------------------------------------------------------
// CMYK
// ---------------------------------------------------------------------------

/// Interleaved CMYK pixels, 4 bytes per pixel, row stride `width * 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmykImage {
    width: u32,
    height: u32,
    pix: Vec<u8>,
}

impl CmykImage {
    /// A zeroed (white) image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pix: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wrap an existing buffer; `None` if its length does not match.
    pub fn from_raw(width: u32, height: u32, pix: Vec<u8>) -> Option<Self> {
        (pix.len() == width as usize * height as usize * 4).then_some(Self { width, height, pix })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.pix
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pix
    }

    /// `[c, m, y, k]` at `(x, y)`.
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pix[i], self.pix[i + 1], self.pix[i + 2], self.pix[i + 3]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, cmyk: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pix[i..i + 4].copy_from_slice(&cmyk);
    }

    pub fn to_rgba(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        for (dst, src) in out.pixels_mut().zip(self.pix.chunks_exact(4)) {
            let w = 255 - u32::from(src[3]);
            let channel = |c: u8| ((255 - u32::from(c)) * w / 255) as u8;
            *dst = Rgba([channel(src[0]), channel(src[1]), channel(src[2]), 255]);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// YCbCr
// ---------------------------------------------------------------------------

/// Planar Y'CbCr with subsampled chroma.
///
/// Pixel `(x, y)` lives at `y_offset(x, y)` in the Y plane and at
/// `c_offset(x, y)` in both chroma planes.  Planes may be longer than the
/// strides require (decoded planes keep the codec's aligned sizes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YCbCrImage {
    width: u32,
    height: u32,
    ratio: ChromaSubsampling,
    y: Vec<u8>,
    cb: Vec<u8>,
    cr: Vec<u8>,
    y_stride: usize,
    c_stride: usize,
}

impl YCbCrImage {
    /// Zeroed planes with tight strides.
    pub fn new(width: u32, height: u32, ratio: ChromaSubsampling) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_size(w, h, ratio);
        Self {
            width,
            height,
            ratio,
            y: vec![0; w * h],
            cb: vec![0; cw * ch],
            cr: vec![0; cw * ch],
            y_stride: w,
            c_stride: cw,
        }
    }

    /// Wrap existing `[y, cb, cr]` planes, checking that every addressable
    /// pixel is in bounds.
    pub fn from_planes(
        width: u32,
        height: u32,
        ratio: ChromaSubsampling,
        planes: [Vec<u8>; 3],
        y_stride: usize,
        c_stride: usize,
    ) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_size(w, h, ratio);
        let [y, cb, cr] = planes;

        check_plane("y", y.len(), y_stride, w, h)?;
        check_plane("cb", cb.len(), c_stride, cw, ch)?;
        check_plane("cr", cr.len(), c_stride, cw, ch)?;

        Ok(Self {
            width,
            height,
            ratio,
            y,
            cb,
            cr,
            y_stride,
            c_stride,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn ratio(&self) -> ChromaSubsampling {
        self.ratio
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn cb(&self) -> &[u8] {
        &self.cb
    }

    pub fn cr(&self) -> &[u8] {
        &self.cr
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        &mut self.y
    }

    pub fn cb_mut(&mut self) -> &mut [u8] {
        &mut self.cb
    }

    pub fn cr_mut(&mut self) -> &mut [u8] {
        &mut self.cr
    }

    pub fn y_stride(&self) -> usize {
        self.y_stride
    }

    pub fn c_stride(&self) -> usize {
        self.c_stride
    }

    pub fn y_offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.y_stride + x as usize
    }

    pub fn c_offset(&self, x: u32, y: u32) -> usize {
        let (dx, dy) = self.ratio.divisors();
        (y as usize / dy) * self.c_stride + x as usize / dx
    }

    /// `(Y, Cb, Cr)` at `(x, y)`.
    pub fn get_pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let c = self.c_offset(x, y);
        (self.y[self.y_offset(x, y)], self.cb[c], self.cr[c])
    }

    /// JFIF full-range conversion to RGBA.
    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let (luma, cb, cr) = self.get_pixel(x, y);
            let [r, g, b] = ycbcr_to_rgb(luma, cb, cr);
            Rgba([r, g, b, 255])
        })
    }
}

fn check_plane(name: &str, len: usize, stride: usize, row_len: usize, rows: usize) -> Result<()> {
    if rows == 0 || row_len == 0 {
        return Ok(());
    }
    if stride < row_len {
        return Err(CodecError::invalid_image(format!(
            "{name} stride {stride} is narrower than {row_len}"
        )));
    }
    let needed = stride * (rows - 1) + row_len;
    if len < needed {
        return Err(CodecError::invalid_image(format!(
            "{name} plane has {len} bytes, needs {needed}"
        )));
    }
    Ok(())
}

/// Fixed-point (16.16) JFIF Y'CbCr -> RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let yy = (i32::from(y) << 16) + (1 << 15);
    let cb = i32::from(cb) - 128;
    let cr = i32::from(cr) - 128;
    let clamp = |v: i32| (v >> 16).clamp(0, 255) as u8;
    [
        clamp(yy + 91_881 * cr),
        clamp(yy - 22_554 * cb - 46_802 * cr),
        clamp(yy + 116_130 * cb),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmyk_from_raw_checks_length() {
        assert!(CmykImage::from_raw(2, 2, vec![0; 16]).is_some());
        assert!(CmykImage::from_raw(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn cmyk_to_rgba() {
        let mut img = CmykImage::new(2, 1);
        img.put_pixel(1, 0, [255, 0, 0, 0]);
        let rgba = img.to_rgba();
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [0, 255, 255, 255]);
        assert_eq!(img.get_pixel(1, 0), [255, 0, 0, 0]);
    }

    #[test]
    fn ycbcr_new_uses_tight_strides() {
        let img = YCbCrImage::new(6, 6, ChromaSubsampling::Ratio420);
        assert_eq!(img.y_stride(), 6);
        assert_eq!(img.c_stride(), 3);
        assert_eq!(img.y().len(), 36);
        assert_eq!(img.cb().len(), 9);
        assert_eq!(img.cr().len(), 9);
    }

    #[test]
    fn ycbcr_offsets_follow_ratio() {
        let img = YCbCrImage::new(8, 8, ChromaSubsampling::Ratio420);
        assert_eq!(img.c_offset(5, 5), 2 * 4 + 2);
        let img = YCbCrImage::new(8, 8, ChromaSubsampling::Ratio422);
        assert_eq!(img.c_offset(5, 5), 5 * 4 + 2);
        let img = YCbCrImage::new(8, 8, ChromaSubsampling::Ratio410);
        assert_eq!(img.c_offset(5, 5), 2 * 2 + 1);
        assert_eq!(img.y_offset(5, 5), 45);
    }

    #[test]
    fn from_planes_rejects_short_chroma() {
        let err = YCbCrImage::from_planes(
            4,
            4,
            ChromaSubsampling::Ratio444,
            [vec![0; 16], vec![0; 15], vec![0; 16]],
            4,
            4,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cb plane"));
    }

    #[test]
    fn from_planes_accepts_oversized_planes() {
        let img = YCbCrImage::from_planes(
            3,
            3,
            ChromaSubsampling::Ratio420,
            [vec![0; 256], vec![0; 64], vec![0; 64]],
            3,
            2,
        );
        assert!(img.is_ok());
    }

    #[test]
    fn neutral_chroma_is_gray() {
        assert_eq!(ycbcr_to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(255, 128, 128), [255, 255, 255]);
        assert_eq!(ycbcr_to_rgb(100, 128, 128), [100, 100, 100]);
    }

    #[test]
    fn saturated_red() {
        let [r, g, b] = ycbcr_to_rgb(76, 85, 255);
        assert!(r >= 253, "r = {r}");
        assert!(g <= 2, "g = {g}");
        assert!(b <= 2, "b = {b}");
    }

    #[test]
    fn to_dynamic_converts_planar_models() {
        let img = Image::from(YCbCrImage::new(4, 2, ChromaSubsampling::Ratio444));
        let dynamic = img.to_dynamic();
        assert_eq!((dynamic.width(), dynamic.height()), (4, 2));
        assert!(matches!(dynamic, DynamicImage::ImageRgba8(_)));
        assert_eq!(img.color_model(), ColorModel::YCbCr);
    }

    #[test]
    fn from_dynamic_keeps_gray_and_widens_the_rest() {
        let gray = Image::from_dynamic(DynamicImage::ImageLuma8(GrayImage::new(2, 2)));
        assert_eq!(gray.color_model(), ColorModel::Gray);
        let rgb = Image::from_dynamic(DynamicImage::ImageRgb8(image::RgbImage::new(3, 1)));
        let Image::Rgba(rgba) = rgb else {
            panic!("expected rgba");
        };
        assert_eq!(rgba.get_pixel(2, 0).0, [0, 0, 0, 255]);
    }
}
