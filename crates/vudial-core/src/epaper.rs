//! Conversion between ordinary images and the dial's packed e-paper bitmap.
//!
//! The hub expects 200x144 one-bit pixels packed column by column: for each
//! x, 18 bytes cover the column top to bottom, most significant bit first.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use log::debug;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use vudial_protocol::display_constants::{
    BYTES_PER_COLUMN, DISPLAY_HEIGHT, DISPLAY_WIDTH, PACKED_FRAME_LEN,
};

/// Samples strictly above this are white.
pub const THRESHOLD: u8 = 127;

/// Whether sources smaller than the face are enlarged to fill it. Off, so
/// small artwork keeps its pixels and gets a black border instead.
pub const UPSCALE_SMALL_SOURCES: bool = false;

const WIDTH: usize = DISPLAY_WIDTH as usize;
const HEIGHT: usize = DISPLAY_HEIGHT as usize;
const GRAY_LEN: usize = WIDTH * HEIGHT;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },
    #[error("invalid grayscale buffer: expected {expected} bytes, got {actual}")]
    InvalidGrayscaleSize { expected: usize, actual: usize },
    #[error("source image is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("image conversion failed: {0}")]
    ConversionFailure(#[from] image::ImageError),
}

/// Tightly packed row-major 8-bit samples covering the whole face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grayscale {
    pixels: Vec<u8>,
}

impl Grayscale {
    pub fn from_raw(pixels: Vec<u8>) -> Result<Self, ImageError> {
        if pixels.len() != GRAY_LEN {
            return Err(ImageError::InvalidGrayscaleSize {
                expected: GRAY_LEN,
                actual: pixels.len(),
            });
        }
        Ok(Self { pixels })
    }

    /// Copy rows out of a surface whose rows are `stride` bytes apart,
    /// dropping the padding past the first 200 bytes of each row.
    pub fn from_raw_padded(stride: usize, data: &[u8]) -> Result<Self, ImageError> {
        let needed = stride * (HEIGHT - 1) + WIDTH;
        if stride < WIDTH || data.len() < needed {
            return Err(ImageError::InvalidGrayscaleSize {
                expected: needed,
                actual: data.len(),
            });
        }
        let mut pixels = Vec::with_capacity(GRAY_LEN);
        for row in data.chunks(stride).take(HEIGHT) {
            pixels.extend_from_slice(&row[..WIDTH]);
        }
        Ok(Self { pixels })
    }

    /// Letterbox `src` onto the face and sample it to grayscale.
    pub fn from_image(src: &DynamicImage) -> Result<Self, ImageError> {
        let canvas = letterbox(src)?;
        Self::from_raw(canvas.into_raw())
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * WIDTH + x]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(DISPLAY_WIDTH, DISPLAY_HEIGHT, |x, y| {
            Luma([self.get(x as usize, y as usize)])
        })
    }
}

/// A full e-paper frame in the hub's wire layout. Always 3600 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame(Vec<u8>);

impl PackedFrame {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        check_frame_len(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_grayscale(&self) -> Grayscale {
        unpack_unchecked(&self.0)
    }

    /// PNG preview of the frame as the dial will show it.
    pub fn thumbnail_png(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = Cursor::new(Vec::new());
        self.to_grayscale()
            .to_gray_image()
            .write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

/// Fit `src` inside the face without distortion, centred on black.
///
/// The scale is `min(200 / w, 144 / h)`, capped at 1 unless
/// [`UPSCALE_SMALL_SOURCES`] is set, so smaller sources sit at their native
/// size. Transparent pixels are composited over black.
pub fn letterbox(src: &DynamicImage) -> Result<GrayImage, ImageError> {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(ImageError::EmptySource {
            width: src_w,
            height: src_h,
        });
    }

    let fit = f64::min(
        f64::from(DISPLAY_WIDTH) / f64::from(src_w),
        f64::from(DISPLAY_HEIGHT) / f64::from(src_h),
    );
    let scale = if UPSCALE_SMALL_SOURCES { fit } else { fit.min(1.0) };
    let w = ((f64::from(src_w) * scale).round() as u32).clamp(1, DISPLAY_WIDTH);
    let h = ((f64::from(src_h) * scale).round() as u32).clamp(1, DISPLAY_HEIGHT);

    let gray = flatten_alpha(src);
    let scaled = if (w, h) == (src_w, src_h) {
        gray
    } else {
        imageops::resize(&gray, w, h, FilterType::Triangle)
    };

    let mut canvas = GrayImage::new(DISPLAY_WIDTH, DISPLAY_HEIGHT);
    let x = (DISPLAY_WIDTH - w) / 2;
    let y = (DISPLAY_HEIGHT - h) / 2;
    imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    debug!("letterboxed {src_w}x{src_h} to {w}x{h} at ({x}, {y})");
    Ok(canvas)
}

fn flatten_alpha(src: &DynamicImage) -> GrayImage {
    let la = src.to_luma_alpha8();
    GrayImage::from_fn(la.width(), la.height(), |x, y| {
        let [l, a] = la.get_pixel(x, y).0;
        Luma([(u16::from(l) * u16::from(a) / 255) as u8])
    })
}

/// Threshold and pack a grayscale face into the wire layout.
pub fn pack(gray: &Grayscale) -> PackedFrame {
    let mut out = Vec::with_capacity(PACKED_FRAME_LEN);
    for x in 0..WIDTH {
        for y_start in (0..HEIGHT).step_by(8) {
            let mut byte = 0u8;
            for bit in 0..8 {
                if gray.get(x, y_start + bit) > THRESHOLD {
                    byte |= 1 << (7 - bit);
                }
            }
            out.push(byte);
        }
    }
    PackedFrame(out)
}

/// Expand packed bytes back to grayscale: set bits become 255, clear bits 0.
pub fn unpack(bytes: &[u8]) -> Result<Grayscale, ImageError> {
    check_frame_len(bytes)?;
    Ok(unpack_unchecked(bytes))
}

fn unpack_unchecked(bytes: &[u8]) -> Grayscale {
    let mut pixels = vec![0u8; GRAY_LEN];
    for (column, column_bytes) in bytes.chunks(BYTES_PER_COLUMN).enumerate() {
        for (group, &byte) in column_bytes.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << (7 - bit)) != 0 {
                    let y = group * 8 + bit;
                    pixels[y * WIDTH + column] = 255;
                }
            }
        }
    }
    Grayscale { pixels }
}

fn check_frame_len(bytes: &[u8]) -> Result<(), ImageError> {
    if bytes.len() != PACKED_FRAME_LEN {
        return Err(ImageError::InvalidFrameSize {
            expected: PACKED_FRAME_LEN,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Full forward pipeline: letterbox, sample, threshold, pack.
pub fn convert(src: &DynamicImage) -> Result<PackedFrame, ImageError> {
    Ok(pack(&Grayscale::from_image(src)?))
}

pub fn open(path: &Path) -> Result<DynamicImage, ImageError> {
    let img = image::open(path)?;
    debug!("opened {} ({}x{})", path.display(), img.width(), img.height());
    Ok(img)
}
