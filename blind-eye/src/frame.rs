//! Camera frame representations and YUV to RGB conversion

use crate::error::AnalyzerError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest frame accepted, in pixels (8K UHD)
const MAX_FRAME_PIXELS: u64 = 7680 * 4320;

/// Luma/chroma range of a YUV frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRange {
    /// JFIF full range, Y and UV in 0..=255
    Full,
    /// Video range, Y in 16..=235 and UV in 16..=240
    Limited,
}

/// One image plane with its memory layout.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of two consecutive rows
    pub row_stride: usize,
    /// Bytes between two consecutive samples of a row
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane (`pixel_stride == 1`, `row_stride == width`)
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }

    fn check(&self, name: &str, cols: usize, rows: usize) -> Result<(), AnalyzerError> {
        if self.pixel_stride == 0 {
            return Err(AnalyzerError::Frame(format!("{} plane has zero pixel stride", name)));
        }
        let row_span = (cols - 1)
            .checked_mul(self.pixel_stride)
            .and_then(|s| s.checked_add(1))
            .ok_or_else(|| AnalyzerError::Frame(format!("{} plane stride overflow", name)))?;
        if self.row_stride < row_span {
            return Err(AnalyzerError::Frame(format!(
                "{} plane row stride {} shorter than row span {}",
                name, self.row_stride, row_span
            )));
        }
        let required = (rows - 1)
            .checked_mul(self.row_stride)
            .and_then(|s| s.checked_add(row_span))
            .ok_or_else(|| AnalyzerError::Frame(format!("{} plane size overflow", name)))?;
        if self.data.len() < required {
            return Err(AnalyzerError::Frame(format!(
                "{} plane holds {} bytes, {} required",
                name,
                self.data.len(),
                required
            )));
        }
        Ok(())
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }
}

/// Planar YUV 4:2:0 frame as delivered by camera pipelines (Y, U, V planes).
///
/// Chroma planes cover `ceil(width / 2) x ceil(height / 2)` samples. Strides
/// are honoured, so semi-planar buffers exposed as three planes with
/// `pixel_stride == 2` work as well as fully planar I420.
#[derive(Debug, Clone)]
pub struct Yuv420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
}

impl Yuv420Frame {
    pub fn new(width: u32, height: u32, y: Plane, u: Plane, v: Plane) -> Self {
        Self {
            width,
            height,
            y,
            u,
            v,
        }
    }

    /// Pack the planes into NV21: the full Y plane followed by interleaved V/U.
    pub fn to_nv21(&self) -> Result<Vec<u8>, AnalyzerError> {
        let (w, h) = check_dimensions(self.width, self.height)?;
        let (cw, ch) = chroma_dimensions(w, h);

        self.y.check("Y", w, h)?;
        self.u.check("U", cw, ch)?;
        self.v.check("V", cw, ch)?;

        let mut nv21 = Vec::with_capacity(nv21_len(w, h));
        for row in 0..h {
            if self.y.pixel_stride == 1 {
                let start = row * self.y.row_stride;
                nv21.extend_from_slice(&self.y.data[start..start + w]);
            } else {
                nv21.extend((0..w).map(|col| self.y.at(col, row)));
            }
        }
        for row in 0..ch {
            for col in 0..cw {
                nv21.push(self.v.at(col, row));
                nv21.push(self.u.at(col, row));
            }
        }

        Ok(nv21)
    }
}

/// A frame handed to the analyzer
#[derive(Debug, Clone)]
pub enum CameraFrame {
    /// Planar YUV 4:2:0 with strides
    Yuv420(Yuv420Frame),
    /// Packed NV21 (Y plane, then interleaved V/U)
    Nv21 { width: u32, height: u32, data: Vec<u8> },
    /// Already decoded RGB
    Rgb(RgbImage),
}

impl CameraFrame {
    /// Frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            CameraFrame::Yuv420(frame) => (frame.width, frame.height),
            CameraFrame::Nv21 { width, height, .. } => (*width, *height),
            CameraFrame::Rgb(image) => image.dimensions(),
        }
    }

    /// Decode the frame into an RGB image
    pub fn to_rgb(&self, range: ColorRange) -> Result<RgbImage, AnalyzerError> {
        match self {
            CameraFrame::Yuv420(frame) => {
                let nv21 = frame.to_nv21()?;
                nv21_to_rgb(&nv21, frame.width, frame.height, range)
            }
            CameraFrame::Nv21 {
                width,
                height,
                data,
            } => nv21_to_rgb(data, *width, *height, range),
            CameraFrame::Rgb(image) => {
                check_dimensions(image.width(), image.height())?;
                Ok(image.clone())
            }
        }
    }

    /// Load an encoded image file (PNG, JPEG, ...) as an RGB frame
    pub fn from_image_file(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let image = image::open(path.as_ref())?;
        Ok(CameraFrame::Rgb(image.to_rgb8()))
    }

    /// Load a raw NV21 dump of known dimensions
    pub fn from_nv21_file(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
    ) -> Result<Self, AnalyzerError> {
        let (w, h) = check_dimensions(width, height)?;
        let data = std::fs::read(path.as_ref())?;
        if data.len() != nv21_len(w, h) {
            return Err(AnalyzerError::Frame(format!(
                "{} holds {} bytes, a {}x{} NV21 frame has {}",
                path.as_ref().display(),
                data.len(),
                width,
                height,
                nv21_len(w, h)
            )));
        }
        Ok(CameraFrame::Nv21 {
            width,
            height,
            data,
        })
    }
}

/// Byte length of an NV21 buffer
pub fn nv21_len(width: usize, height: usize) -> usize {
    let (cw, ch) = chroma_dimensions(width, height);
    width * height + 2 * cw * ch
}

fn chroma_dimensions(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

fn check_dimensions(width: u32, height: u32) -> Result<(usize, usize), AnalyzerError> {
    if width == 0 || height == 0 {
        return Err(AnalyzerError::Frame("Frame dimensions must be non-zero".to_string()));
    }
    if width as u64 * height as u64 > MAX_FRAME_PIXELS {
        return Err(AnalyzerError::Frame(format!(
            "Frame {}x{} exceeds the 8K pixel limit",
            width, height
        )));
    }
    Ok((width as usize, height as usize))
}

/// Convert NV21 to RGB using BT.601 coefficients
pub fn nv21_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    range: ColorRange,
) -> Result<RgbImage, AnalyzerError> {
    let (w, h) = check_dimensions(width, height)?;
    let expected = nv21_len(w, h);
    if data.len() < expected {
        return Err(AnalyzerError::Frame(format!(
            "NV21 buffer holds {} bytes, {} required for {}x{}",
            data.len(),
            expected,
            width,
            height
        )));
    }

    let (cw, _) = chroma_dimensions(w, h);
    let (luma, chroma) = data.split_at(w * h);
    let mut rgb = Vec::with_capacity(w * h * 3);

    for row in 0..h {
        let chroma_row = &chroma[(row / 2) * cw * 2..];
        for col in 0..w {
            let y = luma[row * w + col];
            let v = chroma_row[(col / 2) * 2];
            let u = chroma_row[(col / 2) * 2 + 1];
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v, range));
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| AnalyzerError::Frame("RGB buffer size mismatch".to_string()))
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8, range: ColorRange) -> [u8; 3] {
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let (r, g, b) = match range {
        ColorRange::Full => {
            let y = y as f32;
            (
                y + 1.402 * v,
                y - 0.344_136 * u - 0.714_136 * v,
                y + 1.772 * u,
            )
        }
        ColorRange::Limited => {
            let y = 1.164 * (y as f32 - 16.0);
            (
                y + 1.596 * v,
                y - 0.392 * u - 0.813 * v,
                y + 2.017 * u,
            )
        }
    };
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

#[inline]
fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
