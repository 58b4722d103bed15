//! Image to tensor preprocessing

use crate::error::AnalyzerError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

const CHANNELS: usize = 3;

/// Memory layout of the image input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, one plane per channel (ONNX exports)
    Nchw,
    /// `[1, H, W, 3]`, interleaved channels (TFLite exports)
    Nhwc,
}

/// Resampling filter for scaling frames to the model input size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Normalised float tensor ready for the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    layout: TensorLayout,
    data: Vec<f32>,
}

impl InputTensor {
    /// Wrap raw data, checking it matches `shape`
    pub fn new(shape: [usize; 4], layout: TensorLayout, data: Vec<f32>) -> Result<Self, AnalyzerError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| AnalyzerError::Preprocess("Tensor shape would overflow".to_string()))?;
        if data.len() != expected {
            return Err(AnalyzerError::Preprocess(format!(
                "Tensor data has {} elements, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, layout, data })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Scale `image` to `input_size x input_size` (stretching, no letterbox) and
/// normalise every channel to `[0, 1]` in the requested layout.
pub fn to_input_tensor(
    image: &RgbImage,
    input_size: u32,
    layout: TensorLayout,
    filter: ResizeFilter,
) -> Result<InputTensor, AnalyzerError> {
    if input_size == 0 {
        return Err(AnalyzerError::Preprocess("Input size cannot be zero".to_string()));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(AnalyzerError::Preprocess("Cannot preprocess an empty image".to_string()));
    }

    let resized: Cow<'_, RgbImage> = if image.dimensions() == (input_size, input_size) {
        Cow::Borrowed(image)
    } else {
        debug!(
            "Resizing {}x{} frame to {}x{}",
            image.width(),
            image.height(),
            input_size,
            input_size
        );
        Cow::Owned(imageops::resize(image, input_size, input_size, filter.into()))
    };

    let side = input_size as usize;
    let plane = side * side;
    let raw = resized.as_raw();
    let mut data = vec![0.0f32; CHANNELS * plane];

    match layout {
        TensorLayout::Nchw => {
            for (idx, pixel) in raw.chunks_exact(CHANNELS).enumerate() {
                data[idx] = pixel[0] as f32 / 255.0;
                data[plane + idx] = pixel[1] as f32 / 255.0;
                data[2 * plane + idx] = pixel[2] as f32 / 255.0;
            }
        }
        TensorLayout::Nhwc => {
            for (value, &byte) in data.iter_mut().zip(raw.iter()) {
                *value = byte as f32 / 255.0;
            }
        }
    }

    let shape = match layout {
        TensorLayout::Nchw => [1, CHANNELS, side, side],
        TensorLayout::Nhwc => [1, side, side, CHANNELS],
    };
    InputTensor::new(shape, layout, data)
}
