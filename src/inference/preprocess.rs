//! Inference Preprocessing
//!
//! Resize so the shorter side is `resize_shorter`, center-crop a
//! `crop_size` square, scale to `[0, 1]` and normalize per channel.
//! The result is a flat CHW buffer ready to become a `[1, 3, S, S]` tensor.

use std::io::Cursor;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

use crate::utils::error::{ClassifierError, Result};
use crate::{IMAGENET_MEAN, IMAGENET_STD, IMAGE_SIZE, RESIZE_SHORTER};

/// Fixed evaluation transform shared by the service and the `infer` command
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    resize_shorter: u32,
    crop_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            resize_shorter: RESIZE_SHORTER as u32,
            crop_size: IMAGE_SIZE as u32,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Preprocessor {
    /// Custom sizes with ImageNet normalization
    ///
    /// The crop must fit inside the resized image.
    pub fn new(resize_shorter: u32, crop_size: u32) -> Result<Self> {
        if crop_size == 0 || resize_shorter < crop_size {
            return Err(ClassifierError::Config(format!(
                "crop size {} must be positive and not exceed resize size {}",
                crop_size, resize_shorter
            )));
        }

        Ok(Self {
            resize_shorter,
            crop_size,
            ..Self::default()
        })
    }

    pub fn crop_size(&self) -> usize {
        self.crop_size as usize
    }

    /// Decode raw upload bytes (format sniffed from content)
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ClassifierError::ImageDecode(e.to_string()))?
            .decode()?;
        Ok(img)
    }

    /// Decode and preprocess in one go
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        self.preprocess(&Self::decode(bytes)?)
    }

    /// Normalized CHW data of length `3 * crop * crop`
    pub fn preprocess(&self, img: &DynamicImage) -> Result<Vec<f32>> {
        let rgb = img.to_rgb8();
        let resized = self.resize_shorter_side(&rgb)?;
        let cropped = self.center_crop(&resized);
        Ok(self.normalize(&cropped))
    }

    /// Stack preprocessed data into a `[1, 3, crop, crop]` tensor
    pub fn to_tensor<B: Backend>(&self, data: Vec<f32>, device: &B::Device) -> Tensor<B, 4> {
        let size = self.crop_size();
        Tensor::<B, 4>::from_floats(TensorData::new(data, [1, 3, size, size]), device)
    }

    /// Scale so the shorter side equals `resize_shorter`; the longer side
    /// is scaled proportionally and truncated.
    fn resize_shorter_side(&self, rgb: &RgbImage) -> Result<RgbImage> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::ImageDecode("image has no pixels".to_string()));
        }

        let (new_w, new_h) = resized_dimensions(width, height, self.resize_shorter);
        if (new_w, new_h) == (width, height) {
            return Ok(rgb.clone());
        }

        Ok(image::imageops::resize(rgb, new_w, new_h, FilterType::Triangle))
    }

    fn center_crop(&self, rgb: &RgbImage) -> RgbImage {
        let (width, height) = rgb.dimensions();
        let left = crop_offset(width, self.crop_size);
        let top = crop_offset(height, self.crop_size);
        image::imageops::crop_imm(rgb, left, top, self.crop_size, self.crop_size).to_image()
    }

    fn normalize(&self, rgb: &RgbImage) -> Vec<f32> {
        let (width, height) = rgb.dimensions();
        let plane = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * plane];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        data
    }
}

fn resized_dimensions(width: u32, height: u32, shorter: u32) -> (u32, u32) {
    if width <= height {
        let long = (shorter as u64 * height as u64 / width as u64) as u32;
        (shorter, long)
    } else {
        let long = (shorter as u64 * width as u64 / height as u64) as u32;
        (long, shorter)
    }
}

/// `round_half_even((dim - crop) / 2)`
fn crop_offset(dim: u32, crop: u32) -> u32 {
    (dim.saturating_sub(crop) as f64 / 2.0).round_ties_even() as u32
}
