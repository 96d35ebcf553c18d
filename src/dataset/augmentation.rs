//! Data Augmentation Module
//!
//! On-the-fly image augmentation for the training pipeline:
//!
//! 1. resize to `image_size × image_size`
//! 2. random horizontal flip
//! 3. random rotation (nearest neighbour, black fill)
//! 4. color jitter (brightness, contrast, saturation, hue) in a random order
//! 5. conversion to a CHW `[0, 1]` float buffer
//!
//! Normalization is left to the batcher so it can run on the device.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (samples uniformly in ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Brightness factor range (1.0 ± brightness)
    pub brightness: f32,
    /// Contrast factor range (1.0 ± contrast)
    pub contrast: f32,
    /// Saturation factor range (1.0 ± saturation)
    pub saturation: f32,
    /// Hue shift range in fractions of a full turn (±hue, at most 0.5)
    pub hue: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            rotation_degrees: 10.0,
            brightness: 0.2,
            contrast: 0.2,
            saturation: 0.2,
            hue: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
        }
    }
}

/// One color jitter adjustment with its sampled factor
#[derive(Clone, Copy, Debug, PartialEq)]
enum Jitter {
    Brightness(f32),
    Contrast(f32),
    Saturation(f32),
    Hue(f32),
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Create an augmenter with the default training augmentation
    pub fn with_defaults(image_size: u32) -> Self {
        Self::new(AugmentationConfig::default(), image_size)
    }

    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    /// Apply all configured augmentations randomly to an image
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = img.to_rgb8();

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            image::imageops::flip_horizontal_in_place(&mut result);
        }

        if self.config.rotation_degrees > 0.0 {
            let angle =
                rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = rotate_nearest(&result, angle);
        }

        for jitter in self.sample_jitter(rng) {
            result = match jitter {
                Jitter::Brightness(f) => adjust_brightness(&result, f),
                Jitter::Contrast(f) => adjust_contrast(&result, f),
                Jitter::Saturation(f) => adjust_saturation(&result, f),
                Jitter::Hue(shift) => adjust_hue(&result, shift),
            };
        }

        DynamicImage::ImageRgb8(result)
    }

    /// Sample the enabled jitter factors and shuffle their application order
    fn sample_jitter(&self, rng: &mut ChaCha8Rng) -> Vec<Jitter> {
        let mut ops = Vec::with_capacity(4);

        if self.config.brightness > 0.0 {
            ops.push(Jitter::Brightness(sample_factor(rng, self.config.brightness)));
        }
        if self.config.contrast > 0.0 {
            ops.push(Jitter::Contrast(sample_factor(rng, self.config.contrast)));
        }
        if self.config.saturation > 0.0 {
            ops.push(Jitter::Saturation(sample_factor(rng, self.config.saturation)));
        }
        if self.config.hue > 0.0 {
            let hue = self.config.hue.min(0.5);
            ops.push(Jitter::Hue(rng.gen_range(-hue..=hue)));
        }

        ops.shuffle(rng);
        ops
    }

    /// Resize image to the square target size (always applied, not random)
    pub fn resize(&self, img: DynamicImage) -> DynamicImage {
        img.resize_exact(self.image_size, self.image_size, FilterType::Triangle)
    }

    /// Convert image to CHW float tensor data scaled to [0, 1]
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        rgb_to_chw(&img.to_rgb8())
    }

    /// Full pipeline: resize, augment (when an RNG is given), convert to tensor
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut result = self.resize(img);

        if let Some(rng) = rng {
            result = self.augment(result, rng);
        }

        self.to_tensor_data(&result)
    }
}

/// Lay out an RGB image as planar CHW floats in [0, 1]
pub fn rgb_to_chw(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }

    data
}

fn sample_factor(rng: &mut ChaCha8Rng, delta: f32) -> f32 {
    rng.gen_range((1.0 - delta).max(0.0)..=1.0 + delta)
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn luminance(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// Rotate counter-clockwise by `angle_degrees` about the image center.
/// Pixels that map outside the source are filled with black.
fn rotate_nearest(img: &RgbImage, angle_degrees: f32) -> RgbImage {
    if angle_degrees == 0.0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;

        let src_x = (cx + dx * cos_a - dy * sin_a - 0.5).round();
        let src_y = (cy + dx * sin_a + dy * cos_a - 0.5).round();

        if src_x < 0.0 || src_y < 0.0 || src_x >= width as f32 || src_y >= height as f32 {
            Rgb([0, 0, 0])
        } else {
            *img.get_pixel(src_x as u32, src_y as u32)
        }
    })
}

/// Multiply every channel by `factor`
fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            pixel[c] = to_u8(pixel[c] as f32 * factor);
        }
    }
    output
}

/// Blend with the mean gray level of the whole image
fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() * img.height()).max(1) as f64;
    let sum: f64 = img.pixels().map(|p| luminance(p).round() as f64).sum();
    let mean = (sum / count) as f32;

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            pixel[c] = to_u8(factor * pixel[c] as f32 + (1.0 - factor) * mean);
        }
    }
    output
}

/// Blend each pixel with its own gray level
fn adjust_saturation(img: &RgbImage, factor: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let gray = luminance(pixel).round();
        for c in 0..3 {
            pixel[c] = to_u8(factor * pixel[c] as f32 + (1.0 - factor) * gray);
        }
    }
    output
}

/// Rotate the hue channel by `shift` turns
fn adjust_hue(img: &RgbImage, shift: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let h = (h + shift).rem_euclid(1.0);
        let [r, g, b] = hsv_to_rgb(h, s, v);
        *pixel = Rgb([r, g, b]);
    }
    output
}

/// RGB bytes to HSV, every component in [0, 1]
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };

    (h, s, v)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h6 = (h * 6.0).rem_euclid(6.0);
    let sector = h6.floor();
    let f = h6 - sector;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [to_u8(r * 255.0), to_u8(g * 255.0), to_u8(b * 255.0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> DynamicImage {
        let mut img = ImageBuffer::new(64, 48);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 4) as u8, (y * 4) as u8, 128]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_default_matches_training_pipeline() {
        let config = AugmentationConfig::default();
        assert_eq!(config.horizontal_flip_prob, 0.5);
        assert_eq!(config.rotation_degrees, 10.0);
        assert_eq!(config.hue, 0.1);
    }

    #[test]
    fn test_preprocess_output_is_square_chw() {
        let aug = Augmenter::with_defaults(32);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let data = aug.preprocess(create_test_image(), Some(&mut rng));

        assert_eq!(data.len(), 3 * 32 * 32);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_same_seed_same_augmentation() {
        let aug = Augmenter::with_defaults(32);
        let mut rng_a = ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = ChaCha8Rng::seed_from_u64(7);

        let a = aug.preprocess(create_test_image(), Some(&mut rng_a));
        let b = aug.preprocess(create_test_image(), Some(&mut rng_b));

        assert_eq!(a, b);
    }

    #[test]
    fn test_no_augmentation_is_plain_resize() {
        let aug = Augmenter::no_augmentation(16);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let with_rng = aug.preprocess(create_test_image(), Some(&mut rng));
        let without = aug.preprocess(create_test_image(), None);

        assert_eq!(with_rng, without);
    }

    #[test]
    fn test_rotation_fills_corners_with_black() {
        let white = RgbImage::from_pixel(21, 21, Rgb([255, 255, 255]));
        let rotated = rotate_nearest(&white, 45.0);

        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_rotation_is_counter_clockwise() {
        let mut img = RgbImage::new(5, 5);
        img.put_pixel(4, 2, Rgb([255, 0, 0]));

        let rotated = rotate_nearest(&img, 90.0);

        assert_eq!(rotated.get_pixel(2, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_brightness_scales_channels() {
        let img = RgbImage::from_pixel(2, 2, Rgb([100, 50, 200]));
        let out = adjust_brightness(&img, 1.2);
        assert_eq!(out.get_pixel(0, 0), &Rgb([120, 60, 240]));
    }

    #[test]
    fn test_zero_saturation_is_grayscale() {
        let img = RgbImage::from_pixel(1, 1, Rgb([200, 100, 50]));
        let out = adjust_saturation(&img, 0.0);
        let p = out.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_hsv_roundtrip_and_full_turn() {
        let (h, s, v) = rgb_to_hsv(200, 100, 50);
        assert_eq!(hsv_to_rgb(h, s, v), [200, 100, 50]);

        let img = RgbImage::from_pixel(1, 1, Rgb([200, 100, 50]));
        assert_eq!(adjust_hue(&img, 1.0).get_pixel(0, 0), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_rgb_to_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));

        let data = rgb_to_chw(&img);

        assert_eq!(data, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
