//! Random image augmentations applied before indexing.
//!
//! Every augmentation is applied to the original image independently, so a
//! source file yields the original plus one variant per augmentation. All
//! randomness comes from the caller's RNG, which keeps results reproducible
//! with a seeded generator.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use rand::Rng;
use rand::seq::SliceRandom;

const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

#[derive(Debug, Clone, PartialEq)]
pub enum Augmentation {
    /// Rotation by an angle drawn from `-max_degrees..=max_degrees`, black fill.
    Rotate { max_degrees: f32 },
    /// Crop of a random area and aspect ratio, resized to `size`×`size`.
    ResizedCrop {
        size: u32,
        scale: (f64, f64),
        ratio: (f64, f64),
    },
    HorizontalFlip,
    /// Factors are drawn from `1 - x..=1 + x`; hue is shifted by `-hue..=hue`.
    ColorJitter {
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
    },
}

/// The augmentation set used when indexing folders.
pub fn default_augmentations() -> Vec<Augmentation> {
    vec![
        Augmentation::Rotate { max_degrees: 15.0 },
        Augmentation::ResizedCrop {
            size: 224,
            scale: (0.8, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
        },
        Augmentation::HorizontalFlip,
        Augmentation::ColorJitter {
            brightness: 0.2,
            contrast: 0.2,
            saturation: 0.2,
            hue: 0.1,
        },
    ]
}

impl Augmentation {
    /// Suffix used to tell variants of the same file apart.
    pub fn name(&self) -> &'static str {
        match self {
            Augmentation::Rotate { .. } => "rotate",
            Augmentation::ResizedCrop { .. } => "crop",
            Augmentation::HorizontalFlip => "flip",
            Augmentation::ColorJitter { .. } => "jitter",
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        match *self {
            Augmentation::Rotate { max_degrees } => rotate(image, max_degrees, rng),
            Augmentation::ResizedCrop { size, scale, ratio } => {
                resized_crop(image, size, scale, ratio, rng)
            }
            Augmentation::HorizontalFlip => image.fliph(),
            Augmentation::ColorJitter {
                brightness,
                contrast,
                saturation,
                hue,
            } => color_jitter(image, brightness, contrast, saturation, hue, rng),
        }
    }
}

/// An image to embed together with the augmentation that produced it.
#[derive(Debug, Clone)]
pub struct Variant {
    /// `None` for the untouched original.
    pub name: Option<&'static str>,
    pub image: DynamicImage,
}

/// Returns the original image followed by one variant per augmentation.
pub fn variants<R: Rng + ?Sized>(
    image: DynamicImage,
    augmentations: &[Augmentation],
    rng: &mut R,
) -> Vec<Variant> {
    let mut result = Vec::with_capacity(augmentations.len() + 1);
    for augmentation in augmentations {
        result.push(Variant {
            name: Some(augmentation.name()),
            image: augmentation.apply(&image, rng),
        });
    }
    result.insert(0, Variant { name: None, image });
    result
}

fn rotate<R: Rng + ?Sized>(image: &DynamicImage, max_degrees: f32, rng: &mut R) -> DynamicImage {
    let max_degrees = max_degrees.abs();
    let degrees = if max_degrees > 0.0 {
        rng.random_range(-max_degrees..=max_degrees)
    } else {
        0.0
    };
    let rgb = image.to_rgb8();
    let rotated = rotate_about_center(
        &rgb,
        degrees.to_radians(),
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
    );
    DynamicImage::ImageRgb8(rotated)
}

/// Picks the crop window the same way torchvision's `RandomResizedCrop` does.
fn crop_window<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> (u32, u32, u32, u32) {
    let area = f64::from(width) * f64::from(height);
    let log_ratio = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..10 {
        let target_area = area * rng.random_range(scale.0..=scale.1);
        let aspect = rng.random_range(log_ratio.0..=log_ratio.1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if 0 < w && w <= width && 0 < h && h <= height {
            let x = rng.random_range(0..=width - w);
            let y = rng.random_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    // Centre crop fallback.
    let in_ratio = f64::from(width) / f64::from(height);
    let (w, h) = if in_ratio < ratio.0 {
        (width, (f64::from(width) / ratio.0).round() as u32)
    } else if in_ratio > ratio.1 {
        ((f64::from(height) * ratio.1).round() as u32, height)
    } else {
        (width, height)
    };
    let w = w.clamp(1, width);
    let h = h.clamp(1, height);
    ((width - w) / 2, (height - h) / 2, w, h)
}

fn resized_crop<R: Rng + ?Sized>(
    image: &DynamicImage,
    size: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let (x, y, w, h) = crop_window(width, height, scale, ratio, rng);
    image
        .crop_imm(x, y, w, h)
        .resize_exact(size, size, FilterType::Triangle)
}

fn jitter_factor<R: Rng + ?Sized>(amount: f32, rng: &mut R) -> f32 {
    let amount = amount.abs();
    if amount > 0.0 {
        rng.random_range((1.0 - amount).max(0.0)..=1.0 + amount)
    } else {
        1.0
    }
}

fn color_jitter<R: Rng + ?Sized>(
    image: &DynamicImage,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    hue: f32,
    rng: &mut R,
) -> DynamicImage {
    let brightness = jitter_factor(brightness, rng);
    let contrast = jitter_factor(contrast, rng);
    let saturation = jitter_factor(saturation, rng);
    let hue = hue.abs().min(0.5);
    let hue_shift = if hue > 0.0 {
        rng.random_range(-hue..=hue)
    } else {
        0.0
    };

    let mut order = [0u8, 1, 2, 3];
    order.shuffle(rng);

    let mut pixels: Vec<[f32; 3]> = image
        .to_rgb8()
        .pixels()
        .map(|p| p.0.map(|c| f32::from(c) / 255.0))
        .collect();

    for step in order {
        match step {
            0 => pixels
                .iter_mut()
                .for_each(|p| *p = p.map(|c| (c * brightness).clamp(0.0, 1.0))),
            1 => {
                let mean = if pixels.is_empty() {
                    0.0
                } else {
                    pixels.iter().map(luma).sum::<f32>() / pixels.len() as f32
                };
                pixels
                    .iter_mut()
                    .for_each(|p| *p = p.map(|c| blend(c, mean, contrast)));
            }
            2 => pixels.iter_mut().for_each(|p| {
                let gray = luma(p);
                *p = p.map(|c| blend(c, gray, saturation));
            }),
            _ => {
                if hue_shift != 0.0 {
                    pixels.iter_mut().for_each(|p| {
                        let (h, s, v) = rgb_to_hsv(*p);
                        *p = hsv_to_rgb(((h + hue_shift).rem_euclid(1.0), s, v));
                    });
                }
            }
        }
    }

    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(pixels) {
        *dst = Rgb(src.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8));
    }
    DynamicImage::ImageRgb8(out)
}

fn luma(p: &[f32; 3]) -> f32 {
    p[0] * LUMA_WEIGHTS[0] + p[1] * LUMA_WEIGHTS[1] + p[2] * LUMA_WEIGHTS[2]
}

fn blend(c: f32, other: f32, factor: f32) -> f32 {
    (factor * c + (1.0 - factor) * other).clamp(0.0, 1.0)
}

/// Components in `0..=1`, hue as a fraction of a turn.
fn rgb_to_hsv([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb((h, s, v): (f32, f32, f32)) -> [f32; 3] {
    let sector = (h * 6.0).rem_euclid(6.0);
    let i = sector.floor();
    let f = sector - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i as u8 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
