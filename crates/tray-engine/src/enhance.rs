use anyhow::Context;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;

use crate::compositor::encode_png;

const SHARPEN_SIGMA: f32 = 1.5;
const GENERAL_SIGMA: f32 = 1.0;
const UNSHARP_THRESHOLD: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceKind {
    Sharpen,
    Brightness,
    Contrast,
    #[default]
    General,
}

impl EnhanceKind {
    /// Unrecognized names map to `General`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sharpen" => EnhanceKind::Sharpen,
            "brightness" => EnhanceKind::Brightness,
            "contrast" => EnhanceKind::Contrast,
            _ => EnhanceKind::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnhanceKind::Sharpen => "sharpen",
            EnhanceKind::Brightness => "brightness",
            EnhanceKind::Contrast => "contrast",
            EnhanceKind::General => "general",
        }
    }

    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            EnhanceKind::Sharpen => image.unsharpen(SHARPEN_SIGMA, UNSHARP_THRESHOLD),
            EnhanceKind::Brightness => scale_brightness(image, 1.2),
            EnhanceKind::Contrast => linear(image, 1.3, 0.0),
            EnhanceKind::General => {
                let sharpened = image.unsharpen(GENERAL_SIGMA, UNSHARP_THRESHOLD);
                linear(&scale_brightness(&sharpened, 1.1), 1.1, 0.0)
            }
        }
    }
}

pub fn enhance_bytes(bytes: &[u8], kind: EnhanceKind) -> anyhow::Result<Vec<u8>> {
    let source = image::load_from_memory(bytes).context("failed to decode source image")?;
    encode_png(&kind.apply(&source))
}

fn scale_brightness(image: &DynamicImage, factor: f32) -> DynamicImage {
    map_rgb(image, |channel| channel * factor)
}

/// `out = multiplier * in + offset` per colour channel, alpha untouched.
fn linear(image: &DynamicImage, multiplier: f32, offset: f32) -> DynamicImage {
    map_rgb(image, |channel| multiplier * channel + offset)
}

fn map_rgb(image: &DynamicImage, f: impl Fn(f32) -> f32) -> DynamicImage {
    let source = image.to_rgba8();
    let mut out = RgbaImage::new(source.width(), source.height());
    for (x, y, pixel) in source.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let adjust = |channel: u8| f(f32::from(channel)).round().clamp(0.0, 255.0) as u8;
        out.put_pixel(x, y, Rgba([adjust(r), adjust(g), adjust(b), a]));
    }
    DynamicImage::ImageRgba8(out)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn solid(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([value; 3])))
    }

    fn first_channel(image: &DynamicImage, x: u32, y: u32) -> u8 {
        image.to_rgb8().get_pixel(x, y).0[0]
    }

    #[test]
    fn kind_names_default_to_general() {
        assert_eq!(EnhanceKind::from_name("Sharpen"), EnhanceKind::Sharpen);
        assert_eq!(EnhanceKind::from_name(" contrast "), EnhanceKind::Contrast);
        assert_eq!(EnhanceKind::from_name("denoise"), EnhanceKind::General);
        assert_eq!(EnhanceKind::from_name(""), EnhanceKind::General);
    }

    #[test]
    fn brightness_scales_channels() {
        let brighter = EnhanceKind::Brightness.apply(&solid(100));
        assert_eq!(first_channel(&brighter, 3, 3), 120);
        let clipped = EnhanceKind::Brightness.apply(&solid(250));
        assert_eq!(first_channel(&clipped, 3, 3), 255);
    }

    #[test]
    fn contrast_is_a_linear_gain_without_offset() {
        let mut split = RgbImage::from_pixel(16, 16, Rgb([100; 3]));
        for y in 0..16 {
            for x in 8..16 {
                split.put_pixel(x, y, Rgb([200; 3]));
            }
        }
        let stretched = EnhanceKind::Contrast.apply(&DynamicImage::ImageRgb8(split));
        assert_eq!(first_channel(&stretched, 0, 0), 130);
        assert_eq!(first_channel(&stretched, 15, 15), 255);

        let flat = EnhanceKind::Contrast.apply(&solid(100));
        assert_eq!(first_channel(&flat, 8, 8), 130);
    }

    #[test]
    fn general_brightens_then_applies_linear_gain() {
        let enhanced = EnhanceKind::General.apply(&solid(100));
        assert_eq!(first_channel(&enhanced, 8, 8), 121);
    }

    #[test]
    fn linear_keeps_alpha() {
        let translucent =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([50, 60, 70, 128])));
        let out = linear(&translucent, 2.0, 10.0).to_rgba8();
        assert_eq!(out.get_pixel(1, 1).0, [110, 130, 150, 128]);
    }

    #[test]
    fn enhance_bytes_round_trips_png() -> anyhow::Result<()> {
        let source = encode_png(&solid(90))?;
        let output = enhance_bytes(&source, EnhanceKind::Sharpen)?;
        let decoded = image::load_from_memory(&output)?;
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        assert!(enhance_bytes(b"nope", EnhanceKind::General).is_err());
        Ok(())
    }
}
