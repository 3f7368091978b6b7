use ab_glyph::{FontVec, PxScale};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::TransformedImage;

pub const OUTPUT_WIDTH: u32 = 1200;
pub const OUTPUT_HEIGHT: u32 = 675;
pub const JPEG_QUALITY: u8 = 85;

const TRIM_TOLERANCE: u8 = 20;
/// Trim only when at least this share of each dimension survives
const TRIM_MIN_KEPT: f32 = 0.75;
const SATURATION: f32 = 1.05;
const CONTRAST: f32 = 10.0;
const UNSHARP_SIGMA: f32 = 1.5;
const UNSHARP_THRESHOLD: i32 = 3;
const GRADIENT_SHARE: f32 = 0.25;
const GRADIENT_MAX_ALPHA: f32 = 0.75;
const LOGO_HEIGHT_SHARE: f32 = 0.08;
const PADDING_SHARE: f32 = 0.02;
const TEXT_WIDTH_SHARE: f32 = 0.45;
const SHADOW_OFFSET: i32 = 2;

/// Fonts tried when no title font is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Turns a generated image into the branded 16:9 featured image.
///
/// Logo and font are loaded once up front so a bad path fails before any
/// network work is spent on the image.
pub struct ImageTransformer {
    logo: Option<RgbaImage>,
    font: Option<FontVec>,
}

impl ImageTransformer {
    pub fn new(logo_path: Option<&Path>, font_path: Option<&Path>) -> Result<Self> {
        let logo = logo_path.map(load_logo).transpose()?;
        let font = match font_path {
            Some(path) => Some(load_font(path)?),
            None => system_font(),
        };
        if font.is_none() {
            tracing::warn!("No title font configured or found on this system, title overlay disabled");
        }
        Ok(Self { logo, font })
    }

    pub fn transform(&self, raw: &[u8], title: &str) -> Result<TransformedImage> {
        let decoded = image::load_from_memory(raw)?;
        tracing::debug!(width = decoded.width(), height = decoded.height(), "Decoded generated image");

        let flat = flatten_on_white(&decoded.to_rgba8());
        let trimmed = trim_borders(&flat, TRIM_TOLERANCE);
        let mut frame = cover_crop(&trimmed, OUTPUT_WIDTH, OUTPUT_HEIGHT);

        adjust_saturation(&mut frame, SATURATION);
        let frame = imageops::contrast(&frame, CONTRAST);
        let mut frame = imageops::unsharpen(&frame, UNSHARP_SIGMA, UNSHARP_THRESHOLD);

        apply_bottom_gradient(&mut frame);

        let mut canvas = DynamicImage::ImageRgb8(frame).to_rgba8();
        if let Some(logo) = &self.logo {
            overlay_logo(&mut canvas, logo);
        }
        if let Some(font) = &self.font {
            draw_title(&mut canvas, font, title);
        }
        let frame = DynamicImage::ImageRgba8(canvas).to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&frame)?;

        let data_uri = format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg));
        tracing::info!(
            width = frame.width(),
            height = frame.height(),
            jpeg_bytes = jpeg.len(),
            "Featured image transformed"
        );

        Ok(TransformedImage {
            jpeg,
            data_uri,
            width: frame.width(),
            height: frame.height(),
        })
    }
}

fn load_logo(path: &Path) -> Result<RgbaImage> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Branding logo not found: {}",
            path.display()
        )));
    }
    Ok(image::open(path)?.to_rgba8())
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Font(format!("cannot read {}: {}", path.display(), e)))?;
    FontVec::try_from_vec(bytes)
        .map_err(|_| Error::Font(format!("{} is not a usable TrueType/OpenType font", path.display())))
}

fn system_font() -> Option<FontVec> {
    SYSTEM_FONTS.iter().map(PathBuf::from).find_map(|path| {
        let font = load_font(&path).ok()?;
        tracing::debug!(font = %path.display(), "Using system font for title overlay");
        Some(font)
    })
}

fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn is_border_pixel(pixel: &Rgb<u8>, tolerance: u8) -> bool {
    let near_black = pixel.0.iter().all(|&c| c <= tolerance);
    let near_white = pixel.0.iter().all(|&c| c >= 255 - tolerance);
    near_black || near_white
}

/// Crop away uniform black or white margins
fn trim_borders(img: &RgbImage, tolerance: u8) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;

    for (x, y, pixel) in img.enumerate_pixels() {
        if !is_border_pixel(pixel, tolerance) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x > max_x || min_y > max_y {
        return img.clone();
    }

    let kept_w = max_x - min_x + 1;
    let kept_h = max_y - min_y + 1;
    if (kept_w, kept_h) == (width, height) {
        return img.clone();
    }
    if (kept_w as f32) < width as f32 * TRIM_MIN_KEPT || (kept_h as f32) < height as f32 * TRIM_MIN_KEPT {
        tracing::debug!(kept_w, kept_h, "Border trim would remove too much, skipping");
        return img.clone();
    }

    tracing::debug!(x = min_x, y = min_y, kept_w, kept_h, "Trimmed uniform borders");
    imageops::crop_imm(img, min_x, min_y, kept_w, kept_h).to_image()
}

/// Scale to cover `width`x`height`, then center-crop to exactly that size
fn cover_crop(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = img.dimensions();
    let scale = (width as f64 / src_w as f64).max(height as f64 / src_h as f64);
    let scaled_w = ((src_w as f64 * scale).round() as u32).max(width);
    let scaled_h = ((src_h as f64 * scale).round() as u32).max(height);

    let resized = imageops::resize(img, scaled_w, scaled_h, FilterType::Lanczos3);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&resized, x, y, width, height).to_image()
}

fn adjust_saturation(img: &mut RgbImage, factor: f32) {
    for pixel in img.pixels_mut() {
        let [r, g, b] = pixel.0.map(|c| c as f32);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        pixel.0 = [r, g, b].map(|c| (luma + (c - luma) * factor).round().clamp(0.0, 255.0) as u8);
    }
}

/// Darken the bottom band so the title stays readable
fn apply_bottom_gradient(img: &mut RgbImage) {
    let height = img.height();
    let band = ((height as f32 * GRADIENT_SHARE) as u32).max(1);
    let start = height - band;

    for y in start..height {
        let t = (y - start) as f32 / band as f32;
        let keep = 1.0 - GRADIENT_MAX_ALPHA * t;
        for x in 0..img.width() {
            let pixel = img.get_pixel_mut(x, y);
            pixel.0 = pixel.0.map(|c| (c as f32 * keep).round() as u8);
        }
    }
}

fn overlay_logo(canvas: &mut RgbaImage, logo: &RgbaImage) {
    let target_h = ((canvas.height() as f32 * LOGO_HEIGHT_SHARE) as u32).max(1);
    let target_w = ((logo.width() as f32 * target_h as f32 / logo.height().max(1) as f32) as u32).max(1);
    let resized = imageops::resize(logo, target_w, target_h, FilterType::Lanczos3);

    let padding = (canvas.height() as f32 * PADDING_SHARE) as i64;
    let x = canvas.width() as i64 - target_w as i64 - padding;
    imageops::overlay(canvas, &resized, x, padding);
}

fn title_scale(height: u32) -> PxScale {
    PxScale::from(((height as f32 * 0.035) as u32).max(20) as f32)
}

/// Greedy word wrap against the rendered width
fn wrap_title(font: &FontVec, scale: PxScale, title: &str, max_width: u32) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in title.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && text_size(scale, font, &candidate).0 > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_title(canvas: &mut RgbaImage, font: &FontVec, title: &str) {
    let scale = title_scale(canvas.height());
    let max_width = (canvas.width() as f32 * TEXT_WIDTH_SHARE) as u32;
    let lines = wrap_title(font, scale, title, max_width);
    if lines.is_empty() {
        return;
    }

    let padding = (canvas.height() as f32 * PADDING_SHARE) as i32;
    let line_height = (scale.y * 1.2).ceil() as i32;
    let mut y = canvas.height() as i32 - padding - line_height * lines.len() as i32;

    for line in &lines {
        let (line_w, _) = text_size(scale, font, line);
        let x = canvas.width() as i32 - padding - line_w as i32;
        draw_text_mut(
            canvas,
            Rgba([0, 0, 0, 180]),
            x + SHADOW_OFFSET,
            y + SHADOW_OFFSET,
            scale,
            font,
            line,
        );
        draw_text_mut(canvas, Rgba([255, 255, 255, 255]), x, y, scale, font, line);
        y += line_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_png;

    fn plain() -> ImageTransformer {
        ImageTransformer {
            logo: None,
            font: None,
        }
    }

    #[test]
    fn test_output_is_exact_16_by_9_and_valid_base64() {
        let out = plain().transform(&sample_png(1200, 800), "Bitcoin ETFs").unwrap();
        assert_eq!((out.width, out.height), (OUTPUT_WIDTH, OUTPUT_HEIGHT));

        let encoded = out.data_uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, out.jpeg);

        let reloaded = image::load_from_memory(&decoded).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (1200, 675));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let raw = sample_png(1024, 576);
        let transformer = plain();
        let first = transformer.transform(&raw, "Same Title").unwrap();
        let second = transformer.transform(&raw, "Same Title").unwrap();
        assert_eq!(first.jpeg, second.jpeg);
        assert_eq!(first.data_uri, second.data_uri);
    }

    #[test]
    fn test_small_and_portrait_inputs_are_covered() {
        for (w, h) in [(300, 200), (576, 1024)] {
            let out = plain().transform(&sample_png(w, h), "t").unwrap();
            assert_eq!((out.width, out.height), (1200, 675));
        }
    }

    #[test]
    fn test_garbage_bytes_are_fatal() {
        let err = plain().transform(b"not an image", "t").unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_trim_removes_white_margins() {
        let img = RgbImage::from_fn(1000, 600, |x, y| {
            if (50..950).contains(&x) && (50..550).contains(&y) {
                Rgb([200, 30, 30])
            } else {
                Rgb([255, 255, 255])
            }
        });
        assert_eq!(trim_borders(&img, TRIM_TOLERANCE).dimensions(), (900, 500));
    }

    #[test]
    fn test_trim_skipped_when_too_much_would_go() {
        let img = RgbImage::from_fn(1000, 600, |x, y| {
            if (400..500).contains(&x) && (250..350).contains(&y) {
                Rgb([10, 120, 200])
            } else {
                Rgb([0, 0, 0])
            }
        });
        assert_eq!(trim_borders(&img, TRIM_TOLERANCE).dimensions(), (1000, 600));
    }

    #[test]
    fn test_transparency_flattens_to_white() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten_on_white(&img).get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_gradient_darkens_only_bottom_band() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([200, 200, 200]));
        apply_bottom_gradient(&mut img);
        assert_eq!(img.get_pixel(50, 10), &Rgb([200, 200, 200]));
        assert!(img.get_pixel(50, 99).0[0] < 80);
    }

    #[test]
    fn test_missing_logo_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("logo.png");
        let err = ImageTransformer::new(Some(missing.as_path()), None).err().unwrap();
        assert!(err.to_string().contains("logo.png"));
    }

    #[test]
    fn test_unreadable_font_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("font.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let err = ImageTransformer::new(None, Some(bogus.as_path())).err().unwrap();
        assert!(matches!(err, Error::Font(_)));
    }

    #[test]
    fn test_logo_is_composited_top_right() {
        let dir = tempfile::tempdir().unwrap();
        let logo_path = dir.path().join("logo.png");
        RgbaImage::from_pixel(40, 40, Rgba([0, 255, 0, 255]))
            .save(&logo_path)
            .unwrap();

        let transformer = ImageTransformer {
            logo: Some(load_logo(&logo_path).unwrap()),
            font: None,
        };
        let out = transformer
            .transform(&sample_png(1200, 675), "t")
            .unwrap();
        let img = image::load_from_memory(&out.jpeg).unwrap().to_rgb8();

        // 8% of 675 is 54px, padded 13px from the top-right corner
        let Rgb([r, g, b]) = *img.get_pixel(1200 - 13 - 27, 13 + 27);
        assert!(g > 200 && r < 60 && b < 60, "got {r},{g},{b}");
    }
}
