use crate::models::ProcessedImages;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const CANVAS_SIZE: u32 = 1600;
const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image `{path}`: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("failed to write image `{path}`: {source}")]
    Encode {
        path: String,
        source: image::ImageError,
    },
    #[error("failed to create output directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse `#rrggbb` (or `rrggbb`); anything unreadable falls back to black,
/// matching the forgiving background-color handling of the settings file.
pub fn parse_bg_color(value: &str) -> Rgb<u8> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() == 6
        && let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&hex[0..2], 16),
            u8::from_str_radix(&hex[2..4], 16),
            u8::from_str_radix(&hex[4..6], 16),
        )
    {
        return Rgb([r, g, b]);
    }
    Rgb([0, 0, 0])
}

/// Scale-to-fit into a `size` x `size` canvas preserving aspect ratio,
/// centered on a solid background. Shrink-only: images already inside the
/// canvas are not upscaled.
pub fn resize_and_pad(img: &RgbImage, size: u32, bg: Rgb<u8>) -> RgbImage {
    let scaled = shrink_to_fit(img, size, size);
    let mut canvas = RgbImage::from_pixel(size, size, bg);
    let x = (size - scaled.width()) / 2;
    let y = (size - scaled.height()) / 2;
    imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}

/// Proportional downscale only when taller than `max_height`.
pub fn resize_by_height(img: &RgbImage, max_height: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if h <= max_height {
        return img.clone();
    }
    let new_w = ((u64::from(max_height) * u64::from(w)) / u64::from(h)).max(1) as u32;
    imageops::resize(img, new_w, max_height, FilterType::Lanczos3)
}

/// Side-by-side front+back composite at a common height, no padding. This
/// is the frame sent to the vision model so both faces land in one call.
pub fn combine_side_by_side(front: &RgbImage, back: &RgbImage) -> RgbImage {
    let front = resize_by_height(front, CANVAS_SIZE);
    let back = resize_by_height(back, CANVAS_SIZE);

    let height = front.height().max(back.height());
    let mut combined = RgbImage::from_pixel(front.width() + back.width(), height, Rgb([0, 0, 0]));
    imageops::replace(
        &mut combined,
        &front,
        0,
        i64::from((height - front.height()) / 2),
    );
    imageops::replace(
        &mut combined,
        &back,
        i64::from(front.width()),
        i64::from((height - back.height()) / 2),
    );
    combined
}

/// Pad any image into a square canvas sized to its longer edge.
pub fn pad_to_square(img: &RgbImage, bg: Rgb<u8>) -> RgbImage {
    let size = img.width().max(img.height());
    let mut canvas = RgbImage::from_pixel(size, size, bg);
    let x = (size - img.width()) / 2;
    let y = (size - img.height()) / 2;
    imageops::replace(&mut canvas, img, i64::from(x), i64::from(y));
    canvas
}

/// Produce the four JPEG variants for one front/back pair. Any decode or
/// write failure aborts the whole set; nothing is retried.
pub fn process_image_set(
    front_path: &Path,
    back_path: &Path,
    output_dir: &Path,
    index: usize,
    bg_color: &str,
) -> Result<ProcessedImages, ImageError> {
    std::fs::create_dir_all(output_dir)?;
    let bg = parse_bg_color(bg_color);

    let front = open_rgb(front_path)?;
    let back = open_rgb(back_path)?;

    let front_out = output_dir.join(format!("front_{index}.jpg"));
    let back_out = output_dir.join(format!("back_{index}.jpg"));
    let vision_out = output_dir.join(format!("vision_{index}.jpg"));
    let final_out = output_dir.join(format!("final_{index}.jpg"));

    save_jpeg(&resize_and_pad(&front, CANVAS_SIZE, bg), &front_out)?;
    save_jpeg(&resize_and_pad(&back, CANVAS_SIZE, bg), &back_out)?;

    let vision = combine_side_by_side(&front, &back);
    save_jpeg(&vision, &vision_out)?;
    save_jpeg(&pad_to_square(&vision, bg), &final_out)?;

    debug!(
        target = "lister.images",
        index = index,
        dir = %output_dir.display(),
        "image set processed"
    );

    Ok(ProcessedImages {
        front: front_out,
        back: back_out,
        vision: vision_out,
        final_square: final_out,
    })
}

fn shrink_to_fit(img: &RgbImage, max_w: u32, max_h: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w <= max_w && h <= max_h {
        return img.clone();
    }
    DynamicImage::ImageRgb8(img.clone())
        .resize(max_w, max_h, FilterType::Lanczos3)
        .to_rgb8()
}

fn open_rgb(path: &Path) -> Result<RgbImage, ImageError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| ImageError::Decode {
            path: path.display().to_string(),
            source,
        })
}

fn save_jpeg(img: &RgbImage, path: &Path) -> Result<(), ImageError> {
    let wrap = |source: image::ImageError| ImageError::Encode {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(ImageError::Io)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    img.write_with_encoder(encoder).map_err(wrap)
}
