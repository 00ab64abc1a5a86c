/// Preview image processing
///
/// This module turns preview files on disk into decoded images:
/// - Snapshot: one still, scaled to fit the preview area
/// - Flipbook: every frame, scaled the same way; broken frames are skipped
/// - GIF: an animated copy of a flipbook for quick playback elsewhere

use image::codecs::gif::{GifEncoder, Repeat};
use image::{imageops::FilterType, Delay, DynamicImage, Frame, ImageReader, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest size a decoded preview is kept at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewSize {
    fn default() -> Self {
        Self { width: 400, height: 300 }
    }
}

/// Decode one image and shrink it to fit `max`, keeping the aspect ratio.
/// Images already small enough are left at their size.
pub fn decode_preview(path: &Path, max: PreviewSize) -> Result<RgbaImage, String> {
    let img = open_image(path)?;
    Ok(fit(img, max).to_rgba8())
}

/// Decode every frame of a flipbook, skipping frames that fail
pub fn decode_flipbook(frames: &[PathBuf], max: PreviewSize) -> Vec<RgbaImage> {
    let decoded: Vec<RgbaImage> = frames
        .iter()
        .filter_map(|frame| match decode_preview(frame, max) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(frame = %frame.display(), error = %e, "skipping flipbook frame");
                None
            }
        })
        .collect();

    debug!(requested = frames.len(), decoded = decoded.len(), "flipbook decoded");
    decoded
}

/// Write an animated GIF of the given frames.
/// Returns how many frames made it into the file.
pub fn encode_flipbook_gif(
    frames: &[PathBuf],
    destination: &Path,
    max: PreviewSize,
    frame_rate: u32,
) -> Result<usize, String> {
    let decoded = decode_flipbook(frames, max);
    if decoded.is_empty() {
        return Err("No decodable frames for GIF".to_string());
    }

    let file = File::create(destination)
        .map_err(|e| format!("Failed to create {}: {}", destination.display(), e))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| format!("Failed to configure GIF: {}", e))?;

    let delay = Delay::from_numer_denom_ms(1000, frame_rate.max(1));
    let count = decoded.len();
    for img in decoded {
        encoder
            .encode_frame(Frame::from_parts(img, 0, 0, delay))
            .map_err(|e| format!("Failed to encode GIF frame: {}", e))?;
    }

    debug!(path = %destination.display(), frames = count, "GIF written");
    Ok(count)
}

fn open_image(path: &Path) -> Result<DynamicImage, String> {
    // Sniff the content so a mislabelled frame still decodes
    ImageReader::open(path)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?
        .with_guessed_format()
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?
        .decode()
        .map_err(|e| format!("Failed to decode {}: {}", path.display(), e))
}

fn fit(img: DynamicImage, max: PreviewSize) -> DynamicImage {
    if img.width() <= max.width && img.height() <= max.height {
        return img;
    }
    img.resize(max.width, max.height, FilterType::Lanczos3)
}
