//! Image encoding: asset bytes → base64 `ImageData` for the vision API.
//!
//! Vision APIs (OpenAI, Anthropic, Gemini) accept images as base64 data-URIs
//! embedded in the JSON request body. Assets are sent in their stored
//! encoding; only animated GIFs are swapped for a PNG strip of three frames
//! so the model sees the motion instead of the first frame alone.

use super::media::{gif_strip, ImageAsset, ImageFormatTag};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// An encoded image plus whether it is a GIF strip.
pub struct EncodedImage {
    pub data: ImageData,
    pub animated_strip: bool,
}

/// Encode raw bytes with the given MIME type.
pub fn encode_bytes(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// Encode an asset for a vision request, `None` when the model cannot read
/// its format (metafiles that failed to convert, SVG, TIFF, ...).
pub fn encode_asset(asset: &ImageAsset) -> Option<EncodedImage> {
    if !asset.format.is_vision_compatible() {
        return None;
    }
    if asset.format == ImageFormatTag::Gif {
        if let Some(strip) = gif_strip(&asset.bytes) {
            return Some(EncodedImage {
                data: encode_bytes(&strip, ImageFormatTag::Png.mime_type()),
                animated_strip: true,
            });
        }
    }
    Some(EncodedImage {
        data: encode_bytes(&asset.bytes, asset.format.mime_type()),
        animated_strip: false,
    })
}
