//! Image classification and normalisation.
//!
//! Every picture referenced by the document model goes through three steps:
//!
//! 1. **Plan**: give it a deterministic file stem from its position
//!    (`paragraph{P}_image{K}` for Word, `slide{S}_image{K}` for slides).
//! 2. **Classify**: sniff the real format from the bytes. Office packages
//!    routinely mislabel media, so the part extension is only a last resort.
//! 3. **Normalise**: browsers cannot show WMF/EMF, so metafiles are
//!    rasterised to PNG by an external [`RasterConverter`]. Anything else is
//!    written untouched. A failed conversion keeps the original file and
//!    records an [`AssetWarning`].
//!
//! This stage runs inside `spawn_blocking`: it reads the ZIP, writes files
//! and may start an ImageMagick process.

use crate::config::ImageHandling;
use crate::error::{AssetWarning, ConversionError, Office2MdError};
use crate::math::{self, EquationKind};
use crate::package::model::{Block, ImageRef, ImageTarget, Inline};
use crate::package::OfficePackage;
use crate::pipeline::slides::SlideRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

// ── Format detection ──────────────────────────────────────────────────────

/// The real encoding of an image, detected from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatTag {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Svg,
    Wmf,
    Emf,
    Unknown,
}

/// What the normaliser does with a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    /// Displayable as-is.
    Native,
    /// Windows metafile; needs rasterising.
    Metafile,
    /// Kept as-is under its package extension.
    Unrecognized,
}

impl ImageFormatTag {
    /// Detect the format from magic bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A])
            || (bytes.len() >= 4 && matches!(bytes[0], 1 | 2) && bytes[1..4] == [0x00, 0x09, 0x00])
        {
            return ImageFormatTag::Wmf;
        }
        if bytes.len() >= 44 && bytes[..4] == [0x01, 0x00, 0x00, 0x00] && &bytes[40..44] == b" EMF" {
            return ImageFormatTag::Emf;
        }
        if let Ok(format) = image::guess_format(bytes) {
            match format {
                image::ImageFormat::Png => return ImageFormatTag::Png,
                image::ImageFormat::Jpeg => return ImageFormatTag::Jpeg,
                image::ImageFormat::Gif => return ImageFormatTag::Gif,
                image::ImageFormat::Bmp => return ImageFormatTag::Bmp,
                image::ImageFormat::Tiff => return ImageFormatTag::Tiff,
                image::ImageFormat::WebP => return ImageFormatTag::Webp,
                _ => {}
            }
        }
        if looks_like_svg(bytes) {
            return ImageFormatTag::Svg;
        }
        ImageFormatTag::Unknown
    }

    pub fn class(self) -> ImageClass {
        match self {
            ImageFormatTag::Wmf | ImageFormatTag::Emf => ImageClass::Metafile,
            ImageFormatTag::Unknown => ImageClass::Unrecognized,
            _ => ImageClass::Native,
        }
    }

    /// File extension without the dot; empty for `Unknown`.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormatTag::Png => "png",
            ImageFormatTag::Jpeg => "jpg",
            ImageFormatTag::Gif => "gif",
            ImageFormatTag::Bmp => "bmp",
            ImageFormatTag::Tiff => "tiff",
            ImageFormatTag::Webp => "webp",
            ImageFormatTag::Svg => "svg",
            ImageFormatTag::Wmf => "wmf",
            ImageFormatTag::Emf => "emf",
            ImageFormatTag::Unknown => "",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormatTag::Png => "image/png",
            ImageFormatTag::Jpeg => "image/jpeg",
            ImageFormatTag::Gif => "image/gif",
            ImageFormatTag::Bmp => "image/bmp",
            ImageFormatTag::Tiff => "image/tiff",
            ImageFormatTag::Webp => "image/webp",
            ImageFormatTag::Svg => "image/svg+xml",
            ImageFormatTag::Wmf => "image/wmf",
            ImageFormatTag::Emf => "image/emf",
            ImageFormatTag::Unknown => "application/octet-stream",
        }
    }

    /// Formats vision models accept.
    pub fn is_vision_compatible(self) -> bool {
        matches!(
            self,
            ImageFormatTag::Png | ImageFormatTag::Jpeg | ImageFormatTag::Gif | ImageFormatTag::Webp
        )
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && trimmed.contains("<svg"))
}

// ── Raster conversion ─────────────────────────────────────────────────────

/// External raster-conversion service.
pub trait RasterConverter: Send + Sync {
    /// Rasterise a metafile to PNG bytes.
    fn rasterize(&self, bytes: &[u8], format: ImageFormatTag) -> Result<Vec<u8>, ConversionError>;
}

/// Rasterises metafiles by running ImageMagick.
#[derive(Debug, Clone)]
pub struct ImageMagickConverter {
    /// Passed to ImageMagick as `-limit time`.
    pub timeout_secs: u64,
}

impl Default for ImageMagickConverter {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl ImageMagickConverter {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// `magick` (ImageMagick 7) or `convert` (ImageMagick 6).
    fn binary() -> Result<PathBuf, ConversionError> {
        which::which("magick")
            .or_else(|_| which::which("convert"))
            .map_err(|e| ConversionError::ToolNotFound(format!("magick/convert: {e}")))
    }

    /// Arguments after the binary name.
    fn args(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec![
            "-limit".into(),
            "time".into(),
            self.timeout_secs.to_string().into(),
            "-density".into(),
            "600".into(),
        ];
        args.push(input.as_os_str().to_owned());
        for a in [
            "-background",
            "white",
            "-alpha",
            "remove",
            "-colorspace",
            "RGB",
            "-quality",
            "100",
        ] {
            args.push(a.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl RasterConverter for ImageMagickConverter {
    fn rasterize(&self, bytes: &[u8], format: ImageFormatTag) -> Result<Vec<u8>, ConversionError> {
        let binary = Self::binary()?;
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(format!("input.{}", format.extension()));
        let output = scratch.path().join("output.png");
        std::fs::write(&input, bytes)?;

        debug!("Running {} on {} bytes of {:?}", binary.display(), bytes.len(), format);
        let result = Command::new(&binary)
            .args(self.args(&input, &output))
            .output()?;
        if !result.status.success() {
            return Err(ConversionError::ToolFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let png = match std::fs::read(&output) {
            Ok(png) => png,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::EmptyOutput)
            }
            Err(e) => return Err(e.into()),
        };
        if png.is_empty() {
            return Err(ConversionError::EmptyOutput);
        }
        Ok(png)
    }
}

// ── Assets ────────────────────────────────────────────────────────────────

/// Why the image is in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Picture,
    /// Preview picture of an equation that could not be translated.
    EquationPreview { display: bool },
}

/// An image after extraction (and normalisation, when it applied).
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// [`ImageRef::id`] this asset belongs to.
    pub id: usize,
    pub bytes: Vec<u8>,
    pub format: ImageFormatTag,
    pub original_format: ImageFormatTag,
    pub file_name: String,
    /// Relative link target or `data:` URI.
    pub display_path: String,
    /// Where the file was written; `None` in data-URI mode.
    pub disk_path: Option<PathBuf>,
    pub origin: ImageOrigin,
    pub description: Option<String>,
    pub name: Option<String>,
    pub caption: Option<String>,
    pub recognized_latex: Option<String>,
    /// Rasterised from a metafile.
    pub converted: bool,
}

/// One image reference with its output stem.
#[derive(Debug, Clone)]
pub struct PlannedImage {
    pub image: ImageRef,
    pub stem: String,
    pub origin: ImageOrigin,
}

struct Planner {
    extract_equations: bool,
    scope: String,
    ordinal: usize,
    paragraphs: usize,
    count_paragraphs: bool,
    out: Vec<PlannedImage>,
}

impl Planner {
    fn new(extract_equations: bool, count_paragraphs: bool) -> Self {
        Self {
            extract_equations,
            scope: String::from("paragraph0"),
            ordinal: 0,
            paragraphs: 0,
            count_paragraphs,
            out: Vec::new(),
        }
    }

    fn enter_scope(&mut self, scope: String) {
        self.scope = scope;
        self.ordinal = 0;
    }

    fn blocks(&mut self, blocks: &[Block]) {
        for block in blocks {
            match block {
                Block::Paragraph(p) => {
                    if self.count_paragraphs {
                        self.paragraphs += 1;
                        self.enter_scope(format!("paragraph{}", self.paragraphs));
                    }
                    self.inlines(&p.inlines);
                }
                Block::Table(t) => {
                    for cell in t.rows.iter().flatten() {
                        self.blocks(cell);
                    }
                }
                Block::Figure(image) => self.push(image, ImageOrigin::Picture),
            }
        }
    }

    fn inlines(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            match inline {
                Inline::Image(image) => self.push(image, ImageOrigin::Picture),
                Inline::Link { children, .. } => self.inlines(children),
                Inline::Equation(eq) => {
                    let Some(fallback) = &eq.fallback else {
                        continue;
                    };
                    let needs_image = eq.kind == EquationKind::ImageFallback
                        || !self.extract_equations
                        || math::translate(eq).is_err();
                    if needs_image {
                        self.push(
                            fallback,
                            ImageOrigin::EquationPreview {
                                display: eq.display,
                            },
                        );
                    }
                }
                Inline::Text(_) | Inline::LineBreak => {}
            }
        }
    }

    fn push(&mut self, image: &ImageRef, origin: ImageOrigin) {
        self.ordinal += 1;
        self.out.push(PlannedImage {
            image: image.clone(),
            stem: format!("{}_image{}", self.scope, self.ordinal),
            origin,
        });
    }
}

/// Stems for a Word body: `paragraph{P}_image{K}`, `P` counting every
/// paragraph (table cells included) in document order.
pub fn plan_word_images(blocks: &[Block], extract_equations: bool) -> Vec<PlannedImage> {
    let mut planner = Planner::new(extract_equations, true);
    planner.blocks(blocks);
    planner.out
}

/// Stems for a deck: `slide{S}_image{K}`, notes sharing the slide's scope.
pub fn plan_slide_images(slides: &[SlideRecord], extract_equations: bool) -> Vec<PlannedImage> {
    let mut planner = Planner::new(extract_equations, false);
    for slide in slides {
        planner.enter_scope(format!("slide{}", slide.index));
        planner.blocks(&slide.blocks);
        planner.blocks(&slide.notes);
    }
    planner.out
}

/// Where and how extracted images are written.
pub struct ExtractOptions<'a> {
    pub handling: ImageHandling,
    /// On-disk image directory (created on first write).
    pub images_dir: PathBuf,
    /// Prefix of relative links, e.g. `report_images`.
    pub link_prefix: String,
    /// `None` disables metafile conversion.
    pub converter: Option<&'a dyn RasterConverter>,
}

/// Read, classify, write and normalise every planned image.
///
/// Missing parts and failed conversions become warnings; only failing to
/// create the image directory or write a file is fatal.
pub fn extract_images(
    pkg: &mut OfficePackage,
    plan: &[PlannedImage],
    opts: &ExtractOptions<'_>,
) -> Result<(Vec<ImageAsset>, Vec<AssetWarning>), Office2MdError> {
    let mut assets = Vec::with_capacity(plan.len());
    let mut warnings = Vec::new();

    for planned in plan {
        let part = match &planned.image.target {
            ImageTarget::Part(part) => part,
            ImageTarget::External(url) => {
                debug!("Linked image {} is left as an external reference", url);
                continue;
            }
            ImageTarget::Unresolved(rid) => {
                warn!("Image relationship '{}' does not resolve", rid);
                warnings.push(AssetWarning::MissingImagePart {
                    target: rid.clone(),
                });
                continue;
            }
        };
        let Some(bytes) = pkg.read_part(part)? else {
            warn!("Image part '{}' is missing from the package", part);
            warnings.push(AssetWarning::MissingImagePart {
                target: part.clone(),
            });
            continue;
        };

        let format = ImageFormatTag::detect(&bytes);
        let extension = match format {
            ImageFormatTag::Unknown => part_extension(part),
            known => known.extension().to_string(),
        };
        let file_name = if extension.is_empty() {
            planned.stem.clone()
        } else {
            format!("{}.{}", planned.stem, extension)
        };

        let mut asset = ImageAsset {
            id: planned.image.id,
            bytes,
            format,
            original_format: format,
            file_name,
            display_path: String::new(),
            disk_path: None,
            origin: planned.origin,
            description: planned.image.description.clone(),
            name: planned.image.name.clone(),
            caption: None,
            recognized_latex: None,
            converted: false,
        };

        if opts.handling == ImageHandling::Extract {
            write_asset(&mut asset, &opts.images_dir)?;
        }
        if let Some(warning) = normalize_asset(&mut asset, opts.converter)? {
            warnings.push(warning);
        }
        asset.display_path = match opts.handling {
            ImageHandling::Extract => link_path(&opts.link_prefix, &asset.file_name),
            ImageHandling::DataUri => data_uri(&asset),
        };
        assets.push(asset);
    }

    if !assets.is_empty() {
        info!(
            "Extracted {} images ({} converted)",
            assets.len(),
            assets.iter().filter(|a| a.converted).count()
        );
    }
    Ok((assets, warnings))
}

/// Rasterise a metafile once. Native and unrecognised images are untouched.
///
/// On success the PNG replaces the asset (and its file on disk, if any). On
/// failure the original is kept and a warning returned.
pub fn normalize_asset(
    asset: &mut ImageAsset,
    converter: Option<&dyn RasterConverter>,
) -> Result<Option<AssetWarning>, Office2MdError> {
    if asset.format.class() != ImageClass::Metafile {
        return Ok(None);
    }
    let Some(converter) = converter else {
        return Ok(None);
    };

    match converter.rasterize(&asset.bytes, asset.format) {
        Ok(png) => {
            let stem = asset
                .file_name
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| asset.file_name.clone());
            let png_name = format!("{stem}.png");
            if let Some(old_path) = asset.disk_path.take() {
                let new_path = old_path.with_file_name(&png_name);
                std::fs::write(&new_path, &png).map_err(|source| {
                    Office2MdError::ImageWriteFailed {
                        path: new_path.clone(),
                        source,
                    }
                })?;
                if let Err(e) = std::fs::remove_file(&old_path) {
                    warn!("Could not remove original {}: {}", old_path.display(), e);
                }
                asset.disk_path = Some(new_path);
            }
            debug!("Rasterised {} → {}", asset.file_name, png_name);
            asset.bytes = png;
            asset.format = ImageFormatTag::Png;
            asset.file_name = png_name;
            asset.converted = true;
            Ok(None)
        }
        Err(e) => {
            warn!("Could not convert {} to PNG, keeping original: {}", asset.file_name, e);
            Ok(Some(AssetWarning::ConversionFailed {
                file: asset.file_name.clone(),
                detail: e.to_string(),
            }))
        }
    }
}

fn write_asset(asset: &mut ImageAsset, dir: &Path) -> Result<(), Office2MdError> {
    std::fs::create_dir_all(dir).map_err(|source| Office2MdError::ImageWriteFailed {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(&asset.file_name);
    std::fs::write(&path, &asset.bytes).map_err(|source| Office2MdError::ImageWriteFailed {
        path: path.clone(),
        source,
    })?;
    asset.disk_path = Some(path);
    Ok(())
}

fn link_path(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

fn data_uri(asset: &ImageAsset) -> String {
    format!(
        "data:{};base64,{}",
        asset.format.mime_type(),
        STANDARD.encode(&asset.bytes)
    )
}

fn part_extension(part: &str) -> String {
    let file = part.rsplit('/').next().unwrap_or(part);
    match file.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

// ── Animated GIFs ─────────────────────────────────────────────────────────

/// First, middle and last frame of an animated GIF side by side, as PNG.
///
/// `None` for single-frame or undecodable GIFs. Used for caption requests
/// only; the document keeps linking the GIF itself.
pub fn gif_strip(bytes: &[u8]) -> Option<Vec<u8>> {
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;

    let decoder = GifDecoder::new(Cursor::new(bytes)).ok()?;
    let frames = decoder.into_frames().collect_frames().ok()?;
    if frames.len() < 2 {
        return None;
    }
    let picks = [0, frames.len() / 2, frames.len() - 1];
    let width: u32 = picks.iter().map(|&i| frames[i].buffer().width()).sum();
    let height = picks
        .iter()
        .map(|&i| frames[i].buffer().height())
        .max()
        .unwrap_or(0);

    let mut canvas = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut x = 0i64;
    for &i in &picks {
        let frame = frames[i].buffer();
        image::imageops::overlay(&mut canvas, frame, x, 0);
        x += i64::from(frame.width());
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .ok()?;
    Some(out)
}
