use crate::path_codec::FileAddress;
use image::ImageFormat;
use roxmltree::Document;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: String,
}

impl FileMetadata {
    pub fn new(width: u32, height: u32, mime_type: &str) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            mime_type: mime_type.to_string(),
        }
    }

    pub fn without_dimensions(mime_type: &str) -> Self {
        Self {
            width: None,
            height: None,
            mime_type: mime_type.to_string(),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Fatal errors abort the whole page; anything else only affects one tag.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub trait FileStore: Send + Sync {
    /// `Ok(None)` means the file does not exist.
    fn resolve(&self, address: &FileAddress) -> Result<Option<FileMetadata>, StoreError>;

    fn is_servable(&self, address: &FileAddress, metadata: &FileMetadata) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: HashMap<FileAddress, FileMetadata>,
    denied: HashSet<FileAddress>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: FileAddress, metadata: FileMetadata) -> &mut Self {
        self.files.insert(address, metadata);
        self
    }

    pub fn deny(&mut self, address: FileAddress) -> &mut Self {
        self.denied.insert(address);
        self
    }
}

impl FileStore for MemoryFileStore {
    fn resolve(&self, address: &FileAddress) -> Result<Option<FileMetadata>, StoreError> {
        Ok(self.files.get(address).cloned())
    }

    fn is_servable(&self, address: &FileAddress, _metadata: &FileMetadata) -> bool {
        !self.denied.contains(address)
    }
}

/// Files laid out on disk as
/// `<root>/<context>/<component>/<area>/<item><path><name>`.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, address: &FileAddress) -> Option<PathBuf> {
        let mut path = self.root.join(address.context_id.to_string());
        for segment in [address.component.as_str(), address.file_area.as_str()] {
            if !is_safe_segment(segment) {
                return None;
            }
            path.push(segment);
        }
        path.push(address.item_id.to_string());
        for dir in address.file_path.split('/').filter(|s| !s.is_empty()) {
            if !is_safe_segment(dir) {
                return None;
            }
            path.push(dir);
        }
        if !is_safe_segment(&address.file_name) {
            return None;
        }
        path.push(&address.file_name);
        Some(path)
    }

    fn read_metadata(&self, path: &Path) -> Result<FileMetadata, StoreError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        if extension.as_deref() == Some("svg") {
            let bytes = fs::read(path)?;
            return Ok(svg_metadata(&bytes)
                .unwrap_or_else(|| FileMetadata::without_dimensions(SVG_MIME)));
        }

        let reader = image::io::Reader::open(path)?.with_guessed_format()?;
        let format = reader
            .format()
            .or_else(|| extension.as_deref().and_then(format_for_extension));
        let Some(mime_type) = format.and_then(mime_for_format) else {
            // Unrecognised magic: could still be an SVG without the extension.
            let bytes = fs::read(path)?;
            return Ok(svg_metadata(&bytes)
                .unwrap_or_else(|| FileMetadata::without_dimensions("application/octet-stream")));
        };

        match reader.into_dimensions() {
            Ok((width, height)) => Ok(FileMetadata::new(width, height, mime_type)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not read image dimensions");
                Ok(FileMetadata::without_dimensions(mime_type))
            }
        }
    }
}

impl FileStore for DirFileStore {
    fn resolve(&self, address: &FileAddress) -> Result<Option<FileMetadata>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "store root {} is not a directory",
                self.root.display()
            )));
        }
        let Some(path) = self.path_for(address) else {
            debug!(%address, "rejected unsafe file address");
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        self.read_metadata(&path).map(Some)
    }

    fn is_servable(&self, _address: &FileAddress, metadata: &FileMetadata) -> bool {
        metadata.mime_type.starts_with("image/")
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

const SVG_MIME: &str = "image/svg+xml";

const RASTER_TYPES: &[(ImageFormat, &[&str], &str)] = &[
    (ImageFormat::Jpeg, &["jpg", "jpeg"], "image/jpeg"),
    (ImageFormat::Png, &["png"], "image/png"),
    (ImageFormat::Gif, &["gif"], "image/gif"),
    (ImageFormat::WebP, &["webp"], "image/webp"),
    (ImageFormat::Bmp, &["bmp"], "image/bmp"),
    (ImageFormat::Tiff, &["tif", "tiff"], "image/tiff"),
];

fn format_for_extension(ext: &str) -> Option<ImageFormat> {
    RASTER_TYPES
        .iter()
        .find(|(_, exts, _)| exts.contains(&ext))
        .map(|(format, _, _)| *format)
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    RASTER_TYPES
        .iter()
        .find(|(known, _, _)| *known == format)
        .map(|(_, _, mime)| *mime)
}

fn svg_metadata(bytes: &[u8]) -> Option<FileMetadata> {
    let text = std::str::from_utf8(bytes).ok()?;
    let doc = Document::parse(text.trim_start()).ok()?;
    let svg = doc.root_element();
    if svg.tag_name().name() != "svg" {
        return None;
    }

    let declared = svg
        .attribute("width")
        .and_then(svg_length)
        .zip(svg.attribute("height").and_then(svg_length));
    let size = declared.or_else(|| svg.attribute("viewBox").and_then(view_box_size));
    Some(match size {
        Some((w, h)) => FileMetadata::new(w, h, SVG_MIME),
        None => FileMetadata::without_dimensions(SVG_MIME),
    })
}

fn view_box_size(value: &str) -> Option<(u32, u32)> {
    let fields: Vec<&str> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();
    match fields.as_slice() {
        [_, _, w, h] => Some((svg_length(w)?, svg_length(h)?)),
        _ => None,
    }
}

/// Absolute SVG length rounded to whole pixels; percentages have no size.
fn svg_length(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.ends_with('%') {
        return None;
    }
    let value: f64 = trimmed
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim()
        .parse()
        .ok()?;
    (value > 0.0).then(|| value.round().max(1.0) as u32)
}
