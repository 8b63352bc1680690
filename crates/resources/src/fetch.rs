//! Fetch seam between the cache and whatever retrieves bytes for the host.
//!
//! Network transport is the host's concern; the fetchers here cover inline
//! data-URIs, local files and in-memory fixtures.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine as _;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::{ImageDecoder, ImageFormat};
use symbology::ResourceId;
use url::Url;

/// Raw bytes of a fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedAsset {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_owned),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("resource not found: {0}")]
    NotFound(ResourceId),
    #[error("malformed data uri")]
    InvalidDataUri,
    #[error("unsupported resource location: {0}")]
    Unsupported(ResourceId),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

pub trait ResourceFetcher {
    fn fetch(&mut self, id: &ResourceId) -> Result<FetchedAsset, FetchError>;
}

/// Decodes `data:` identities in place and hands everything else to `inner`.
#[derive(Debug, Default)]
pub struct DataUriFetcher<F> {
    inner: F,
}

impl<F: ResourceFetcher> DataUriFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ResourceFetcher> ResourceFetcher for DataUriFetcher<F> {
    fn fetch(&mut self, id: &ResourceId) -> Result<FetchedAsset, FetchError> {
        if id.is_data_uri() {
            return decode_data_uri(id.as_str());
        }
        self.inner.fetch(id)
    }
}

pub fn decode_data_uri(uri: &str) -> Result<FetchedAsset, FetchError> {
    let (meta, data) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(FetchError::InvalidDataUri)?;
    let (media_type, bytes) = match meta.strip_suffix(";base64") {
        Some(media_type) => (
            media_type,
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|_| FetchError::InvalidDataUri)?,
        ),
        // Percent-encoded payloads are passed through undecoded.
        None => (meta, data.as_bytes().to_vec()),
    };
    let content_type = (!media_type.is_empty()).then_some(media_type);
    Ok(FetchedAsset::new(bytes, content_type))
}

/// Reads `file://` identities from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl ResourceFetcher for FileFetcher {
    fn fetch(&mut self, id: &ResourceId) -> Result<FetchedAsset, FetchError> {
        let path = Url::parse(id.as_str())
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| FetchError::Unsupported(id.clone()))?;
        let bytes = std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(id.clone()),
            _ => FetchError::Io {
                path: path.clone(),
                source,
            },
        })?;
        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("svg") => Some("image/svg+xml"),
            Some("png") => Some("image/png"),
            Some("jpg" | "jpeg") => Some("image/jpeg"),
            _ => None,
        };
        Ok(FetchedAsset::new(bytes, content_type))
    }
}

/// In-memory fetcher that records how often each identity was requested.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    assets: BTreeMap<ResourceId, FetchedAsset>,
    fetches: BTreeMap<ResourceId, u32>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ResourceId, asset: FetchedAsset) {
        self.assets.insert(id, asset);
    }

    pub fn fetch_count(&self, id: &ResourceId) -> u32 {
        self.fetches.get(id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> u32 {
        self.fetches.values().sum()
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&mut self, id: &ResourceId) -> Result<FetchedAsset, FetchError> {
        *self.fetches.entry(id.clone()).or_insert(0) += 1;
        self.assets
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.clone()))
    }
}

/// Natural pixel size of a raster (PNG, JPEG, GIF) or SVG payload, when the
/// header or root element declares one.
pub fn sniff_natural_size(bytes: &[u8]) -> Option<(u32, u32)> {
    raster_size(bytes).or_else(|| svg_size(bytes))
}

fn raster_size(bytes: &[u8]) -> Option<(u32, u32)> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => PngDecoder::new(Cursor::new(bytes))
            .ok()
            .map(|d| d.dimensions()),
        ImageFormat::Jpeg => JpegDecoder::new(Cursor::new(bytes))
            .ok()
            .map(|d| d.dimensions()),
        ImageFormat::Gif => GifDecoder::new(Cursor::new(bytes))
            .ok()
            .map(|d| d.dimensions()),
        _ => None,
    }
}

fn svg_size(bytes: &[u8]) -> Option<(u32, u32)> {
    let text = std::str::from_utf8(bytes).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return None;
    }

    let width = root.attribute("width").and_then(svg_length);
    let height = root.attribute("height").and_then(svg_length);
    if let (Some(w), Some(h)) = (width, height) {
        return Some((w, h));
    }

    let view_box: Vec<f64> = root
        .attribute("viewBox")?
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match view_box.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((w.round() as u32, h.round() as u32)),
        _ => None,
    }
}

/// Absolute lengths only; percentages and font-relative units yield `None`.
fn svg_length(value: &str) -> Option<u32> {
    let number = value.trim().trim_end_matches("px");
    let n: f64 = number.parse().ok()?;
    (n > 0.0).then(|| n.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::{
        DataUriFetcher, FetchError, FileFetcher, MemoryFetcher, ResourceFetcher,
        decode_data_uri, sniff_natural_size,
    };
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};
    use symbology::ResourceId;

    #[test]
    fn decodes_base64_data_uris() {
        let asset = decode_data_uri("data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=").unwrap();
        assert_eq!(asset.bytes, b"<svg></svg>");
        assert_eq!(asset.content_type.as_deref(), Some("image/svg+xml"));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(FetchError::InvalidDataUri)
        ));
    }

    #[test]
    fn data_uri_fetcher_only_delegates_other_identities() {
        let mut fetcher = DataUriFetcher::new(MemoryFetcher::new());
        let inline = ResourceId::new("data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=");
        assert!(fetcher.fetch(&inline).is_ok());
        assert_eq!(fetcher.inner().total_fetches(), 0);

        let remote = ResourceId::new("http://host/x.png");
        assert!(matches!(fetcher.fetch(&remote), Err(FetchError::NotFound(_))));
        assert_eq!(fetcher.inner().fetch_count(&remote), 1);
    }

    #[test]
    fn file_fetcher_reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.svg");
        std::fs::write(&path, r#"<svg width="20" height="30"></svg>"#).unwrap();
        let url = url::Url::from_file_path(&path).unwrap();

        let asset = FileFetcher.fetch(&ResourceId::new(url.as_str())).unwrap();
        assert_eq!(asset.content_type.as_deref(), Some("image/svg+xml"));

        let missing = url::Url::from_file_path(dir.path().join("nope.svg")).unwrap();
        assert!(matches!(
            FileFetcher.fetch(&ResourceId::new(missing.as_str())),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            FileFetcher.fetch(&ResourceId::new("http://host/x.svg")),
            Err(FetchError::Unsupported(_))
        ));
    }

    #[test]
    fn sniffs_png_header() {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&[0u8; 64 * 32 * 4], 64, 32, ExtendedColorType::Rgba8)
            .unwrap();
        assert_eq!(sniff_natural_size(&png), Some((64, 32)));
        assert_eq!(sniff_natural_size(&png[..12]), None);
    }

    #[test]
    fn sniffs_svg_size_then_view_box() {
        let sized = br#"<?xml version="1.0"?><svg xmlns="x" width="20px" height="30"></svg>"#;
        assert_eq!(sniff_natural_size(sized), Some((20, 30)));

        let boxed = br#"<svg version="1.1" viewBox="0 0 16 23" preserveAspectRatio="none" ></svg>"#;
        assert_eq!(sniff_natural_size(boxed), Some((16, 23)));

        let bare = br#"<svg version="1.1" preserveAspectRatio="none" ></svg>"#;
        assert_eq!(sniff_natural_size(bare), None);
    }

    #[test]
    fn svg_attributes_parse_as_xml() {
        let quoted = b"<svg xmlns='x' width='20' height='30'></svg>";
        assert_eq!(sniff_natural_size(quoted), Some((20, 30)));

        let wrapped = b"<svg\nwidth=\"20\"\nheight=\"30\"></svg>";
        assert_eq!(sniff_natural_size(wrapped), Some((20, 30)));

        let commented = br#"<!-- <svg width="1" height="1"> --><svg width="20" height="30"></svg>"#;
        assert_eq!(sniff_natural_size(commented), Some((20, 30)));

        assert_eq!(sniff_natural_size(b"<svg width=\"20\""), None);
        assert_eq!(sniff_natural_size(br#"<html width="20" height="30"/>"#), None);
        assert_eq!(sniff_natural_size(br#"<svg width="100%" height="50%"/>"#), None);
    }
}
