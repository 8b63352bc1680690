use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::svg::{MarkerStyle, PathDef, svg_data_uri, svg_document};

/// Canonical key of one external visual asset: an absolute URL or a
/// generated data-URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resource a symbol needs. Width and height are rendering hints and do
/// not take part in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ResourceDescriptor {
    pub fn new(id: ResourceId, width: Option<f64>, height: Option<f64>) -> Self {
        Self { id, width, height }
    }

    pub fn same_resource(&self, other: &ResourceDescriptor) -> bool {
        self.id == other.id
    }
}

/// A resolved symbol fragment that denotes an external resource.
#[derive(Debug, Clone, Copy)]
pub enum ResourceFragment<'a> {
    File(&'a str),
    VectorPath {
        paths: &'a Value,
        style: &'a MarkerStyle,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("cannot resolve relative resource path `{0}` without a base url")]
    MissingBase(String),
    #[error("invalid resource url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Turns resolved symbol fragments into [`ResourceId`]s.
#[derive(Debug, Clone, Default)]
pub struct ResourceKeyBuilder {
    base: Option<Url>,
}

impl ResourceKeyBuilder {
    pub fn new(base: Option<Url>) -> Self {
        Self { base }
    }

    pub fn from_base_str(base: &str) -> Result<Self, KeyError> {
        let url = Url::parse(base).map_err(|source| KeyError::InvalidUrl {
            url: base.to_owned(),
            source,
        })?;
        Ok(Self::new(Some(url)))
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn build_identity(&self, fragment: &ResourceFragment<'_>) -> Result<ResourceId, KeyError> {
        match fragment {
            ResourceFragment::File(path) => self.resolve_url(path),
            ResourceFragment::VectorPath { paths, style } => {
                let defs = PathDef::list_from_json(paths);
                Ok(ResourceId(svg_data_uri(&svg_document(&defs, style))))
            }
        }
    }

    /// Resolves a file reference against the base location.
    ///
    /// `url(...)` wrappers are stripped; data-URIs and absolute URLs need no
    /// base.
    pub fn resolve_url(&self, reference: &str) -> Result<ResourceId, KeyError> {
        let reference = extract_css_url(reference.trim());
        if reference.starts_with("data:") {
            return Ok(ResourceId::new(reference));
        }
        match Url::parse(reference) {
            Ok(url) => Ok(ResourceId(url.into())),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .base
                    .as_ref()
                    .ok_or_else(|| KeyError::MissingBase(reference.to_owned()))?;
                let joined = base.join(reference).map_err(|source| KeyError::InvalidUrl {
                    url: reference.to_owned(),
                    source,
                })?;
                Ok(ResourceId(joined.into()))
            }
            Err(source) => Err(KeyError::InvalidUrl {
                url: reference.to_owned(),
                source,
            }),
        }
    }
}

fn extract_css_url(reference: &str) -> &str {
    let Some(inner) = reference
        .strip_prefix("url(")
        .and_then(|r| r.strip_suffix(')'))
    else {
        return reference;
    };
    let inner = inner.trim();
    inner
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(inner)
}
