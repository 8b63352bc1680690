//! Standalone SVG documents for inline vector-path markers.
//!
//! Output is byte-stable for equal logical input so the generated data-URI
//! can serve as a cache key.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::Engine as _;
use serde_json::Value;

use crate::expression::{EvalContext, resolve};
use crate::symbol::Symbol;

pub const SVG_DATA_URI_PREFIX: &str = "data:image/svg+xml;base64,";

/// One `<path>` element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PathDef {
    pub d: Option<String>,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    /// Any other attributes, emitted in sorted order.
    pub attributes: BTreeMap<String, String>,
}

impl PathDef {
    /// Accepts a bare path string or a `{ path, fill?, stroke?, .. }` object.
    /// Anything else yields an empty definition.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(d) => Self {
                d: Some(d.clone()),
                ..Self::default()
            },
            Value::Object(map) => {
                let mut def = Self {
                    d: map
                        .get("path")
                        .or_else(|| map.get("d"))
                        .and_then(attr_string),
                    fill: map.get("fill").and_then(attr_string),
                    stroke: map.get("stroke").and_then(attr_string),
                    attributes: BTreeMap::new(),
                };
                for (k, v) in map {
                    if matches!(k.as_str(), "path" | "d" | "fill" | "stroke") {
                        continue;
                    }
                    if let Some(v) = attr_string(v) {
                        def.attributes.insert(k.clone(), v);
                    }
                }
                def
            }
            other => {
                tracing::warn!("malformed vector path definition: {other}");
                Self::default()
            }
        }
    }

    /// A `markerPath` value: one definition or an array of them.
    pub fn list_from_json(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_json).collect(),
            single => vec![Self::from_json(single)],
        }
    }
}

/// Marker-level presentation applied to every path of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub stroke: Option<String>,
    pub stroke_width: Option<String>,
    pub stroke_opacity: Option<String>,
    pub fill: Option<String>,
    pub fill_opacity: Option<String>,
    pub opacity: f64,
    pub view_box: Option<(String, String)>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            stroke: None,
            stroke_width: None,
            stroke_opacity: None,
            fill: None,
            fill_opacity: None,
            opacity: 1.0,
            view_box: None,
        }
    }
}

impl MarkerStyle {
    pub fn from_symbol(symbol: &Symbol, ctx: &EvalContext<'_>) -> Self {
        let get = |name: &str| symbol.get(name).and_then(|v| resolve(v, ctx));
        let text = |name: &str| get(name).and_then(attr_string);
        let number = |name: &str| get(name).and_then(Value::as_f64);

        let stroke_width = get("markerLineWidth");
        let stroke_opacity = if stroke_width.and_then(Value::as_f64) == Some(0.0) {
            Some("0".to_owned())
        } else {
            text("markerLineOpacity")
        };

        let view_box = match (text("markerPathWidth"), text("markerPathHeight")) {
            (Some(w), Some(h)) if is_truthy(&w) && is_truthy(&h) => Some((w, h)),
            _ => None,
        };

        Self {
            stroke: text("markerLineColor"),
            stroke_width: stroke_width.and_then(attr_string),
            stroke_opacity,
            fill: text("markerFill"),
            fill_opacity: text("markerFillOpacity"),
            opacity: number("markerOpacity").unwrap_or(1.0) * number("opacity").unwrap_or(1.0),
            view_box,
        }
    }

    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |name: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                out.push((name, v.clone()));
            }
        };
        push("stroke", &self.stroke);
        push("stroke-width", &self.stroke_width);
        push("stroke-opacity", &self.stroke_opacity);
        out.push(("stroke-linecap", "butt".to_owned()));
        out.push(("stroke-linejoin", "round".to_owned()));
        if let Some(v) = &self.fill {
            out.push(("fill", v.clone()));
        }
        if let Some(v) = &self.fill_opacity {
            out.push(("fill-opacity", v.clone()));
        }
        out
    }
}

pub fn svg_document(paths: &[PathDef], style: &MarkerStyle) -> String {
    let mut parts: Vec<String> = vec![
        r#"<svg version="1.1""#.to_owned(),
        r#"xmlns="http://www.w3.org/2000/svg""#.to_owned(),
    ];
    if style.opacity < 1.0 {
        parts.push(format!(r#"opacity="{}""#, style.opacity));
    }
    if let Some((w, h)) = &style.view_box {
        parts.push(format!(r#"viewBox="0 0 {} {}""#, escape(w), escape(h)));
    }
    parts.push(r#"preserveAspectRatio="none""#.to_owned());
    parts.push("><defs></defs>".to_owned());

    let marker_attrs = style.attributes();
    for path in paths {
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(fill) = &path.fill {
            attrs.push(("fill", fill.as_str()));
        }
        if let Some(stroke) = &path.stroke {
            attrs.push(("stroke", stroke.as_str()));
        }
        for (k, v) in &path.attributes {
            attrs.push((k.as_str(), v.as_str()));
        }
        // Marker-level styles win over the path's own value but keep its slot.
        for (name, value) in &marker_attrs {
            match attrs.iter_mut().find(|slot| slot.0 == *name) {
                Some(slot) => slot.1 = value.as_str(),
                None => attrs.push((*name, value.as_str())),
            }
        }
        attrs.push(("d", path.d.as_deref().unwrap_or("")));

        let mut element = String::from("<path ");
        for (k, v) in attrs {
            let _ = write!(element, r#" {k}="{}""#, escape(v));
        }
        element.push_str("></path>");
        parts.push(element);
    }

    parts.push("</svg>".to_owned());
    parts.join(" ")
}

pub fn svg_data_uri(document: &str) -> String {
    format!(
        "{SVG_DATA_URI_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(document)
    )
}

fn attr_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_truthy(text: &str) -> bool {
    !text.is_empty() && text != "0" && text != "false"
}

fn escape(text: &str) -> std::borrow::Cow<'_, str> {
    if !text.contains(['&', '<', '"']) {
        return std::borrow::Cow::Borrowed(text);
    }
    std::borrow::Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('"', "&quot;"),
    )
}
