use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::PropertyValue;

/// Symbol properties that reference an external image file.
///
/// Variants are listed in the order the collector enumerates them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileFamily {
    MarkerFile,
    PolygonPatternFile,
    LinePatternFile,
    MarkerFillPatternFile,
    MarkerLinePatternFile,
}

impl FileFamily {
    pub const ALL: [FileFamily; 5] = [
        FileFamily::MarkerFile,
        FileFamily::PolygonPatternFile,
        FileFamily::LinePatternFile,
        FileFamily::MarkerFillPatternFile,
        FileFamily::MarkerLinePatternFile,
    ];

    pub fn property(self) -> &'static str {
        match self {
            FileFamily::MarkerFile => "markerFile",
            FileFamily::PolygonPatternFile => "polygonPatternFile",
            FileFamily::LinePatternFile => "linePatternFile",
            FileFamily::MarkerFillPatternFile => "markerFillPatternFile",
            FileFamily::MarkerLinePatternFile => "markerLinePatternFile",
        }
    }

    /// `(width, height)` property names used as rendering hints.
    pub fn size_properties(self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            FileFamily::MarkerFile => (Some("markerWidth"), Some("markerHeight")),
            FileFamily::LinePatternFile => (None, Some("lineWidth")),
            FileFamily::MarkerLinePatternFile => (None, Some("markerLineWidth")),
            FileFamily::PolygonPatternFile | FileFamily::MarkerFillPatternFile => (None, None),
        }
    }
}

/// A resource-bearing part of a symbol, extracted when the symbol is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSlot {
    File {
        family: FileFamily,
        source: PropertyValue,
    },
    /// `markerType = "path"` paired with a `markerPath` definition.
    VectorPath { paths: PropertyValue },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Style specification attached to a geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Symbol {
    raw: Map<String, Value>,
    properties: BTreeMap<String, PropertyValue>,
    slots: Vec<ResourceSlot>,
}

impl Symbol {
    pub fn from_json(value: Value) -> Result<Self, SymbolError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(SymbolError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    pub fn from_map(raw: Map<String, Value>) -> Self {
        let properties: BTreeMap<String, PropertyValue> = raw
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::from_json(v.clone())))
            .collect();
        let slots = extract_slots(&properties);
        Self {
            raw,
            properties,
            slots,
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self::from_map(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(PropertyValue::as_literal)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn resource_slots(&self) -> &[ResourceSlot] {
        &self.slots
    }

    /// Shallow merge: properties of `patch` replace those of `self`.
    pub fn merged(&self, patch: &Symbol) -> Symbol {
        let mut raw = self.raw.clone();
        for (k, v) in &patch.raw {
            raw.insert(k.clone(), v.clone());
        }
        Symbol::from_map(raw)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}

impl TryFrom<Value> for Symbol {
    type Error = SymbolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Symbol::from_json(value)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Object(symbol.raw)
    }
}

fn extract_slots(properties: &BTreeMap<String, PropertyValue>) -> Vec<ResourceSlot> {
    let mut slots: Vec<ResourceSlot> = FileFamily::ALL
        .iter()
        .filter_map(|family| {
            properties
                .get(family.property())
                .map(|source| ResourceSlot::File {
                    family: *family,
                    source: source.clone(),
                })
        })
        .collect();

    let is_path_marker = properties
        .get("markerType")
        .and_then(PropertyValue::as_literal)
        .and_then(Value::as_str)
        == Some("path");
    if is_path_marker
        && let Some(paths) = properties.get("markerPath")
        && !paths.as_literal().is_some_and(Value::is_null)
    {
        slots.push(ResourceSlot::VectorPath {
            paths: paths.clone(),
        });
    }

    slots
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
