use std::sync::LazyLock;

use serde_json::{Map, Value, json};

use crate::symbol::Symbol;

/// Path of the default marker pin, drawn in a 16x23 box.
pub const PIN_PATH: &str = "M8 23l0 0 0 0 0 0 0 0 0 0c-4,-5 -8,-10 -8,-14 0,-5 4,-9 8,-9l0 0 0 0c4,0 8,4 8,9 0,4 -4,9 -8,14z M5,9 a3,3 0,1,0,0,-0.9Z";

static DEFAULT_MARKER: LazyLock<Symbol> = LazyLock::new(|| {
    Symbol::from_pairs([
        ("markerType", json!("path")),
        ("markerPath", json!([{ "path": PIN_PATH, "fill": "#DE3333" }])),
        ("markerPathWidth", json!(16)),
        ("markerPathHeight", json!(23)),
        ("markerWidth", json!(24)),
        ("markerHeight", json!(34)),
    ])
});

static DEFAULT_LINE: LazyLock<Symbol> = LazyLock::new(|| {
    Symbol::from_pairs([
        ("lineColor", json!("#000")),
        ("lineWidth", json!(2)),
        ("lineOpacity", json!(1)),
    ])
});

static DEFAULT_POLYGON: LazyLock<Symbol> = LazyLock::new(|| {
    Symbol::from_pairs([
        ("lineColor", json!("#000")),
        ("lineWidth", json!(2)),
        ("lineOpacity", json!(1)),
        ("polygonFill", json!("#fff")),
        ("polygonOpacity", json!(1)),
    ])
});

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Marker,
    LineString,
    Polygon,
    /// Child geometries; the collection itself has no resolved symbol.
    Collection(Vec<Geometry>),
}

/// A geometry as seen by the symbol subsystem: its shape, the symbol the
/// user set (if any), and the feature properties expressions read.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: Shape,
    symbol: Option<Symbol>,
    properties: Map<String, Value>,
}

impl Geometry {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            symbol: None,
            properties: Map::new(),
        }
    }

    pub fn marker() -> Self {
        Self::new(Shape::Marker)
    }

    pub fn line_string() -> Self {
        Self::new(Shape::LineString)
    }

    pub fn polygon() -> Self {
        Self::new(Shape::Polygon)
    }

    pub fn collection(children: Vec<Geometry>) -> Self {
        Self::new(Shape::Collection(children))
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.set_symbol(symbol);
        self
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.shape, Shape::Collection(_))
    }

    pub fn children(&self) -> &[Geometry] {
        match &self.shape {
            Shape::Collection(children) => children,
            _ => &[],
        }
    }

    /// Feature properties of this geometry. On a collection they are
    /// inherited by children that do not set the same key.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: Map<String, Value>) {
        self.properties = properties;
    }

    /// The symbol explicitly set on this geometry.
    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// The symbol used for rendering: the explicit symbol, else the default
    /// for the shape. Collections have none.
    pub fn internal_symbol(&self) -> Option<&Symbol> {
        match &self.shape {
            Shape::Collection(_) => None,
            Shape::Marker => Some(self.symbol.as_ref().unwrap_or(&*DEFAULT_MARKER)),
            Shape::LineString => Some(self.symbol.as_ref().unwrap_or(&*DEFAULT_LINE)),
            Shape::Polygon => Some(self.symbol.as_ref().unwrap_or(&*DEFAULT_POLYGON)),
        }
    }

    /// Replaces the symbol. On a collection the symbol is pushed down to
    /// every child.
    pub fn set_symbol(&mut self, symbol: Symbol) {
        match &mut self.shape {
            Shape::Collection(children) => {
                for child in children.iter_mut() {
                    child.set_symbol(symbol.clone());
                }
            }
            _ => self.symbol = Some(symbol),
        }
    }

    /// Merges `patch` over the current internal symbol.
    pub fn update_symbol(&mut self, patch: &Symbol) {
        if let Shape::Collection(children) = &mut self.shape {
            for child in children.iter_mut() {
                child.update_symbol(patch);
            }
            return;
        }
        let merged = match self.internal_symbol() {
            Some(current) => current.merged(patch),
            None => patch.clone(),
        };
        self.symbol = Some(merged);
    }
}
