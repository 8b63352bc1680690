//! Discovery of the external resources a symbol may need.
//!
//! Expression-valued resource properties are enumerated over their full stop
//! range so every variant can be loaded ahead of time, not only the one the
//! feature currently selects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::expression::{EvalContext, resolve, resolve_all};
use crate::geometry::Geometry;
use crate::identity::{KeyError, ResourceDescriptor, ResourceFragment, ResourceKeyBuilder};
use crate::svg::MarkerStyle;
use crate::symbol::{ResourceSlot, Symbol};
use crate::value::PropertyValue;

/// Dimensions used when a data-driven size does not resolve to a number.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDefaults {
    pub width: f64,
    pub height: f64,
}

impl DimensionDefaults {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for DimensionDefaults {
    fn default() -> Self {
        Self::new(200.0, 200.0)
    }
}

pub fn collect(
    symbol: &Symbol,
    ctx: &EvalContext<'_>,
    defaults: DimensionDefaults,
    keys: &ResourceKeyBuilder,
) -> Result<Vec<ResourceDescriptor>, KeyError> {
    let mut out = Vec::new();

    for slot in symbol.resource_slots() {
        match slot {
            ResourceSlot::File { family, source } => {
                let (w, h) = family.size_properties();
                let width = dimension(symbol, w, ctx, defaults.width);
                let height = dimension(symbol, h, ctx, defaults.height);
                for variant in resolve_all(source) {
                    for reference in file_references(variant) {
                        let id = keys.build_identity(&ResourceFragment::File(reference))?;
                        out.push(ResourceDescriptor::new(id, width, height));
                    }
                }
            }
            ResourceSlot::VectorPath { paths } => {
                let width = dimension(symbol, Some("markerWidth"), ctx, defaults.width);
                let height = dimension(symbol, Some("markerHeight"), ctx, defaults.height);
                let style = MarkerStyle::from_symbol(symbol, ctx);
                for variant in resolve_all(paths) {
                    if variant.is_null() {
                        continue;
                    }
                    let id = keys.build_identity(&ResourceFragment::VectorPath {
                        paths: variant,
                        style: &style,
                    })?;
                    out.push(ResourceDescriptor::new(id, width, height));
                }
            }
        }
    }

    Ok(out)
}

/// Collects for a geometry's internal symbol; collections concatenate their
/// children in order.
///
/// Children see the collection's feature properties, with their own values
/// taking precedence.
pub fn collect_geometry(
    geometry: &Geometry,
    zoom: Option<f64>,
    defaults: DimensionDefaults,
    keys: &ResourceKeyBuilder,
) -> Result<Vec<ResourceDescriptor>, KeyError> {
    collect_inherited(geometry, &Map::new(), zoom, defaults, keys)
}

fn collect_inherited(
    geometry: &Geometry,
    inherited: &Map<String, Value>,
    zoom: Option<f64>,
    defaults: DimensionDefaults,
    keys: &ResourceKeyBuilder,
) -> Result<Vec<ResourceDescriptor>, KeyError> {
    let properties = effective_properties(inherited, geometry.properties());

    if geometry.is_collection() {
        let mut out = Vec::new();
        for child in geometry.children() {
            out.extend(collect_inherited(child, &properties, zoom, defaults, keys)?);
        }
        return Ok(out);
    }

    let Some(symbol) = geometry.internal_symbol() else {
        return Ok(Vec::new());
    };
    let ctx = EvalContext::new(&properties).with_zoom(zoom);
    collect(symbol, &ctx, defaults, keys)
}

fn effective_properties(
    inherited: &Map<String, Value>,
    own: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = inherited.clone();
    for (k, v) in own {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn file_references(variant: &Value) -> Vec<&str> {
    match variant {
        Value::String(s) if !s.is_empty() => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Null | Value::String(_) => Vec::new(),
        other => {
            tracing::warn!("ignoring non-string resource reference: {other}");
            Vec::new()
        }
    }
}

fn dimension(
    symbol: &Symbol,
    property: Option<&str>,
    ctx: &EvalContext<'_>,
    fallback: f64,
) -> Option<f64> {
    let value = symbol.get(property?)?;
    match value {
        PropertyValue::Literal(v) => v.as_f64(),
        PropertyValue::Expression(_) => {
            Some(resolve(value, ctx).and_then(Value::as_f64).unwrap_or(fallback))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DimensionDefaults, collect, collect_geometry};
    use crate::expression::EvalContext;
    use crate::geometry::Geometry;
    use crate::identity::{KeyError, ResourceDescriptor, ResourceId, ResourceKeyBuilder};
    use crate::symbol::Symbol;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    fn keys() -> ResourceKeyBuilder {
        ResourceKeyBuilder::from_base_str("http://host/app/").unwrap()
    }

    fn run(symbol: serde_json::Value) -> Vec<ResourceDescriptor> {
        let symbol = Symbol::from_json(symbol).unwrap();
        collect(
            &symbol,
            &EvalContext::default(),
            DimensionDefaults::default(),
            &keys(),
        )
        .unwrap()
    }

    fn url(path: &str) -> ResourceId {
        ResourceId::new(format!("http://host/app/{path}"))
    }

    #[test]
    fn literal_marker_file_yields_one_descriptor() {
        let res = run(json!({
            "markerFile": "resources/x.svg",
            "markerWidth": 20,
            "markerHeight": 30
        }));
        assert_eq!(
            res,
            vec![ResourceDescriptor::new(url("resources/x.svg"), Some(20.0), Some(30.0))]
        );
    }

    #[test]
    fn interval_marker_file_enumerates_every_stop_in_order() {
        let res = run(json!({
            "markerFile": {
                "property": "count",
                "type": "interval",
                "stops": [[0, "resources/x.svg"], [9, "resources/x1.svg"], [99, "resources/x2.svg"]]
            },
            "markerWidth": 20,
            "markerHeight": 30
        }));
        let ids: Vec<&str> = res.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "http://host/app/resources/x.svg",
                "http://host/app/resources/x1.svg",
                "http://host/app/resources/x2.svg",
            ]
        );
        assert!(res.iter().all(|d| d.width == Some(20.0) && d.height == Some(30.0)));
    }

    #[test]
    fn pattern_files_use_their_own_size_properties() {
        let res = run(json!({ "polygonPatternFile": "p.png", "lineWidth": 4 }));
        assert_eq!(res, vec![ResourceDescriptor::new(url("p.png"), None, None)]);

        let res = run(json!({ "linePatternFile": "l.png", "lineWidth": 4 }));
        assert_eq!(res, vec![ResourceDescriptor::new(url("l.png"), None, Some(4.0))]);
    }

    #[test]
    fn families_follow_enumeration_order() {
        let res = run(json!({
            "markerLinePatternFile": "d.png",
            "polygonPatternFile": "b.png",
            "markerFile": "a.png",
        }));
        let ids: Vec<ResourceId> = res.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![url("a.png"), url("b.png"), url("d.png")]);
    }

    #[test]
    fn expression_dimensions_resolve_against_the_feature() {
        let symbol = Symbol::from_json(json!({
            "markerFile": "a.png",
            "markerWidth": { "property": "size", "stops": [[0, 10], [5, 50]] },
            "markerHeight": { "property": "size", "stops": [[0, "tall"]] }
        }))
        .unwrap();
        let mut props = Map::new();
        props.insert("size".into(), json!(7));
        let res = collect(
            &symbol,
            &EvalContext::new(&props),
            DimensionDefaults::new(200.0, 150.0),
            &keys(),
        )
        .unwrap();
        assert_eq!(res[0].width, Some(50.0));
        assert_eq!(res[0].height, Some(150.0));
    }

    #[test]
    fn vector_path_variants_differ_only_by_style() {
        let res = run(json!({
            "markerType": "path",
            "markerPath": {
                "property": "count",
                "type": "interval",
                "stops": [[0, "M0 0"], [9, { "path": "M0 0", "fill": "#DE3333" }], [20, { "path": "M0 0" }]]
            },
            "markerWidth": 20,
            "markerHeight": 30
        }));
        assert_eq!(res.len(), 3);
        assert_ne!(res[0].id, res[1].id);
        assert_eq!(res[0].id, res[2].id);
    }

    #[test]
    fn missing_base_is_propagated() {
        let symbol = Symbol::from_json(json!({ "markerFile": "x.svg" })).unwrap();
        let err = collect(
            &symbol,
            &EvalContext::default(),
            DimensionDefaults::default(),
            &ResourceKeyBuilder::default(),
        )
        .unwrap_err();
        assert_eq!(err, KeyError::MissingBase("x.svg".into()));
    }

    #[test]
    fn collections_concatenate_children() {
        let a = Geometry::marker()
            .with_symbol(Symbol::from_json(json!({ "markerFile": "a.png" })).unwrap());
        let b = Geometry::polygon()
            .with_symbol(Symbol::from_json(json!({ "polygonPatternFile": "b.png" })).unwrap());
        let collection = Geometry::collection(vec![a, b]);
        let res =
            collect_geometry(&collection, None, DimensionDefaults::default(), &keys()).unwrap();
        let ids: Vec<ResourceId> = res.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![url("a.png"), url("b.png")]);
    }

    #[test]
    fn collection_properties_reach_children() {
        let sized = || {
            Geometry::marker().with_symbol(
                Symbol::from_json(json!({
                    "markerFile": "a.png",
                    "markerWidth": { "property": "size", "stops": [[0, 10], [10, 20]] }
                }))
                .unwrap(),
            )
        };
        let mut own = Map::new();
        own.insert("size".into(), json!(3));
        let mut parent = Map::new();
        parent.insert("size".into(), json!(12));
        let collection = Geometry::collection(vec![sized(), sized().with_properties(own)])
            .with_properties(parent);

        let res =
            collect_geometry(&collection, None, DimensionDefaults::default(), &keys()).unwrap();
        let widths: Vec<Option<f64>> = res.iter().map(|d| d.width).collect();
        assert_eq!(widths, vec![Some(20.0), Some(10.0)]);
    }

    #[test]
    fn default_marker_needs_its_pin() {
        let res = collect_geometry(
            &Geometry::marker(),
            None,
            DimensionDefaults::default(),
            &ResourceKeyBuilder::default(),
        )
        .unwrap();
        assert_eq!(res.len(), 1);
        assert!(res[0].id.is_data_uri());
        assert_eq!((res[0].width, res[0].height), (Some(24.0), Some(34.0)));
    }
}
