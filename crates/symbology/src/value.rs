use serde_json::{Map, Value};

/// A symbol property: either a literal JSON value or a data-driven expression.
///
/// Classification happens once, when the symbol is built. A JSON object is an
/// expression iff it carries a `stops` array; everything else is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Literal(Value),
    Expression(Expression),
}

impl PropertyValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) if map.get("stops").is_some_and(Value::is_array) => {
                PropertyValue::Expression(Expression::from_object(&map))
            }
            other => PropertyValue::Literal(other),
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, PropertyValue::Expression(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            PropertyValue::Literal(v) => Some(v),
            PropertyValue::Expression(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpressionKind {
    /// Greatest threshold not above the input wins.
    Interval,
    /// Exact match on the stop input.
    Categorical,
}

impl ExpressionKind {
    fn parse(name: Option<&str>) -> Self {
        match name {
            Some("categorical") => ExpressionKind::Categorical,
            None | Some("interval") => ExpressionKind::Interval,
            Some(other) => {
                tracing::debug!("unsupported expression type `{other}`, evaluating as interval");
                ExpressionKind::Interval
            }
        }
    }
}

/// One `(input, output)` pair of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub input: Value,
    pub output: Value,
}

impl Stop {
    pub fn new(input: impl Into<Value>, output: impl Into<Value>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Numeric threshold of the stop; NaN for non-numeric inputs so the stop
    /// never qualifies during evaluation.
    pub fn threshold(&self) -> f64 {
        self.input.as_f64().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Feature property read as the input. `None` means the camera zoom.
    pub property: Option<String>,
    pub kind: ExpressionKind,
    pub stops: Vec<Stop>,
}

impl Expression {
    pub fn interval(property: impl Into<String>, stops: Vec<Stop>) -> Self {
        Self {
            property: Some(property.into()),
            kind: ExpressionKind::Interval,
            stops,
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let stops = map
            .get("stops")
            .and_then(Value::as_array)
            .map(|raw| {
                raw.iter()
                    .filter_map(|stop| match stop.as_array().map(Vec::as_slice) {
                        Some([input, output, ..]) => Some(Stop::new(input.clone(), output.clone())),
                        _ => {
                            tracing::warn!("skipping malformed expression stop: {stop}");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            property: map
                .get("property")
                .and_then(Value::as_str)
                .map(str::to_owned),
            kind: ExpressionKind::parse(map.get("type").and_then(Value::as_str)),
            stops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpressionKind, PropertyValue};
    use serde_json::json;

    #[test]
    fn objects_with_stops_are_expressions() {
        let v = PropertyValue::from_json(json!({
            "property": "count",
            "type": "interval",
            "stops": [[0, "a.svg"], [9, "b.svg"]]
        }));
        let PropertyValue::Expression(expr) = v else {
            panic!("expected expression");
        };
        assert_eq!(expr.property.as_deref(), Some("count"));
        assert_eq!(expr.kind, ExpressionKind::Interval);
        assert_eq!(expr.stops.len(), 2);
        assert_eq!(expr.stops[1].threshold(), 9.0);
    }

    #[test]
    fn plain_objects_stay_literal() {
        let v = PropertyValue::from_json(json!({ "path": "M0 0", "fill": "#fff" }));
        assert!(!v.is_expression());
        assert_eq!(v.as_literal(), Some(&json!({ "path": "M0 0", "fill": "#fff" })));
    }

    #[test]
    fn malformed_stops_are_dropped_and_thresholds_degrade_to_nan() {
        let PropertyValue::Expression(expr) = PropertyValue::from_json(json!({
            "property": "count",
            "stops": [[0, "a"], "junk", ["x", "b"]]
        })) else {
            panic!("expected expression");
        };
        assert_eq!(expr.stops.len(), 2);
        assert!(expr.stops[1].threshold().is_nan());
    }

    #[test]
    fn missing_type_defaults_to_interval_and_missing_property_to_zoom() {
        let PropertyValue::Expression(expr) =
            PropertyValue::from_json(json!({ "stops": [[1, 2]] }))
        else {
            panic!("expected expression");
        };
        assert_eq!(expr.kind, ExpressionKind::Interval);
        assert_eq!(expr.property, None);
    }
}
