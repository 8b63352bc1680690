//! Evaluation of literal and data-driven property values.
//!
//! Evaluation never fails: empty expressions resolve to `None` and inputs
//! that cannot be compared fall back to the first stop.

use serde_json::{Map, Value};

use crate::value::{Expression, ExpressionKind, PropertyValue, Stop};

/// Feature context an expression is evaluated against.
#[derive(Debug, Copy, Clone, Default)]
pub struct EvalContext<'a> {
    pub properties: Option<&'a Map<String, Value>>,
    pub zoom: Option<f64>,
}

impl<'a> EvalContext<'a> {
    pub fn new(properties: &'a Map<String, Value>) -> Self {
        Self {
            properties: Some(properties),
            zoom: None,
        }
    }

    pub fn with_zoom(mut self, zoom: Option<f64>) -> Self {
        self.zoom = zoom;
        self
    }

    fn input(&self, expr: &Expression) -> Option<Value> {
        match &expr.property {
            Some(name) => self.properties?.get(name).cloned(),
            None => self.zoom.map(Value::from),
        }
    }
}

/// Resolves `value` for one feature.
pub fn resolve<'v>(value: &'v PropertyValue, ctx: &EvalContext<'_>) -> Option<&'v Value> {
    match value {
        PropertyValue::Literal(v) => Some(v),
        PropertyValue::Expression(expr) => evaluate(expr, ctx),
    }
}

/// Every value `value` can take, in stop order.
pub fn resolve_all(value: &PropertyValue) -> Vec<&Value> {
    match value {
        PropertyValue::Literal(v) => vec![v],
        PropertyValue::Expression(expr) => expr.stops.iter().map(|s| &s.output).collect(),
    }
}

pub fn evaluate<'e>(expr: &'e Expression, ctx: &EvalContext<'_>) -> Option<&'e Value> {
    let input = ctx.input(expr);
    match expr.kind {
        ExpressionKind::Interval => interval(&expr.stops, input.as_ref().and_then(Value::as_f64)),
        ExpressionKind::Categorical => categorical(&expr.stops, input.as_ref()),
    }
}

fn interval(stops: &[Stop], input: Option<f64>) -> Option<&Value> {
    let first = stops.first()?;
    let Some(x) = input else {
        return Some(&first.output);
    };
    // Later stops win ties on an exact threshold match.
    let selected = stops
        .iter()
        .rev()
        .find(|s| s.threshold() <= x)
        .unwrap_or(first);
    Some(&selected.output)
}

fn categorical<'s>(stops: &'s [Stop], input: Option<&Value>) -> Option<&'s Value> {
    let first = stops.first()?;
    let Some(input) = input else {
        return Some(&first.output);
    };
    let selected = stops
        .iter()
        .find(|s| same_category(&s.input, input))
        .unwrap_or(first);
    Some(&selected.output)
}

fn same_category(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
