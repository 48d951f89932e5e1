// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn ctx(value: serde_json::Value) -> MapContext<'static> {
    MapContext(Box::leak(Box::new(value)))
}

#[test]
fn literals_evaluate_to_themselves() {
    let c = ctx(json!({}));
    assert_eq!(evaluate("42", &c).unwrap(), json!(42.0));
    assert_eq!(evaluate("true", &c).unwrap(), json!(true));
    assert_eq!(evaluate("\"hi\"", &c).unwrap(), json!("hi"));
    assert_eq!(evaluate("null", &c).unwrap(), serde_json::Value::Null);
}

#[test]
fn path_resolves_nested_fields() {
    let c = ctx(json!({"steps": {"fetch": {"status": 200}}}));
    assert_eq!(evaluate("steps.fetch.status", &c).unwrap(), json!(200.0));
}

#[test]
fn path_resolves_array_index() {
    let c = ctx(json!({"items": [10, 20, 30]}));
    assert_eq!(evaluate("items[1]", &c).unwrap(), json!(20.0));
}

#[test]
fn unknown_path_is_an_error() {
    let c = ctx(json!({}));
    assert!(matches!(evaluate("nope.nested", &c), Err(ExprError::UnknownPath(_))));
}

#[test]
fn equality_and_ordering() {
    let c = ctx(json!({"steps": {"fetch": {"status": 200}}}));
    assert!(evaluate_bool("steps.fetch.status == 200", &c).unwrap());
    assert!(!evaluate_bool("steps.fetch.status == 404", &c).unwrap());
    assert!(evaluate_bool("steps.fetch.status >= 200", &c).unwrap());
    assert!(evaluate_bool("steps.fetch.status < 300", &c).unwrap());
}

#[test]
fn boolean_operators_short_circuit_and_compose() {
    let c = ctx(json!({"a": true, "b": false}));
    assert!(evaluate_bool("a && !b", &c).unwrap());
    assert!(evaluate_bool("b || a", &c).unwrap());
    assert!(!evaluate_bool("a && b", &c).unwrap());
}

#[test]
fn array_membership() {
    let c = ctx(json!({"role": "admin", "allowed": ["admin", "owner"]}));
    assert!(evaluate_bool("role in allowed", &c).unwrap());
    assert!(!evaluate_bool("\"guest\" in allowed", &c).unwrap());
}

#[test]
fn parentheses_override_precedence() {
    let c = ctx(json!({"a": true, "b": false, "c": false}));
    assert!(evaluate_bool("a && (b || !c)", &c).unwrap());
}

#[test]
fn evaluate_bool_rejects_non_boolean_result() {
    let c = ctx(json!({"x": 1}));
    assert!(matches!(evaluate_bool("x", &c), Err(ExprError::Type(_))));
}

#[test]
fn interpolate_substitutes_each_span_and_keeps_literal_text() {
    let c = ctx(json!({"name": "world", "count": 3}));
    let out = interpolate("hello ${name}, you have ${count} items", &c).unwrap();
    assert_eq!(out, "hello world, you have 3 items");
}

#[test]
fn interpolate_renders_null_as_empty_string() {
    let c = ctx(json!({"missing": null}));
    assert_eq!(interpolate("[${missing}]", &c).unwrap(), "[]");
}

#[test]
fn interpolate_with_no_spans_is_unchanged() {
    let c = ctx(json!({}));
    assert_eq!(interpolate("plain text", &c).unwrap(), "plain text");
}

#[test]
fn unterminated_string_literal_is_an_error() {
    let c = ctx(json!({}));
    assert!(matches!(evaluate("\"oops", &c), Err(ExprError::UnterminatedString)));
}
