//! Structured-output contracts and their local validation.
//!
//! Each model call declares an [`OutputSchema`]: a named JSON Schema object
//! derived with `schemars` from the result type it deserialises into, so the
//! contract and the Rust struct cannot drift apart. Every property is
//! required and `deny_unknown_fields` yields `additionalProperties: false`.
//! The OpenAI backend forwards the schema as a strict `json_schema` response
//! format; other backends embed it in the prompt.
//!
//! Whatever the backend claims about conformance, responses are re-validated
//! here with [`parse_structured`] before they reach the rest of the pipeline.
//! A missing field or a wrong type is a [`DigestError::SchemaViolation`],
//! never a silent default.
//!
//! The one exception is [`parse_truncated`], used only for replies the
//! backend reports as cut off at their token bound.

use crate::error::DigestError;
use crate::output::{ExtractionResult, ReviewPaperResult};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Name of the per-page extraction contract.
pub const EXTRACTION_SCHEMA_NAME: &str = "extractionResult";

/// Name of the review-paper contract.
pub const REVIEW_SCHEMA_NAME: &str = "reviewPaperResult";

/// A named, described JSON Schema the backend must conform its output to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// The JSON Schema document itself.
    pub schema: Value,
    /// Ask the backend for strict conformance (when it supports it).
    pub strict: bool,
}

/// Schema for [`ExtractionResult`].
pub fn extraction_schema() -> OutputSchema {
    OutputSchema {
        name: EXTRACTION_SCHEMA_NAME,
        description: "The extraction result of the image",
        schema: schema_document::<ExtractionResult>(),
        strict: true,
    }
}

/// Schema for [`ReviewPaperResult`].
pub fn review_schema() -> OutputSchema {
    OutputSchema {
        name: REVIEW_SCHEMA_NAME,
        description: "A review paper synthesised from the provided research papers",
        schema: schema_document::<ReviewPaperResult>(),
        strict: true,
    }
}

/// The JSON Schema of `T` as a plain object, without the `$schema` marker
/// that strict structured-output endpoints reject.
fn schema_document<T: JsonSchema>() -> Value {
    let mut doc = serde_json::to_value(schema_for!(T)).expect("schema serialises to JSON");
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("$schema");
    }
    doc
}

/// Validate `value` against `schema`.
///
/// Supports the subset the contracts above use: `type` (object, array,
/// string, number, integer, boolean, null), `properties`, `required`,
/// `additionalProperties: false` and `items`. Returns a human-readable
/// description of the first violation, with a JSON-pointer-ish path.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let ok = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            other => return Err(format!("{path}: unsupported schema type '{other}'")),
        };
        if !ok {
            return Err(format!(
                "{path}: expected {expected}, got {}",
                json_kind(value)
            ));
        }
    }

    if let Some(obj) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(field) {
                    return Err(format!("{path}: missing required field '{field}'"));
                }
            }
        }

        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            if let Some(extra) = obj
                .keys()
                .find(|k| properties.map_or(true, |p| !p.contains_key(k.as_str())))
            {
                return Err(format!("{path}: unexpected field '{extra}'"));
            }
        }

        if let Some(props) = properties {
            for (name, sub) in props {
                if let Some(v) = obj.get(name) {
                    validate_at(sub, v, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let (Some(items), Some(arr)) = (schema.get("items"), value.as_array()) {
        for (i, v) in arr.iter().enumerate() {
            validate_at(items, v, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strip a single outer ```` ```json ```` / ```` ``` ```` fence, if present.
fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim().contains(char::is_whitespace) => inner.trim(),
        _ => body.trim(),
    }
}

/// Parse a raw model response into `T`, enforcing `schema` first.
///
/// `target` names what the response was for (e.g. "page 2 of a.pdf") and is
/// carried into the error.
pub fn parse_structured<T: DeserializeOwned>(
    schema: &OutputSchema,
    raw: &str,
    target: &str,
) -> Result<T, DigestError> {
    let violation = |detail: String| DigestError::SchemaViolation {
        schema: schema.name.to_string(),
        target: target.to_string(),
        detail,
    };

    let body = strip_json_fence(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| violation(format!("not valid JSON: {e}")))?;
    validate(&schema.schema, &value).map_err(violation)?;
    serde_json::from_value(value).map_err(|e| violation(e.to_string()))
}

/// How far back from the cut [`parse_truncated`] looks for a point where the
/// payload can be closed into valid JSON.
const MAX_REPAIR_STEPS: usize = 256;

/// Best-effort parse of a reply the backend cut off at its output-token bound.
///
/// The cut-off payload is closed into valid JSON (open string, arrays and
/// objects are terminated; a trailing partial key, number or separator is
/// dropped). Required fields the cut removed entirely are then filled with
/// an empty value of their declared type, and the result is validated and
/// deserialised like any other reply.
///
/// Only for replies reported as truncated; complete replies always go
/// through [`parse_structured`].
pub fn parse_truncated<T: DeserializeOwned>(
    schema: &OutputSchema,
    raw: &str,
    target: &str,
) -> Result<T, DigestError> {
    let violation = |detail: String| DigestError::SchemaViolation {
        schema: schema.name.to_string(),
        target: target.to_string(),
        detail,
    };

    let mut value = repair_json(strip_open_fence(raw))
        .ok_or_else(|| violation("truncated before any recoverable JSON object".into()))?;
    fill_missing(&schema.schema, &mut value);
    validate(&schema.schema, &value).map_err(violation)?;
    serde_json::from_value(value).map_err(|e| violation(e.to_string()))
}

/// Like [`strip_json_fence`], but also drops an opening fence whose closing
/// half was cut off.
fn strip_open_fence(raw: &str) -> &str {
    let body = strip_json_fence(raw);
    match body.strip_prefix("```") {
        Some(rest) => rest.split_once('\n').map_or("", |(_, inner)| inner),
        None => body,
    }
}

/// Close the longest prefix of `body` that yields a JSON object.
fn repair_json(body: &str) -> Option<Value> {
    (0..=body.len())
        .rev()
        .filter(|&cut| body.is_char_boundary(cut))
        .take(MAX_REPAIR_STEPS)
        .find_map(|cut| {
            serde_json::from_str::<Value>(&close_json(&body[..cut]))
                .ok()
                .filter(Value::is_object)
        })
}

/// Terminate whatever string, arrays and objects are open at the end of
/// `prefix`.
fn close_json(prefix: &str) -> String {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in prefix.chars() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut out = prefix.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    out.extend(open.iter().rev());
    out
}

/// Insert an empty value for every required property missing from `value`.
fn fill_missing(schema: &Value, value: &mut Value) {
    let (Some(obj), Some(required), Some(properties)) = (
        value.as_object_mut(),
        schema.get("required").and_then(Value::as_array),
        schema.get("properties").and_then(Value::as_object),
    ) else {
        return;
    };
    for field in required.iter().filter_map(Value::as_str) {
        if obj.contains_key(field) {
            continue;
        }
        let empty = match properties
            .get(field)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
        {
            Some("string") => Value::String(String::new()),
            Some("array") => Value::Array(Vec::new()),
            _ => continue,
        };
        obj.insert(field.to_string(), empty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn required(schema: &OutputSchema) -> BTreeSet<&str> {
        schema.schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    #[test]
    fn extraction_schema_requires_all_fields() {
        let s = extraction_schema();
        assert_eq!(
            required(&s),
            BTreeSet::from(["title", "authors", "content", "createdAt"])
        );
        assert_eq!(s.schema["type"], "object");
        assert_eq!(s.schema["additionalProperties"], Value::Bool(false));
        assert_eq!(s.schema["properties"]["authors"]["type"], "array");
        assert_eq!(s.schema["properties"]["authors"]["items"]["type"], "string");
        assert!(s.schema.get("$schema").is_none());
        assert!(s.strict);
    }

    #[test]
    fn review_schema_follows_the_struct() {
        let s = review_schema();
        assert_eq!(
            required(&s),
            BTreeSet::from(["title", "content", "references"])
        );
        assert_eq!(s.schema["additionalProperties"], Value::Bool(false));
        assert_eq!(s.schema["properties"]["content"]["type"], "string");
    }

    #[test]
    fn heading_in_content_parses() {
        let raw = r##"{"title":"R","content":"# Review\n\nBody [1]","references":["A"]}"##;
        let r: ReviewPaperResult = parse_structured(&review_schema(), raw, "review").unwrap();
        assert!(r.content.starts_with("# Review"));
    }

    #[test]
    fn valid_extraction_parses() {
        let raw = r##"{"title":"Attention","authors":["Vaswani","Shazeer"],"content":"# Intro","createdAt":"2017"}"##;
        let r: ExtractionResult = parse_structured(&extraction_schema(), raw, "page 1").unwrap();
        assert_eq!(r.title, "Attention");
        assert_eq!(r.authors, vec!["Vaswani", "Shazeer"]);
    }

    #[test]
    fn empty_content_is_allowed() {
        let raw = r#"{"title":"","authors":[],"content":"","createdAt":""}"#;
        let r: ExtractionResult = parse_structured(&extraction_schema(), raw, "page 4").unwrap();
        assert_eq!(r.content, "");
    }

    #[test]
    fn missing_field_is_a_violation() {
        let raw = r#"{"title":"T","content":"c","createdAt":"2020"}"#;
        let err = parse_structured::<ExtractionResult>(&extraction_schema(), raw, "page 1")
            .unwrap_err();
        match err {
            DigestError::SchemaViolation { schema, detail, .. } => {
                assert_eq!(schema, EXTRACTION_SCHEMA_NAME);
                assert!(detail.contains("authors"), "got: {detail}");
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_a_violation() {
        let raw = r#"{"title":"T","authors":"Alice","content":"c","createdAt":"2020"}"#;
        let err = parse_structured::<ExtractionResult>(&extraction_schema(), raw, "page 1")
            .unwrap_err();
        assert!(matches!(err, DigestError::SchemaViolation { .. }));
    }

    #[test]
    fn wrong_item_type_is_a_violation() {
        let raw = r#"{"title":"R","content":"c","references":["a", 2]}"#;
        let err =
            parse_structured::<ReviewPaperResult>(&review_schema(), raw, "review").unwrap_err();
        match err {
            DigestError::SchemaViolation { detail, .. } => {
                assert!(detail.contains("references[1]"), "got: {detail}")
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn null_content_is_a_violation() {
        let raw = r#"{"title":"R","content":null,"references":[]}"#;
        assert!(parse_structured::<ReviewPaperResult>(&review_schema(), raw, "review").is_err());
    }

    #[test]
    fn additional_property_is_a_violation() {
        let raw = r#"{"title":"R","content":"c","references":[],"score":3}"#;
        let err =
            parse_structured::<ReviewPaperResult>(&review_schema(), raw, "review").unwrap_err();
        assert!(err.to_string().contains("score"));
    }

    #[test]
    fn non_json_is_a_violation() {
        let err = parse_structured::<ReviewPaperResult>(&review_schema(), "Sure! Here is", "review")
            .unwrap_err();
        assert!(matches!(err, DigestError::SchemaViolation { .. }));
    }

    #[test]
    fn outer_json_fence_is_tolerated() {
        let raw = "```json\n{\"title\":\"R\",\"content\":\"c\",\"references\":[\"x\"]}\n```";
        let r: ReviewPaperResult = parse_structured(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.references, vec!["x"]);
    }

    // ── Truncated replies ────────────────────────────────────────────────

    #[test]
    fn truncated_mid_content_keeps_the_partial_text() {
        let raw = r#"{"title":"A Review","content":"Long synthesis of [1] and [2]"#;
        let r: ReviewPaperResult = parse_truncated(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.title, "A Review");
        assert_eq!(r.content, "Long synthesis of [1] and [2]");
        assert!(r.references.is_empty());
    }

    #[test]
    fn truncated_inside_references_keeps_the_entries() {
        let raw = r#"{"title":"R","content":"c [1]","references":["Vaswani et al.", "Devl"#;
        let r: ReviewPaperResult = parse_truncated(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.references, vec!["Vaswani et al.", "Devl"]);
    }

    #[test]
    fn truncated_after_a_key_drops_the_key() {
        let raw = r#"{"title":"R","content":"body","references":"#;
        let r: ReviewPaperResult = parse_truncated(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.content, "body");
        assert!(r.references.is_empty());
    }

    #[test]
    fn truncated_on_an_escape_is_repaired() {
        let raw = "{\"title\":\"R\",\"content\":\"line one\\";
        let r: ReviewPaperResult = parse_truncated(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.content, "line one");
    }

    #[test]
    fn truncated_inside_an_open_fence_is_repaired() {
        let raw = "```json\n{\"title\":\"R\",\"content\":\"partial";
        let r: ReviewPaperResult = parse_truncated(&review_schema(), raw, "review").unwrap();
        assert_eq!(r.content, "partial");
    }

    #[test]
    fn truncated_prose_is_still_a_violation() {
        let err = parse_truncated::<ReviewPaperResult>(&review_schema(), "I cannot", "review")
            .unwrap_err();
        assert!(matches!(err, DigestError::SchemaViolation { .. }));
    }

    #[test]
    fn truncated_wrong_type_is_still_a_violation() {
        let raw = r#"{"title":"R","content":42,"references":["#;
        assert!(parse_truncated::<ReviewPaperResult>(&review_schema(), raw, "review").is_err());
    }
}
