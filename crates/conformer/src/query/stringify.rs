//! Rendering params into query text and back.
//!
//! Values are written as JSON with a handful of reserved string tokens for
//! the values JSON cannot express:
//!
//! | Value         | Token              |
//! |---------------|--------------------|
//! | `Undefined`   | `"_undef_"`        |
//! | NaN           | `"_nan_"`          |
//! | +Infinity     | `"_posinfinity_"`  |
//! | -Infinity     | `"_neginfinity_"`  |
//! | -0            | `"_negzero_"`      |
//!
//! A string value that spells one of the tokens cannot round-trip and is
//! rejected.

use super::separators::{PARAM_KV_SEPARATOR, PARAM_SEPARATOR, WILDCARD};
use crate::params::{param_key_is_public, ParamValue, Params};
use crate::result::{ConformError, ConformResult};
use regex::Regex;
use std::sync::OnceLock;

const TOKEN_UNDEFINED: &str = "_undef_";
const TOKEN_NAN: &str = "_nan_";
const TOKEN_POS_INFINITY: &str = "_posinfinity_";
const TOKEN_NEG_INFINITY: &str = "_neginfinity_";
const TOKEN_NEG_ZERO: &str = "_negzero_";

const RESERVED_TOKENS: [&str; 5] = [
    TOKEN_UNDEFINED,
    TOKEN_NAN,
    TOKEN_POS_INFINITY,
    TOKEN_NEG_INFINITY,
    TOKEN_NEG_ZERO,
];

/// Pattern every file path part, test path part and param key must match
pub const VALID_QUERY_PART: &str = "^[a-zA-Z0-9_]+$";

/// Whether `part` is a legal query path part or param key
#[must_use]
#[allow(clippy::expect_used)]
pub fn is_valid_query_part(part: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(VALID_QUERY_PART).expect("literal pattern"))
        .is_match(part)
}

fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn render_number(n: f64) -> String {
    if n.is_nan() {
        quote(TOKEN_NAN)
    } else if n == f64::INFINITY {
        quote(TOKEN_POS_INFINITY)
    } else if n == f64::NEG_INFINITY {
        quote(TOKEN_NEG_INFINITY)
    } else if n == 0.0 && n.is_sign_negative() {
        quote(TOKEN_NEG_ZERO)
    } else {
        format!("{n}")
    }
}

/// Render a value as token-extended JSON without validating it.
///
/// With `unique`, nested object keys are sorted so that structurally equal
/// values always render identically.
#[must_use]
pub fn render_param_value(value: &ParamValue, unique: bool) -> String {
    match value {
        ParamValue::Undefined => quote(TOKEN_UNDEFINED),
        ParamValue::Null => "null".to_string(),
        ParamValue::Bool(b) => b.to_string(),
        ParamValue::Number(n) => render_number(*n),
        ParamValue::String(s) => quote(s),
        ParamValue::Array(items) => {
            let inner: Vec<String> = items.iter().map(|v| render_param_value(v, unique)).collect();
            format!("[{}]", inner.join(","))
        }
        ParamValue::Object(params) => render_object(params.iter(), unique),
    }
}

fn render_object<'a>(entries: impl Iterator<Item = (&'a str, &'a ParamValue)>, unique: bool) -> String {
    let mut entries: Vec<_> = entries.collect();
    if unique {
        entries.sort_by(|a, b| a.0.cmp(b.0));
    }
    let inner: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}:{}", quote(k), render_param_value(v, unique)))
        .collect();
    format!("{{{}}}", inner.join(","))
}

/// Render every key of a params object as `k=v;k=v`, unvalidated
#[must_use]
pub fn render_params(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}{PARAM_KV_SEPARATOR}{}", render_param_value(v, false)))
        .collect::<Vec<_>>()
        .join(&PARAM_SEPARATOR.to_string())
}

fn check_no_reserved_strings(value: &ParamValue) -> ConformResult<()> {
    match value {
        ParamValue::String(s) if RESERVED_TOKENS.contains(&s.as_str()) => Err(
            ConformError::invalid_param_value(format!("string value {s:?} is a reserved token")),
        ),
        ParamValue::Array(items) => items.iter().try_for_each(check_no_reserved_strings),
        ParamValue::Object(params) => params.iter().try_for_each(|(_, v)| check_no_reserved_strings(v)),
        _ => Ok(()),
    }
}

/// Display form of a single value
pub fn stringify_param_value(value: &ParamValue) -> ConformResult<String> {
    check_no_reserved_strings(value)?;
    Ok(render_param_value(value, false))
}

/// Collision-free form of a single value (object keys sorted)
pub fn stringify_param_value_uniquely(value: &ParamValue) -> ConformResult<String> {
    check_no_reserved_strings(value)?;
    Ok(render_param_value(value, true))
}

/// `key=value` for use inside a query
pub fn stringify_single_param(key: &str, value: &ParamValue) -> ConformResult<String> {
    if !is_valid_query_part(key) {
        return Err(ConformError::invalid_param_value(format!(
            "param key {key:?} must match {VALID_QUERY_PART}"
        )));
    }
    let rendered = stringify_param_value(value)?;
    if rendered.contains([PARAM_KV_SEPARATOR, PARAM_SEPARATOR, WILDCARD]) {
        return Err(ConformError::invalid_param_value(format!(
            "value of {key} renders as {rendered}, which contains one of \
             '{PARAM_KV_SEPARATOR}{PARAM_SEPARATOR}{WILDCARD}'"
        )));
    }
    Ok(format!("{key}{PARAM_KV_SEPARATOR}{rendered}"))
}

/// Human-readable public params, `k=v;k=v` in insertion order
pub fn stringify_public_params(params: &Params) -> ConformResult<String> {
    let parts = params
        .iter()
        .filter(|(k, _)| param_key_is_public(k))
        .map(|(k, v)| stringify_single_param(k, v))
        .collect::<ConformResult<Vec<_>>>()?;
    Ok(parts.join(&PARAM_SEPARATOR.to_string()))
}

/// Fingerprint of the public params; equal iff publicly equal
pub fn stringify_public_params_uniquely(params: &Params) -> ConformResult<String> {
    for (_, v) in params.iter().filter(|(k, _)| param_key_is_public(k)) {
        check_no_reserved_strings(v)?;
    }
    Ok(render_object(
        params.iter().filter(|(k, _)| param_key_is_public(k)),
        true,
    ))
}

fn from_json(value: serde_json::Value) -> ParamValue {
    match value {
        serde_json::Value::Null => ParamValue::Null,
        serde_json::Value::Bool(b) => ParamValue::Bool(b),
        serde_json::Value::Number(n) => ParamValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => match s.as_str() {
            TOKEN_UNDEFINED => ParamValue::Undefined,
            TOKEN_NAN => ParamValue::Number(f64::NAN),
            TOKEN_POS_INFINITY => ParamValue::Number(f64::INFINITY),
            TOKEN_NEG_INFINITY => ParamValue::Number(f64::NEG_INFINITY),
            TOKEN_NEG_ZERO => ParamValue::Number(-0.0),
            _ => ParamValue::String(s),
        },
        serde_json::Value::Array(items) => ParamValue::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            ParamValue::Object(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

/// Inverse of [`stringify_param_value`]
pub fn parse_param_value(text: &str) -> ConformResult<ParamValue> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ConformError::invalid_param_value(format!("cannot parse {text:?}: {e}")))?;
    Ok(from_json(json))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_special_tokens() {
        assert_eq!(render_param_value(&ParamValue::Undefined, false), "\"_undef_\"");
        assert_eq!(render_param_value(&f64::NAN.into(), false), "\"_nan_\"");
        assert_eq!(render_param_value(&f64::INFINITY.into(), false), "\"_posinfinity_\"");
        assert_eq!(render_param_value(&f64::NEG_INFINITY.into(), false), "\"_neginfinity_\"");
        assert_eq!(render_param_value(&(-0.0).into(), false), "\"_negzero_\"");
        assert_eq!(render_param_value(&0.0.into(), false), "0");
    }

    #[test]
    fn test_plain_json() {
        assert_eq!(render_param_value(&1.into(), false), "1");
        assert_eq!(render_param_value(&1.5.into(), false), "1.5");
        assert_eq!(render_param_value(&"rgba8unorm".into(), false), "\"rgba8unorm\"");
        assert_eq!(render_param_value(&vec![1, 2].into(), false), "[1,2]");
        assert_eq!(render_param_value(&ParamValue::Null, false), "null");
    }

    #[test]
    fn test_reserved_string_rejected() {
        assert!(stringify_param_value(&"_nan_".into()).is_err());
        assert!(stringify_param_value(&vec!["_undef_"].into()).is_err());
        assert!(stringify_param_value(&"nan".into()).is_ok());
    }

    #[test]
    fn test_bad_chars_rejected() {
        assert!(stringify_single_param("x", &"a=b".into()).is_err());
        assert!(stringify_single_param("x", &"a;b".into()).is_err());
        assert!(stringify_single_param("x", &"a*".into()).is_err());
        assert_eq!(stringify_single_param("x", &"ab".into()).unwrap(), "x=\"ab\"");
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(stringify_single_param("bad-key", &1.into()).is_err());
        assert!(stringify_single_param("", &1.into()).is_err());
    }

    #[test]
    fn test_public_params_display() {
        let p = params! { "b" => 1, "_hidden" => 2, "a" => true };
        assert_eq!(stringify_public_params(&p).unwrap(), "b=1;a=true");
        assert_eq!(stringify_public_params(&Params::new()).unwrap(), "");
    }

    #[test]
    fn test_unique_is_order_insensitive() {
        let x = params! { "a" => 1, "b" => params! { "y" => 1, "x" => 2 } };
        let y = params! { "b" => params! { "x" => 2, "y" => 1 }, "a" => 1 };
        assert_eq!(
            stringify_public_params_uniquely(&x).unwrap(),
            stringify_public_params_uniquely(&y).unwrap()
        );
    }

    #[test]
    fn test_unique_ignores_private_reserved_strings() {
        let p = params! { "a" => 1, "_tag" => "_undef_" };
        assert_eq!(
            stringify_public_params_uniquely(&p).unwrap(),
            stringify_public_params_uniquely(&params! { "a" => 1 }).unwrap()
        );
        assert!(stringify_public_params_uniquely(&params! { "a" => "_undef_" }).is_err());
    }

    #[test]
    fn test_unique_distinguishes_undefined_from_absent() {
        let x = params! { "a" => ParamValue::Undefined };
        assert_ne!(
            stringify_public_params_uniquely(&x).unwrap(),
            stringify_public_params_uniquely(&Params::new()).unwrap()
        );
    }

    #[test]
    fn test_parse_inverts_display() {
        for value in [
            ParamValue::Undefined,
            ParamValue::from(f64::NAN),
            ParamValue::from(-0.0),
            ParamValue::from(vec![1, 2]),
            ParamValue::from("s"),
            ParamValue::Null,
        ] {
            let text = stringify_param_value(&value).unwrap();
            assert_eq!(stringify_param_value(&parse_param_value(&text).unwrap()).unwrap(), text);
        }
    }

    #[test]
    fn test_parse_negzero_sign() {
        let v = parse_param_value("\"_negzero_\"").unwrap();
        assert!(v.as_f64().unwrap().is_sign_negative());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_param_value("{not json").is_err());
    }

    #[test]
    fn test_query_part_pattern() {
        assert!(is_valid_query_part("abc_123"));
        assert!(!is_valid_query_part("a b"));
        assert!(!is_valid_query_part("a,b"));
    }
}
