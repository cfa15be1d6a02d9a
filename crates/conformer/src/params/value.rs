//! Param values and insertion-ordered param maps.

use std::fmt;

/// A single parameter value.
///
/// `Undefined` is a real value, distinct from a key being absent: a params
/// object holding `{a: Undefined}` is not publicly equal to `{}`.
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Explicitly undefined
    Undefined,
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Number (all numbers are f64, compared with `==`)
    Number(f64),
    /// String
    String(String),
    /// Array of values
    Array(Vec<ParamValue>),
    /// Nested object
    Object(Params),
}

impl ParamValue {
    /// Boolean value, if this is a bool
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric value, if this is a number
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer value, if this is an integral finite number
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// String slice, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array elements, if this is an array
    #[must_use]
    pub fn as_array(&self) -> Option<&[ParamValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Nested params, if this is an object
    #[must_use]
    pub const fn as_object(&self) -> Option<&Params> {
        match self {
            Self::Object(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this is `Undefined`
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::query::stringify::render_param_value(self, false))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    Self::Number(f64::from(v))
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, u8, u16, u32, f32, f64);

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Params> for ParamValue {
    fn from(v: Params) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

/// An insertion-ordered map from param key to value.
///
/// Equality ignores key order, matching deep structural equality.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    /// Create an empty params object
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the key is present (even if its value is `Undefined`)
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Boolean param
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ParamValue::as_bool)
    }

    /// Numeric param
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_f64)
    }

    /// Integral param
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_i64)
    }

    /// String param
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_unchecked(&mut self, key: String, value: ParamValue) {
        self.entries.push((key, value));
    }
}

impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|w| v == w))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::query::stringify::render_params(self))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a ParamValue);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a ParamValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Build a [`Params`] literal.
///
/// ```
/// use conformer::params;
/// let p = params! { "format" => "rgba8unorm", "mips" => 3 };
/// assert_eq!(p.get_i64("mips"), Some(3));
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut p = $crate::Params::new();
        $( p.insert($key, $value); )+
        p
    }};
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_insertion_order_kept() {
        let p = params! { "b" => 1, "a" => 2 };
        assert_eq!(p.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_equality_ignores_order() {
        assert_eq!(params! { "a" => 1, "b" => 2 }, params! { "b" => 2, "a" => 1 });
        assert_ne!(params! { "a" => 1 }, params! { "a" => 1, "b" => 2 });
    }

    #[test]
    fn test_undefined_is_not_absent() {
        let p = params! { "a" => ParamValue::Undefined };
        assert!(p.contains_key("a"));
        assert_ne!(p, Params::new());
    }

    #[test]
    fn test_nan_never_equal() {
        assert_ne!(ParamValue::from(f64::NAN), ParamValue::from(f64::NAN));
        assert_eq!(ParamValue::from(0.0), ParamValue::from(-0.0));
    }

    #[test]
    fn test_accessors() {
        let p = params! { "n" => 3, "x" => 1.5, "s" => "hi", "b" => true };
        assert_eq!(p.get_i64("n"), Some(3));
        assert_eq!(p.get_i64("x"), None);
        assert_eq!(p.get_f64("x"), Some(1.5));
        assert_eq!(p.get_str("s"), Some("hi"));
        assert_eq!(p.get_bool("b"), Some(true));
        assert!(p.get("missing").is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let mut p = params! { "a" => 1 };
        let old = p.insert("a", 2);
        assert_eq!(old, Some(ParamValue::from(1)));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_nested_values() {
        let p = params! { "a" => vec![1, 2], "o" => params! { "x" => 1 } };
        assert_eq!(p.get("a").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(p.get("o").unwrap().as_object().unwrap().get_i64("x"), Some(1));
    }
}
