//! Merging and public/private views of params.

use super::value::Params;
use crate::query::compare::{compare_public_params_paths, Ordering};
use crate::query::stringify::render_param_value;
use crate::result::{ConformError, ConformResult};

/// Prefix marking a param key as private (excluded from identity and display)
pub const PRIVATE_PARAM_PREFIX: char = '_';

/// Whether a key participates in test identity
#[must_use]
pub fn param_key_is_public(key: &str) -> bool {
    !key.starts_with(PRIVATE_PARAM_PREFIX)
}

/// The public subset of a params object, keeping key order
#[must_use]
pub fn extract_public_params(params: &Params) -> Params {
    let mut public = Params::new();
    for (k, v) in params.iter().filter(|(k, _)| param_key_is_public(k)) {
        public.push_unchecked(k.to_string(), v.clone());
    }
    public
}

/// Merge two params objects; `a`'s keys come first.
///
/// Fails if any key exists on both sides. This is how key shadowing between
/// pipeline stages (or between case and subcase) surfaces.
pub fn merge_params(a: &Params, b: &Params) -> ConformResult<Params> {
    let mut merged = a.clone();
    for (k, v) in b.iter() {
        if let Some(existing) = a.get(k) {
            return Err(ConformError::ParamsShadowed {
                key: k.to_string(),
                existing: render_param_value(existing, false),
                incoming: render_param_value(v, false),
            });
        }
        merged.push_unchecked(k.to_string(), v.clone());
    }
    Ok(merged)
}

/// Whether two params objects have identical public keys and deeply equal values.
///
/// A key holding `Undefined` is not the same as a missing key.
#[must_use]
pub fn public_params_equals(x: &Params, y: &Params) -> bool {
    compare_public_params_paths(x, y) == Ordering::Equal
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params;
    use crate::params::ParamValue;

    #[test]
    fn test_merge_disjoint() {
        let merged = merge_params(&params! { "a" => 1 }, &params! { "b" => 2 }).unwrap();
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_collision_fails() {
        let err = merge_params(&params! { "x" => 1 }, &params! { "x" => 3 }).unwrap_err();
        match err {
            ConformError::ParamsShadowed { key, .. } => assert_eq!(key, "x"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_merge_collision_even_when_equal() {
        assert!(merge_params(&params! { "x" => 1 }, &params! { "x" => 1 }).is_err());
    }

    #[test]
    fn test_undefined_differs_from_absent() {
        let with_undef = params! { "a" => ParamValue::Undefined };
        assert!(!public_params_equals(&with_undef, &Params::new()));
        assert!(!public_params_equals(&Params::new(), &with_undef));
    }

    #[test]
    fn test_private_keys_ignored() {
        let private = params! { "_a" => 0 };
        assert!(public_params_equals(&private, &Params::new()));
        assert!(public_params_equals(&Params::new(), &private));
    }

    #[test]
    fn test_extract_public() {
        let p = params! { "a" => 1, "_b" => 2, "c" => 3 };
        let public = extract_public_params(&p);
        assert_eq!(public.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
