//! Containment ordering between queries.

use super::{QueryLevel, TestQuery};
use crate::params::{param_key_is_public, ParamValue, Params};

/// How two queries relate as sets of cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ordering {
    /// Neither contains the other
    Unordered,
    /// The left query contains strictly more
    StrictSuperset,
    /// Same set of cases
    Equal,
    /// The left query contains strictly less
    StrictSubset,
}

/// Compare two queries level by level.
///
/// Paths compare by prefix. A wildcard ("big") query at a level contains
/// every query that extends it there.
#[must_use]
pub fn compare_queries(a: &TestQuery, b: &TestQuery) -> Ordering {
    if a.suite != b.suite {
        return Ordering::Unordered;
    }

    let (a_multi_file, b_multi_file) = (a.level == QueryLevel::MultiFile, b.level == QueryLevel::MultiFile);
    let file_ordering = compare_paths(&a.file_path_parts, &b.file_path_parts);
    if file_ordering != Ordering::Equal || a_multi_file || b_multi_file {
        return compare_one_level(file_ordering, a_multi_file, b_multi_file);
    }

    let (a_multi_test, b_multi_test) = (a.level <= QueryLevel::MultiTest, b.level <= QueryLevel::MultiTest);
    let test_ordering = compare_paths(&a.test_path_parts, &b.test_path_parts);
    if test_ordering != Ordering::Equal || a_multi_test || b_multi_test {
        return compare_one_level(test_ordering, a_multi_test, b_multi_test);
    }

    let (a_multi_case, b_multi_case) = (a.level <= QueryLevel::MultiCase, b.level <= QueryLevel::MultiCase);
    let params_ordering = compare_public_params_paths(&a.params, &b.params);
    if params_ordering != Ordering::Equal || a_multi_case || b_multi_case {
        return compare_one_level(params_ordering, a_multi_case, b_multi_case);
    }
    Ordering::Equal
}

fn compare_one_level(ordering: Ordering, a_is_big: bool, b_is_big: bool) -> Ordering {
    match (ordering, a_is_big, b_is_big) {
        (Ordering::Unordered, _, _) => Ordering::Unordered,
        (_, true, true) => ordering,
        (_, false, false) => Ordering::Unordered,
        (Ordering::StrictSubset, true, false) | (Ordering::StrictSuperset, false, true) => {
            Ordering::Unordered
        }
        (_, true, false) => Ordering::StrictSuperset,
        (_, false, true) => Ordering::StrictSubset,
    }
}

fn compare_paths(a: &[String], b: &[String]) -> Ordering {
    if a.iter().zip(b).any(|(x, y)| x != y) {
        return Ordering::Unordered;
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => Ordering::Equal,
        std::cmp::Ordering::Less => Ordering::StrictSuperset,
        std::cmp::Ordering::Greater => Ordering::StrictSubset,
    }
}

/// Compare the public params of two queries as key paths.
///
/// Shared keys must hold deeply equal values. Then whichever side has no
/// extra keys is the superset. `{a: Undefined}` has one more key than `{}`.
#[must_use]
pub fn compare_public_params_paths(a: &Params, b: &Params) -> Ordering {
    let a_keys: Vec<&str> = a.keys().filter(|k| param_key_is_public(k)).collect();
    let b_public = b.keys().filter(|k| param_key_is_public(k)).count();

    let mut common = 0;
    for key in &a_keys {
        if let Some(bv) = b.get(key) {
            let av = a.get(key).unwrap_or(&ParamValue::Undefined);
            if !deep_equals(av, bv) {
                return Ordering::Unordered;
            }
            common += 1;
        }
    }

    match (a_keys.len() - common, b_public - common) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::StrictSuperset,
        (_, 0) => Ordering::StrictSubset,
        _ => Ordering::Unordered,
    }
}

/// Structural equality where NaN equals NaN
fn deep_equals(x: &ParamValue, y: &ParamValue) -> bool {
    match (x, y) {
        (ParamValue::Number(a), ParamValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        (ParamValue::Array(a), ParamValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(p, q)| deep_equals(p, q))
        }
        (ParamValue::Object(a), ParamValue::Object(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| deep_equals(v, w)))
        }
        _ => x == y,
    }
}
