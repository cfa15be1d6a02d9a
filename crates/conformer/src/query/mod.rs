//! Test queries: addressing suites, files, tests and cases.
//!
//! ```text
//! suite:file,path,*                    MultiFile
//! suite:file,path:test,path,*          MultiTest
//! suite:file,path:test,path:k=v;*      MultiCase
//! suite:file,path:test,path:k=v;k2=w   SingleCase
//! ```

pub mod compare;
pub mod separators;
pub mod stringify;

pub use compare::{compare_queries, Ordering};

use crate::params::{param_key_is_public, ParamValue, Params};
use crate::result::{ConformError, ConformResult};
use separators::{BIG_SEPARATOR, PARAM_KV_SEPARATOR, PARAM_SEPARATOR, PATH_SEPARATOR, WILDCARD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stringify::{is_valid_query_part, parse_param_value, render_param_value, VALID_QUERY_PART};

/// How much of the tree a query names. Ordered from broadest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryLevel {
    /// All files under a path prefix
    MultiFile,
    /// All tests under a test path prefix in one file
    MultiTest,
    /// All cases of one test whose params extend the given ones
    MultiCase,
    /// Exactly one case
    SingleCase,
}

/// A parsed query at any level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestQuery {
    suite: String,
    file_path_parts: Vec<String>,
    test_path_parts: Vec<String>,
    params: Params,
    level: QueryLevel,
}

fn check_parts(query_text: &str, parts: &[String]) -> ConformResult<()> {
    match parts.iter().find(|p| !is_valid_query_part(p)) {
        Some(bad) => Err(ConformError::invalid_query(
            query_text,
            format!("path part {bad:?} must match {VALID_QUERY_PART}"),
        )),
        None => Ok(()),
    }
}

impl TestQuery {
    fn build(
        suite: impl Into<String>,
        file_path_parts: Vec<String>,
        test_path_parts: Vec<String>,
        params: Params,
        level: QueryLevel,
    ) -> ConformResult<Self> {
        let query = Self {
            suite: suite.into(),
            file_path_parts,
            test_path_parts,
            params,
            level,
        };
        let text = query.to_string();
        check_parts(&text, &query.file_path_parts)?;
        check_parts(&text, &query.test_path_parts)?;
        if query.level >= QueryLevel::MultiCase
            && (query.file_path_parts.is_empty() || query.test_path_parts.is_empty())
        {
            return Err(ConformError::invalid_query(
                text,
                "there must be at least one test and file",
            ));
        }
        Ok(query)
    }

    /// `suite:a,b,*`
    pub fn multi_file(suite: impl Into<String>, file_path_parts: Vec<String>) -> ConformResult<Self> {
        Self::build(suite, file_path_parts, Vec::new(), Params::new(), QueryLevel::MultiFile)
    }

    /// `suite:a,b:t,*`
    pub fn multi_test(
        suite: impl Into<String>,
        file_path_parts: Vec<String>,
        test_path_parts: Vec<String>,
    ) -> ConformResult<Self> {
        Self::build(suite, file_path_parts, test_path_parts, Params::new(), QueryLevel::MultiTest)
    }

    /// `suite:a,b:t:k=v;*`
    pub fn multi_case(
        suite: impl Into<String>,
        file_path_parts: Vec<String>,
        test_path_parts: Vec<String>,
        params: Params,
    ) -> ConformResult<Self> {
        Self::build(suite, file_path_parts, test_path_parts, params, QueryLevel::MultiCase)
    }

    /// Suite name
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// File path parts
    #[must_use]
    pub fn file_path_parts(&self) -> &[String] {
        &self.file_path_parts
    }

    /// Test path parts (empty above `MultiTest` resolution)
    #[must_use]
    pub fn test_path_parts(&self) -> &[String] {
        &self.test_path_parts
    }

    /// Params (empty above `MultiCase` resolution)
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Query level
    #[must_use]
    pub const fn level(&self) -> QueryLevel {
        self.level
    }

    /// Whether this query contains `other` (equal or strict superset)
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        matches!(
            compare_queries(self, other),
            Ordering::Equal | Ordering::StrictSuperset
        )
    }
}

fn render_public_params(params: &Params, wildcard: bool) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .filter(|(k, _)| param_key_is_public(k))
        .map(|(k, v)| format!("{k}{PARAM_KV_SEPARATOR}{}", render_param_value(v, false)))
        .collect();
    if wildcard {
        parts.push(WILDCARD.to_string());
    }
    parts.join(&PARAM_SEPARATOR.to_string())
}

fn join_path(parts: &[String], wildcard: bool) -> String {
    let mut parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    let star = WILDCARD.to_string();
    if wildcard {
        parts.push(&star);
    }
    parts.join(&PATH_SEPARATOR.to_string())
}

impl fmt::Display for TestQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = BIG_SEPARATOR;
        match self.level {
            QueryLevel::MultiFile => {
                write!(f, "{}{sep}{}", self.suite, join_path(&self.file_path_parts, true))
            }
            QueryLevel::MultiTest => write!(
                f,
                "{}{sep}{}{sep}{}",
                self.suite,
                join_path(&self.file_path_parts, false),
                join_path(&self.test_path_parts, true)
            ),
            QueryLevel::MultiCase | QueryLevel::SingleCase => write!(
                f,
                "{}{sep}{}{sep}{}{sep}{}",
                self.suite,
                join_path(&self.file_path_parts, false),
                join_path(&self.test_path_parts, false),
                render_public_params(&self.params, self.level == QueryLevel::MultiCase)
            ),
        }
    }
}

impl From<TestQuery> for String {
    fn from(query: TestQuery) -> Self {
        query.to_string()
    }
}

impl TryFrom<String> for TestQuery {
    type Error = ConformError;

    fn try_from(text: String) -> ConformResult<Self> {
        parse_query(&text)
    }
}

impl FromStr for TestQuery {
    type Err = ConformError;

    fn from_str(text: &str) -> ConformResult<Self> {
        parse_query(text)
    }
}

/// A query naming exactly one case: the join key against expectations
#[derive(Debug, Clone, PartialEq)]
pub struct TestQuerySingleCase(TestQuery);

impl TestQuerySingleCase {
    /// Build a single-case query; fails if the public params cannot be stringified
    pub fn new(
        suite: impl Into<String>,
        file_path_parts: Vec<String>,
        test_path_parts: Vec<String>,
        params: Params,
    ) -> ConformResult<Self> {
        stringify::stringify_public_params(&params)?;
        TestQuery::build(suite, file_path_parts, test_path_parts, params, QueryLevel::SingleCase)
            .map(Self)
    }

    /// Same suite, file and test, different params
    pub fn with_params(&self, params: Params) -> ConformResult<Self> {
        Self::new(
            self.0.suite.clone(),
            self.0.file_path_parts.clone(),
            self.0.test_path_parts.clone(),
            params,
        )
    }

    /// View as a general query
    #[must_use]
    pub const fn as_query(&self) -> &TestQuery {
        &self.0
    }

    /// Consume into a general query
    #[must_use]
    pub fn into_query(self) -> TestQuery {
        self.0
    }
}

impl fmt::Display for TestQuerySingleCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<TestQuery> for TestQuerySingleCase {
    type Error = ConformError;

    fn try_from(query: TestQuery) -> ConformResult<Self> {
        if query.level == QueryLevel::SingleCase {
            Ok(Self(query))
        } else {
            Err(ConformError::invalid_query(query.to_string(), "not a single-case query"))
        }
    }
}

/// Split one `:`-level into parts, peeling off a trailing wildcard
fn parse_big_part(text: &str, query: &str, separator: char) -> ConformResult<(Vec<String>, bool)> {
    if text.is_empty() {
        return Ok((Vec::new(), false));
    }
    let mut parts: Vec<String> = text.split(separator).map(str::to_string).collect();
    let ends_with_wildcard = parts.last().is_some_and(|p| p.len() == 1 && p.starts_with(WILDCARD));
    let last = parts.len() - 1;
    if parts.iter().enumerate().any(|(i, p)| p.contains(WILDCARD) && !(i == last && ends_with_wildcard)) {
        return Err(ConformError::invalid_query(query, "wildcard must be complete last part"));
    }
    if ends_with_wildcard {
        parts.pop();
    }
    Ok((parts, ends_with_wildcard))
}

fn parse_single_param(part: &str, query: &str) -> ConformResult<(String, ParamValue)> {
    if part.is_empty() {
        return Err(ConformError::invalid_query(
            query,
            "param in a query must not be blank (is there a trailing separator?)",
        ));
    }
    let (key, value) = part
        .split_once(PARAM_KV_SEPARATOR)
        .ok_or_else(|| ConformError::invalid_query(query, "param in a query must be of form key=value"))?;
    if !param_key_is_public(key) {
        return Err(ConformError::invalid_query(
            query,
            "param in a query must not be private (start with _)",
        ));
    }
    if !is_valid_query_part(key) {
        return Err(ConformError::invalid_query(
            query,
            format!("param key names must match {VALID_QUERY_PART}"),
        ));
    }
    Ok((key.to_string(), parse_param_value(value)?))
}

/// Parse query text at any level
pub fn parse_query(text: &str) -> ConformResult<TestQuery> {
    let big_parts: Vec<&str> = text.splitn(4, BIG_SEPARATOR).collect();
    if big_parts.len() < 2 {
        return Err(ConformError::invalid_query(text, "filename is required"));
    }
    let suite = big_parts[0];

    let (files, files_wildcard) = parse_big_part(big_parts[1], text, PATH_SEPARATOR)?;
    if big_parts.len() == 2 {
        if !files_wildcard {
            return Err(ConformError::invalid_query(text, "file path must end with a wildcard"));
        }
        return TestQuery::multi_file(suite, files);
    }
    if files_wildcard {
        return Err(ConformError::invalid_query(text, "wildcard not allowed in file path here"));
    }

    let (tests, tests_wildcard) = parse_big_part(big_parts[2], text, PATH_SEPARATOR)?;
    if big_parts.len() == 3 {
        if !tests_wildcard {
            return Err(ConformError::invalid_query(text, "test path must end with a wildcard"));
        }
        return TestQuery::multi_test(suite, files, tests);
    }
    if tests_wildcard {
        return Err(ConformError::invalid_query(text, "wildcard not allowed in test path here"));
    }

    let (param_parts, params_wildcard) = parse_big_part(big_parts[3], text, PARAM_SEPARATOR)?;
    let mut params = Params::new();
    for part in &param_parts {
        let (key, value) = parse_single_param(part, text)?;
        if params.contains_key(&key) {
            return Err(ConformError::invalid_query(text, format!("duplicate param key {key}")));
        }
        params.insert(key, value);
    }

    if params_wildcard {
        TestQuery::multi_case(suite, files, tests, params)
    } else {
        TestQuerySingleCase::new(suite, files, tests, params).map(TestQuerySingleCase::into_query)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::params;

    fn round_trip(text: &str) {
        assert_eq!(parse_query(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_levels() {
        assert_eq!(parse_query("s:*").unwrap().level(), QueryLevel::MultiFile);
        assert_eq!(parse_query("s:a,b,*").unwrap().level(), QueryLevel::MultiFile);
        assert_eq!(parse_query("s:a:*").unwrap().level(), QueryLevel::MultiTest);
        assert_eq!(parse_query("s:a:b:*").unwrap().level(), QueryLevel::MultiCase);
        assert_eq!(parse_query("s:a:b:").unwrap().level(), QueryLevel::SingleCase);
        assert_eq!(parse_query("s:a:b:x=1").unwrap().level(), QueryLevel::SingleCase);
    }

    #[test]
    fn test_display_round_trips() {
        round_trip("s:*");
        round_trip("s:a,b,*");
        round_trip("s:a,b:c,*");
        round_trip("s:a:b:*");
        round_trip("s:a:b:x=1;*");
        round_trip("s:a:b:");
        round_trip("s:a:b:x=1;y=\"str\";z=[1,2]");
    }

    #[test]
    fn test_params_parsed() {
        let q = parse_query("s:a:b:x=1;y=true;z=\"_undef_\"").unwrap();
        assert_eq!(q.params().get_i64("x"), Some(1));
        assert_eq!(q.params().get_bool("y"), Some(true));
        assert!(q.params().get("z").unwrap().is_undefined());
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "s",
            "s:a",
            "s:a,*:*",
            "s:a:b",
            "s:a:b,*:x=1",
            "s:a*:*",
            "s:a:b:x",
            "s:a:b:_x=1",
            "s:a:b:x=1;",
            "s:a:b:x=1;x=2",
            "s:a b:*",
            "s::b:",
            "s:a:b:x=nope",
        ] {
            assert!(parse_query(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_single_case_rejects_reserved_strings() {
        let err = TestQuerySingleCase::new(
            "s",
            vec!["a".into()],
            vec!["b".into()],
            params! { "x" => "_nan_" },
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_single_case_omits_private() {
        let q = TestQuerySingleCase::new(
            "s",
            vec!["a".into()],
            vec!["b".into()],
            params! { "x" => 1, "_y" => 2 },
        )
        .unwrap();
        assert_eq!(q.to_string(), "s:a:b:x=1");
    }

    #[test]
    fn test_contains() {
        let wide = parse_query("s:a,*").unwrap();
        let narrow = parse_query("s:a,b:c:x=1").unwrap();
        assert!(wide.contains(&narrow));
        assert!(!narrow.contains(&wide));
    }

    #[test]
    fn test_serde_as_string() {
        let q = parse_query("s:a:b:x=1").unwrap();
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, "\"s:a:b:x=1\"");
        let back: TestQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
