//! The `unittests` suite: the framework checking itself, written with itself.
//!
//! Tests that need real outcomes build a small inner suite, run it through a
//! [`TestHarness`] into a private [`Logger`] and look at the results.

use conformer::logging::{ResultHandle, MAX_LOG_STACKS};
use conformer::params::{merge_params, public_params_equals};
use conformer::prelude::*;
use conformer::query::stringify::stringify_public_params;
use conformer::LogSeverity;
use futures::future::BoxFuture;

const KINDS: [&str; 6] = ["pass", "warn", "fail", "skip", "error", "panic"];

const ROUND_TRIP_QUERIES: [&str; 5] = [
    "s:*",
    "s:a,b,*",
    "s:a:b:*",
    "s:a:b:x=1;*",
    "s:a:b:x=1;y=\"str\";z=[1,2]",
];

async fn run_inner(
    group: TestGroup<BaseFixture>,
    query: &str,
    expectations: &[TestQueryWithExpectation],
) -> ConformResult<SuiteResults> {
    let mut suite = TestSuite::new("inner");
    suite.add_file("f", group)?;
    let query = parse_query(query)?;
    let mut logger = Logger::new(false);
    TestHarness::new()
        .run(&suite, &query, expectations, &mut logger)
        .await
}

fn statuses(results: &SuiteResults) -> Vec<Status> {
    results.results.iter().map(|r| r.status).collect()
}

fn outcome_group() -> ConformResult<TestGroup<BaseFixture>> {
    let mut g = make_test_group::<BaseFixture>();
    g.test("outcome")?
        .params(|u| u.combine("kind", KINDS))?
        .body_sync(|t| match t.params().get_str("kind") {
            Some("warn") => {
                t.warn("w");
                Ok(())
            }
            Some("fail") => {
                t.fail("f");
                Ok(())
            }
            Some("skip") => Err(t.skip("s")),
            Some("error") => Err(CaseError::failure("e")),
            Some("panic") => panic!("p"),
            _ => Ok(()),
        })?;
    Ok(g)
}

mod params_builder {
    use super::*;

    fn collect(pipeline: impl Into<ParamsPipeline>) -> ConformResult<Vec<Params>> {
        let mut out = Vec::new();
        for entry in pipeline.into().iterate_cases_with_subcases() {
            let (case, subcases) = entry?;
            match subcases {
                Some(subcases) => {
                    for sub in &subcases {
                        out.push(merge_params(&case, &sub?)?);
                    }
                }
                None => out.push(case),
            }
        }
        Ok(out)
    }

    pub(super) fn combine_product(t: &mut BaseFixture) -> CaseResult {
        let cases = collect(unit_params().combine("a", [1, 2]).combine("b", ["x", "y"]))?;
        let expected = [
            params! { "a" => 1, "b" => "x" },
            params! { "a" => 1, "b" => "y" },
            params! { "a" => 2, "b" => "x" },
            params! { "a" => 2, "b" => "y" },
        ];
        t.expect(cases == expected, format!("product order, got {cases:?}"));
        Ok(())
    }

    pub(super) fn subcases_filter(t: &mut BaseFixture) -> CaseResult {
        let pipeline = unit_params()
            .combine("x", [1, 2, 3])
            .begin_subcases()
            .expand("y", |p| 0..p.get_i64("x").unwrap_or(0))
            .unless(|p| p.get_i64("y") == Some(0));
        let mut cases = 0;
        let mut subcases = 0;
        for entry in pipeline.iterate_cases_with_subcases() {
            let (_, subs) = entry?;
            cases += 1;
            for sub in subs.iter().flatten() {
                sub?;
                subcases += 1;
            }
        }
        t.expect(cases == 3, format!("3 cases, got {cases}"));
        // y in 1..x for x = 1, 2, 3
        t.expect(subcases == 3, format!("3 subcases, got {subcases}"));
        Ok(())
    }

    pub(super) fn shadowing_is_deferred(t: &mut BaseFixture) -> CaseResult {
        let pipeline = unit_params().combine("a", [1]).combine("a", [2]);
        let first = pipeline.iterate_cases_with_subcases().next();
        match first {
            Some(Err(ConformError::ParamsShadowed { key, .. })) => {
                t.expect(key == "a", format!("shadowed key, got {key}"));
            }
            other => {
                t.fail(format!("expected a shadowing error, got {other:?}"));
            }
        }
        Ok(())
    }

    pub(super) fn duplicate_values_rejected(t: &mut BaseFixture) -> CaseResult {
        t.should_error(unit_params().combine("a", [1, 1]).check(), "duplicate combine");
        let ok = unit_params().combine("a", [1, 2]).check();
        t.expect_ok(ok, "distinct combine");
        Ok(())
    }

    pub(super) fn merge_and_compare(t: &mut BaseFixture) -> CaseResult {
        let a = params! { "x" => 1 };
        let b = params! { "_private" => true };
        let merged = merge_params(&a, &b)?;
        t.expect(merged.len() == 2, "merged both keys");
        t.expect(public_params_equals(&merged, &a), "private keys ignored");
        t.should_error(merge_params(&a, &a), "merging a key twice");
        Ok(())
    }

    pub(super) fn stringify_round_trip(t: &mut BaseFixture) -> CaseResult {
        let index = t.params().get_i64("index").unwrap_or(0);
        let Some(text) = usize::try_from(index).ok().and_then(|i| ROUND_TRIP_QUERIES.get(i)) else {
            return Err(CaseError::failure(format!("no query at index {index}")));
        };
        let parsed = parse_query(text)?;
        t.expect(
            parsed.to_string() == *text,
            format!("{text} re-rendered as {parsed}"),
        );
        Ok(())
    }

    pub(super) fn private_params_not_rendered(t: &mut BaseFixture) -> CaseResult {
        let rendered = stringify_public_params(t.params())?;
        t.expect(!rendered.contains("_seed"), format!("rendered {rendered}"));
        Ok(())
    }
}

mod test_group {
    use super::*;

    pub(super) fn outcome_by_kind(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let results = run_inner(outcome_group()?, "inner:f:*", &[]).await?;
            let expected = vec![
                Status::Pass,
                Status::Warn,
                Status::Fail,
                Status::Skip,
                Status::Fail,
                Status::Fail,
            ];
            let got = statuses(&results);
            t.expect(got == expected, format!("statuses {got:?}"));
            Ok(())
        }
        .boxed()
    }

    pub(super) fn single_case_query(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let results = run_inner(outcome_group()?, "inner:f:outcome:kind=\"warn\"", &[]).await?;
            t.expect(
                statuses(&results) == [Status::Warn],
                format!("selected {:?}", results.results),
            );
            Ok(())
        }
        .boxed()
    }

    pub(super) fn expectations_apply(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let entries: Vec<TestQueryWithExpectation> = serde_json::from_str(
                r#"[
                    {"query": "inner:f:outcome:kind=\"fail\"", "expectation": "fail"},
                    {"query": "inner:f:outcome:kind=\"pass\"", "expectation": "fail"},
                    {"query": "inner:f:outcome:kind=\"panic\"", "expectation": "skip"}
                ]"#,
            )?;
            let results = run_inner(outcome_group()?, "inner:f:*", &entries).await?;
            let got = statuses(&results);
            // An unexpected pass only warns. The expected failure passes and
            // the skipped panic never runs.
            let expected = vec![
                Status::Warn,
                Status::Warn,
                Status::Pass,
                Status::Skip,
                Status::Fail,
                Status::Skip,
            ];
            t.expect(got == expected, format!("statuses {got:?}"));
            Ok(())
        }
        .boxed()
    }

    pub(super) fn subcases_all_skipped(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let mut g = make_test_group::<BaseFixture>();
            g.test("t")?
                .params_subcases_only(|u| u.combine("i", [1, 2]))?
                .body_sync(|t| Err(t.skip("nothing to do")))?;
            let results = run_inner(g, "inner:f:*", &[]).await?;
            t.expect(statuses(&results) == [Status::Skip], "all skipped is a skip");
            Ok(())
        }
        .boxed()
    }

    pub(super) fn subcase_failure_fails_case(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let mut g = make_test_group::<BaseFixture>();
            g.test("t")?
                .params_subcases_only(|u| u.combine("i", [1, 2, 3]))?
                .body_sync(|t| {
                    let i = t.params().get_i64("i").unwrap_or(0);
                    t.skip_if(i == 1, "first is skipped")?;
                    t.expect(i != 3, "last fails");
                    Ok(())
                })?;
            let results = run_inner(g, "inner:f:*", &[]).await?;
            t.expect(statuses(&results) == [Status::Fail], "one failing subcase");
            Ok(())
        }
        .boxed()
    }

    pub(super) fn registration_errors(t: &mut BaseFixture) -> CaseResult {
        let mut g = make_test_group::<BaseFixture>();
        t.expect_ok(g.test("a").map(|_| ()), "first registration");
        t.should_error(g.test("a").map(|_| ()), "duplicate name");
        t.should_error(g.test("b%c").map(|_| ()), "percent in name");
        t.should_error(g.test("has-dash").map(|_| ()), "invalid characters");
        t.should_error(
            g.test("c")?.params(|u| u.combine("x", [1, 1])).map(|_| ()),
            "duplicate case params",
        );
        // "c" has no body
        t.should_error(g.validate(), "missing body");
        Ok(())
    }

    pub(super) fn unimplemented_skips(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let mut g = make_test_group::<BaseFixture>();
            let builder = g.test("later")?.unimplemented()?;
            let described = builder
                .description()
                .is_some_and(|d| d.contains(".unimplemented()"));
            t.expect(described, "description notes unimplemented");
            let results = run_inner(g, "inner:f:*", &[]).await?;
            t.expect(statuses(&results) == [Status::Skip], "unimplemented skips");
            Ok(())
        }
        .boxed()
    }

    pub(super) fn fixture_cleanup(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let mut g = make_test_group::<BaseFixture>();
            g.test("t")?.body_sync(|t| {
                t.track_for_cleanup(|| Err(CaseError::failure("cleanup broke")));
                Ok(())
            })?;
            let results = run_inner(g, "inner:f:*", &[]).await?;
            t.expect(statuses(&results) == [Status::Fail], "failing cleanup fails the case");
            Ok(())
        }
        .boxed()
    }
}

mod logging {
    use super::*;

    fn recorder() -> (TestCaseRecorder, ResultHandle) {
        let handle = ResultHandle::default();
        (TestCaseRecorder::new(handle.clone(), false), handle)
    }

    pub(super) fn recorder_lifecycle(t: &mut BaseFixture) -> CaseResult {
        let (rec, _) = recorder();
        t.should_error(rec.finish(), "finish before start");
        rec.start()?;
        t.should_error(rec.start(), "second start");
        rec.finish()?;
        Ok(())
    }

    pub(super) fn repeated_stacks_deduplicated(t: &mut BaseFixture) -> CaseResult {
        let (rec, handle) = recorder();
        rec.start()?;
        for _ in 0..3 {
            rec.warn("same place");
        }
        rec.finish()?;
        let logs = handle.snapshot().logs.unwrap_or_default();
        t.expect(logs.len() == 1, format!("{} entries", logs.len()));
        t.expect(
            logs.first().is_some_and(|l| l.times_seen == 3),
            "counted three times",
        );
        Ok(())
    }

    pub(super) fn stacks_capped(t: &mut BaseFixture) -> CaseResult {
        let (rec, handle) = recorder();
        rec.start()?;
        for i in 0..4 {
            rec.warn(format!("warning {i}"));
        }
        rec.finish()?;
        let logs = handle.snapshot().logs.unwrap_or_default();
        let shown = logs.iter().filter(|l| !l.stack_hidden).count();
        t.expect(shown == MAX_LOG_STACKS, format!("{shown} stacks shown"));
        Ok(())
    }

    pub(super) fn severity_order(t: &mut BaseFixture) -> CaseResult {
        let order = [
            LogSeverity::Pass,
            LogSeverity::Skip,
            LogSeverity::Warn,
            LogSeverity::ExpectFailed,
            LogSeverity::ValidationFailed,
            LogSeverity::ThrewException,
        ];
        t.expect(order.windows(2).all(|w| w[0] < w[1]), "strictly increasing");
        t.expect(
            LogSeverity::ValidationFailed.status() == Status::Fail,
            "validation failure fails",
        );
        Ok(())
    }

    pub(super) fn logger_json(t: &mut BaseFixture) -> CaseResult {
        let mut logger = Logger::new(false);
        let (rec, _) = logger.record("s:f:t:");
        rec.start()?;
        rec.info("hello");
        rec.finish()?;
        let json: serde_json::Value = serde_json::from_str(&logger.as_json(false)?)?;
        t.expect(json["version"].is_string(), "has version");
        t.expect(json["results"][0][0] == "s:f:t:", "keyed by query");
        t.expect(json["results"][0][1]["status"] == "pass", "status recorded");
        Ok(())
    }

    pub(super) fn worker_single_case(t: &mut BaseFixture) -> BoxFuture<'_, CaseResult> {
        async move {
            let mut suite = TestSuite::new("inner");
            suite.add_file("f", outcome_group()?)?;
            let request = WorkerRequest {
                query: "inner:f:outcome:kind=\"fail\"".to_string(),
                expectations: Vec::new(),
                debug: false,
            };
            let response = run_worker_request(&suite, &request).await?;
            t.expect(response.result.status == Status::Fail, "worker ran the case");

            let ambiguous = WorkerRequest {
                query: "inner:f:*".to_string(),
                ..request
            };
            t.should_error(
                run_worker_request(&suite, &ambiguous).await,
                "multi-case worker query",
            );
            Ok(())
        }
        .boxed()
    }
}

fn params_file() -> ConformResult<TestGroup<BaseFixture>> {
    use params_builder::*;

    let mut g = make_test_group::<BaseFixture>();
    g.test("combine_product")?
        .desc("combine is a cartesian product in declaration order")
        .body_sync(combine_product)?;
    g.test("subcases_filter")?.body_sync(subcases_filter)?;
    g.test("shadowing_is_deferred")?
        .desc("re-declaring a key errors when iterated, not when built")
        .body_sync(shadowing_is_deferred)?;
    g.test("duplicate_values_rejected")?
        .body_sync(duplicate_values_rejected)?;
    g.test("merge_and_compare")?.body_sync(merge_and_compare)?;
    g.test("stringify_round_trip")?
        .params(|u| u.combine("index", 0..ROUND_TRIP_QUERIES.len()))?
        .body_sync(stringify_round_trip)?;
    g.test("private_params_not_rendered")?
        .params(|u| u.combine("size", [1, 2]).combine("_seed", [7]))?
        .body_sync(private_params_not_rendered)?;
    Ok(g)
}

fn test_group_file() -> ConformResult<TestGroup<BaseFixture>> {
    use test_group::*;

    let mut g = make_test_group::<BaseFixture>();
    g.test("outcome_by_kind")?
        .desc("each way a body can end maps to one status")
        .body(outcome_by_kind)?;
    g.test("single_case_query")?.body(single_case_query)?;
    g.test("expectations_apply")?.body(expectations_apply)?;
    g.test("subcases,all_skipped")?.body(subcases_all_skipped)?;
    g.test("subcases,failure_fails_case")?
        .body(subcase_failure_fails_case)?;
    g.test("registration_errors")?.body_sync(registration_errors)?;
    g.test("unimplemented_skips")?.body(unimplemented_skips)?;
    g.test("fixture_cleanup")?.body(fixture_cleanup)?;
    Ok(g)
}

fn logging_file() -> ConformResult<TestGroup<BaseFixture>> {
    use logging::*;

    let mut g = make_test_group::<BaseFixture>();
    g.test("recorder_lifecycle")?.body_sync(recorder_lifecycle)?;
    g.test("repeated_stacks_deduplicated")?
        .body_sync(repeated_stacks_deduplicated)?;
    g.test("stacks_capped")?.body_sync(stacks_capped)?;
    g.test("severity_order")?.body_sync(severity_order)?;
    g.test("logger_json")?.body_sync(logger_json)?;
    g.test("worker_single_case")?.body(worker_single_case)?;
    Ok(g)
}

/// The `unittests` suite
pub fn suite() -> ConformResult<TestSuite> {
    let mut suite = TestSuite::new("unittests");
    suite.add_file("params_builder_and_utils", params_file()?)?;
    suite.add_file("test_group", test_group_file()?)?;
    suite.add_file("logging", logging_file()?)?;
    Ok(suite)
}
