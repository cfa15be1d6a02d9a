//! A small suite showing every outcome, for trying the CLI.

use conformer::prelude::*;

fn outcomes() -> ConformResult<TestGroup<BaseFixture>> {
    let mut g = make_test_group::<BaseFixture>();
    g.test("passes")?.desc("does nothing wrong").body_sync(|_| Ok(()))?;
    g.test("warns")?.body_sync(|t| {
        t.warn("suspicious but allowed");
        Ok(())
    })?;
    g.test("fails")?.body_sync(|t| {
        t.fail("1 + 1 should be 3");
        Ok(())
    })?;
    g.test("skips")?.body_sync(|t| Err(t.skip("not supported here")))?;
    g.test("later")?.unimplemented()?;
    Ok(g)
}

fn sizes() -> ConformResult<TestGroup<BaseFixture>> {
    let mut g = make_test_group::<BaseFixture>();
    g.test("aligned")?
        .desc("offsets that are a multiple of 4 stay inside the buffer")
        .params(|u| {
            u.combine("size", [4, 8, 16])
                .begin_subcases()
                .expand("offset", |p| (0..p.get_i64("size").unwrap_or(0)).step_by(4))
        })?
        .body_sync(|t| {
            let size = t.params().get_i64("size").unwrap_or(0);
            let offset = t.params().get_i64("offset").unwrap_or(0);
            t.expect(offset % 4 == 0, "aligned offset");
            t.expect(offset < size, "offset inside buffer");
            Ok(())
        })?;
    g.test("odd_sizes")?
        .params(|u| u.combine("size", [3, 4, 5]).unless(|p| p.get_i64("size") == Some(4)))?
        .body_sync(|t| {
            let size = t.params().get_i64("size").unwrap_or(0);
            t.skip_if(size == 5, "size 5 is not interesting")?;
            t.expect(size % 2 == 1, "odd");
            Ok(())
        })?;
    Ok(g)
}

/// The `demo` suite
pub fn suite() -> ConformResult<TestSuite> {
    let mut suite = TestSuite::new("demo");
    suite.add_file("outcomes", outcomes()?)?;
    suite.add_file("buffer,sizes", sizes()?)?;
    Ok(suite)
}
