//! Params Operations Benchmarks
//!
//! Benchmarks for pipeline expansion, subcase iteration and stringification.
//!
//! Run with: `cargo bench --bench params_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use conformer::query::stringify::{stringify_public_params, stringify_public_params_uniquely};
use conformer::query::parse_query;
use conformer::{params, unit_params, ParamsPipeline};

fn bench_combine_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine_product");

    for width in [4usize, 8, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("3_axes_x{width}")),
            &width,
            |bench, &w| {
                bench.iter(|| {
                    let values: Vec<i64> = (0..w as i64).collect();
                    let pipeline: ParamsPipeline = unit_params()
                        .combine("a", values.clone())
                        .combine("b", values.clone())
                        .combine("c", values)
                        .filter(|p| p.get_i64("a") != p.get_i64("b"))
                        .into();
                    let count = pipeline.iterate_cases_with_subcases().count();
                    black_box(count);
                });
            },
        );
    }

    group.finish();
}

fn bench_subcase_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("subcase_iteration");

    for cases in [10i64, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{cases}_cases")),
            &cases,
            |bench, &n| {
                let pipeline: ParamsPipeline = unit_params()
                    .combine("size", (1..=n).collect::<Vec<_>>())
                    .begin_subcases()
                    .expand("offset", |p| 0..p.get_i64("size").unwrap_or(0))
                    .into();
                bench.iter(|| {
                    let mut total = 0usize;
                    for entry in pipeline.iterate_cases_with_subcases() {
                        if let Ok((_, Some(subcases))) = entry {
                            total += subcases.iter().count();
                        }
                    }
                    black_box(total);
                });
            },
        );
    }

    group.finish();
}

fn bench_stringify(c: &mut Criterion) {
    let mut group = c.benchmark_group("stringify");
    let params = params! {
        "format" => "rgba8unorm",
        "size" => vec![4, 4, 1],
        "mipLevel" => 2,
        "_private" => true,
    };

    group.bench_function("display", |bench| {
        bench.iter(|| black_box(stringify_public_params(black_box(&params))));
    });
    group.bench_function("unique", |bench| {
        bench.iter(|| black_box(stringify_public_params_uniquely(black_box(&params))));
    });
    group.bench_function("parse_query", |bench| {
        bench.iter(|| {
            black_box(parse_query(black_box(
                "webgpu:api,operation,copy:texture:format=\"rgba8unorm\";size=[4,4,1];*",
            )))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_combine_product, bench_subcase_iteration, bench_stringify);
criterion_main!(benches);
