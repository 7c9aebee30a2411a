//! Benchmarks for script fingerprinting and preparation.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use prax_automigrate::{Fingerprint, prepare_execution_script, strip_batch_separators};
use std::hint::black_box;

/// A creation script with `tables` tables, each followed by a `GO` line.
fn creation_script(tables: usize) -> String {
    (0..tables)
        .map(|i| {
            format!(
                "CREATE TABLE [dbo].[Table{i}](\n    [Id] int IDENTITY(1,1) NOT NULL,\n    \
                 [Name] nvarchar(200) NOT NULL,\n    [GoodsCount] int NULL,\n    \
                 CONSTRAINT [PK_Table{i}] PRIMARY KEY ([Id])\n);\nGO\n"
            )
        })
        .collect()
}

/// Benchmark SHA-256 fingerprinting.
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for tables in [10, 100, 1000] {
        let script = creation_script(tables);
        group.throughput(Throughput::Bytes(script.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tables), &script, |b, script| {
            b.iter(|| black_box(Fingerprint::of(script)))
        });
    }

    group.finish();
}

/// Benchmark batch separator stripping.
fn bench_strip_separators(c: &mut Criterion) {
    let mut group = c.benchmark_group("strip_batch_separators");

    for tables in [10, 100, 1000] {
        let script = creation_script(tables);
        group.throughput(Throughput::Bytes(script.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tables), &script, |b, script| {
            b.iter(|| black_box(strip_batch_separators(script)))
        });
    }

    group.finish();
}

/// Benchmark the full preparation with the metadata table prepended.
fn bench_prepare(c: &mut Criterion) {
    let script = creation_script(100);
    let bootstrap = "CREATE TABLE [dbo].[__dbMetadata](Hash nvarchar(max) NOT NULL)";

    c.bench_function("prepare_execution_script_100", |b| {
        b.iter(|| black_box(prepare_execution_script(Some(bootstrap), &script)))
    });
}

criterion_group!(benches, bench_fingerprint, bench_strip_separators, bench_prepare);
criterion_main!(benches);
