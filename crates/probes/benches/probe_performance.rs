//! Hot paths of the probe engine that run once per attempt or per response

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netkeeper_probes::files::candidate_name;
use netkeeper_probes::redirect::RedirectResolver;
use netkeeper_probes::{AttemptAggregator, AttemptOutcome, ProbeError};
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

fn bench_aggregation(c: &mut Criterion) {
    c.bench_function("aggregate_1000_attempts", |b| {
        b.iter(|| {
            let mut aggregator = AttemptAggregator::new();
            for i in 0..1000u64 {
                let attempt = match i % 4 {
                    0 | 1 => Ok(AttemptOutcome::success(Duration::from_millis(i))),
                    2 => Ok(AttemptOutcome::timed_out(Duration::from_millis(i))),
                    _ => Err(ProbeError::ConnectionRefused),
                };
                aggregator.record(black_box(attempt));
            }
            black_box(aggregator.finish())
        })
    });
}

fn bench_file_naming(c: &mut Criterion) {
    let url = Url::parse("https://downloads.example.com/releases/v1.2/archive%20final.tar.gz").unwrap();

    c.bench_function("name_from_disposition", |b| {
        b.iter(|| {
            candidate_name(
                black_box(&url),
                black_box(Some("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf")),
                None,
            )
        })
    });

    c.bench_function("name_from_url", |b| {
        b.iter(|| candidate_name(black_box(&url), None, Some("application/gzip")))
    });
}

fn bench_redirects(c: &mut Criterion) {
    let base = Url::parse("http://example.com/a/b/c").unwrap();
    let location = HeaderValue::from_static("../mirror/file.bin");

    c.bench_function("resolve_redirect_step", |b| {
        b.iter(|| {
            let mut resolver = RedirectResolver::new(true, 20);
            black_box(resolver.next(&base, StatusCode::FOUND, Some(&location)))
        })
    });
}

criterion_group!(benches, bench_aggregation, bench_file_naming, bench_redirects);
criterion_main!(benches);
