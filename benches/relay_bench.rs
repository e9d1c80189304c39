// Copyright (c) 2026 Bountyy Oy. All rights reserved.

use std::sync::Arc;

use capture_relay::{
    CaptureRule, CredentialStore, HttpClient, MatcherKind, MemoryStore, RawHeaders, RuleRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn registry(kind: MatcherKind, rules: Vec<CaptureRule>) -> RuleRegistry {
    let store = Arc::new(MemoryStore::new());
    let registry = RuleRegistry::new(
        HttpClient::new().expect("client"),
        CredentialStore::new(store.clone(), None),
        store,
        kind.build(),
    );
    registry.install(rules);
    registry
}

fn rule_matching_benchmark(c: &mut Criterion) {
    let urls = [
        "https://shop.example/api/v2/cart?session=abc",
        "https://shop.example/static/app.js",
        "https://cdn.example/images/logo.png",
        "https://shop.example/api/v2/orders/1234/items",
    ];

    let substring = registry(
        MatcherKind::Substring,
        (0..50)
            .map(|i| CaptureRule::new(format!("rule_{}", i), format!("/api/v{}/endpoint_{}", i % 3, i), i))
            .chain([CaptureRule::new("orders", "/orders/", 0)])
            .collect(),
    );
    c.bench_function("match_substring_50", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(substring.match_url(url));
            }
        })
    });

    let glob = registry(
        MatcherKind::Glob,
        (0..50)
            .map(|i| CaptureRule::new(format!("rule_{}", i), format!("*/api/v{}/*/item_{}", i % 3, i), i))
            .chain([CaptureRule::new("orders", "*/orders/*/items", 0)])
            .collect(),
    );
    c.bench_function("match_glob_50", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(glob.match_url(url));
            }
        })
    });

    let regex = registry(
        MatcherKind::Regex,
        (0..50)
            .map(|i| CaptureRule::new(format!("rule_{}", i), format!(r"/api/v\d/thing_{}$", i), i))
            .chain([CaptureRule::new("orders", r"/orders/\d+/items", 0)])
            .collect(),
    );
    c.bench_function("match_regex_50", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(regex.match_url(url));
            }
        })
    });
}

fn header_normalization_benchmark(c: &mut Criterion) {
    let block = RawHeaders::Block(
        "Content-Type: application/json\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nCache-Control: no-store\r\nX-Request-Id: 42\r\n"
            .to_string(),
    );

    c.bench_function("normalize_header_block", |b| {
        b.iter(|| black_box(block.normalize()))
    });
}

criterion_group!(benches, rule_matching_benchmark, header_normalization_benchmark);
criterion_main!(benches);
