use criterion::{Criterion, criterion_group, criterion_main};
use markdown_duplex_engine::{
    FidelityLedger, PulldownBackend, render_document, serialize,
};

fn generate_document(sections: usize) -> String {
    let base = "# Section\n\nParagraph with [a link](http://example.com) and text.\n\n* bullet one\n+ bullet two\n\n```python title=\"demo.py\"\nprint(1)\n```\n\n| a | b |\n|:---|---:|\n| 1 | 2 |\n\n";
    base.repeat(sections)
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.sample_size(10);

    let content = generate_document(50);
    let backend = PulldownBackend::new();

    group.bench_function("render", |b| {
        b.iter(|| {
            let tree = render_document(&backend, std::hint::black_box(&content));
            std::hint::black_box(tree);
        });
    });

    group.bench_function("render_serialize", |b| {
        b.iter(|| {
            let tree = render_document(&backend, std::hint::black_box(&content));
            std::hint::black_box(serialize(&tree));
        });
    });

    group.bench_function("full_fidelity_cycle", |b| {
        b.iter(|| {
            let ledger = FidelityLedger::capture(std::hint::black_box(&content));
            let tree = render_document(&backend, &content);
            std::hint::black_box(ledger.restore(&serialize(&tree)));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
