use codescout::bm25::{Bm25Model, GenerateOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_corpus(documents: usize) -> Vec<String> {
    let vocab = [
        "parse", "request", "handler", "buffer", "stream", "socket", "index", "vector", "token",
        "cache", "queue", "worker", "batch", "retry", "timeout", "config", "logger", "metric",
    ];
    (0..documents)
        .map(|i| {
            (0..60)
                .map(|j| vocab[(i * 7 + j * 13) % vocab.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn bench_learn(c: &mut Criterion) {
    let corpus = synthetic_corpus(2000);

    c.bench_function("bm25_learn_2000_docs", |b| {
        b.iter(|| {
            let mut model = Bm25Model::new();
            model.learn(black_box(corpus.iter())).unwrap();
            model
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let corpus = synthetic_corpus(2000);
    let mut model = Bm25Model::new();
    model.learn(corpus.iter()).unwrap();

    let query = "retry the request handler when the socket stream times out";
    let options = GenerateOptions {
        max_terms: Some(256),
        normalize: true,
        ..Default::default()
    };

    c.bench_function("bm25_generate_query", |b| {
        b.iter(|| model.generate(black_box(query), &options).unwrap())
    });

    let document = corpus[0].as_str();
    c.bench_function("bm25_generate_document", |b| {
        b.iter(|| model.generate(black_box(document), &GenerateOptions::default()).unwrap())
    });
}

criterion_group!(benches, bench_learn, bench_generate);
criterion_main!(benches);
