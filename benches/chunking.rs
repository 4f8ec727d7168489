use codescout::chunker::{Chunker, SplitStrategy};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_rust_file(functions: usize) -> String {
    (0..functions)
        .map(|i| {
            [
                format!("/// Handler number {i}"),
                format!("pub fn handler_{i}(input: &str) -> Result<String, Error> {{"),
                "    let trimmed = input.trim();".to_string(),
                "    if trimmed.is_empty() {".to_string(),
                "        return Err(Error::Empty);".to_string(),
                "    }".to_string(),
                "    let normalised = trimmed.to_lowercase();".to_string(),
                format!("    Ok(format!(\"{{}}-{i}\", normalised))"),
                "}".to_string(),
                String::new(),
            ]
            .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_ast_chunking(c: &mut Criterion) {
    let chunker = Chunker::with_defaults(SplitStrategy::Ast);
    let small = synthetic_rust_file(20);
    let large = synthetic_rust_file(400);

    c.bench_function("ast_chunk_small_file", |b| {
        b.iter(|| chunker.chunk_file(black_box(&small), "rs"))
    });
    c.bench_function("ast_chunk_large_file", |b| {
        b.iter(|| chunker.chunk_file(black_box(&large), "rs"))
    });
}

fn bench_size_chunking(c: &mut Criterion) {
    let chunker = Chunker::with_defaults(SplitStrategy::Langchain);
    let text = synthetic_rust_file(400);

    c.bench_function("size_chunk_large_file", |b| {
        b.iter(|| chunker.chunk_file(black_box(&text), "rs"))
    });
}

criterion_group!(benches, bench_ast_chunking, bench_size_chunking);
criterion_main!(benches);
