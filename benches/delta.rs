use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bsdelta::{apply_to_vec, encode, generate, DiffOptions, SuffixArray};

fn inputs(len: usize) -> (Vec<u8>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(len as u64);
    let mut old = vec![0; len];
    rng.fill(&mut old[..]);
    let mut new = old.clone();
    for _ in 0..len / 1000 + 1 {
        let at = rng.gen_range(0..len);
        new[at] = !new[at];
    }
    new.splice(len / 2..len / 2, (0..len / 100).map(|_| rng.gen::<u8>()));
    (old, new)
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");
    group.sample_size(10);
    for &len in &[10_000, 100_000, 1_000_000] {
        let (old, new) = inputs(len);
        group.bench_with_input(BenchmarkId::new("sort", len), &old, |b, old| {
            b.iter(|| SuffixArray::new(old))
        });

        let suffixes = SuffixArray::new(&old);
        group.bench_with_input(BenchmarkId::new("encode", len), &new, |b, new| {
            b.iter(|| encode(&suffixes, new, &DiffOptions::default(), |_| {}))
        });

        let mut patch = Vec::new();
        generate(&old, &new, &mut patch).unwrap();
        group.bench_with_input(BenchmarkId::new("apply", len), &patch, |b, patch| {
            b.iter(|| apply_to_vec(&old, patch).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_delta);
criterion_main!(benches);
