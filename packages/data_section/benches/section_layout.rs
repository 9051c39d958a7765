//! Basic benchmarks for the `data_section` crate.
#![allow(
    missing_docs,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::modulo_arithmetic,
    reason = "No need for API documentation or exhaustive care in benchmark code"
)]

use std::hint::black_box;
use std::io::Cursor;
use std::num::NonZero;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use data_section::{DataItem, DataSection};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const ITEM_COUNT: usize = 100;
const ALIGNMENTS: [usize; 4] = [1, 2, 4, 8];

fn build_section() -> DataSection {
    let section = DataSection::new();

    for index in 0..ITEM_COUNT {
        let alignment = NonZero::new(ALIGNMENTS[index % ALIGNMENTS.len()]).unwrap();
        let item = Arc::new(DataItem::zeroed(alignment, index % 16 + 1));
        section.insert(&item).unwrap();
    }

    section
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("section_layout");

    group.bench_function("insert_and_finalize_100", |b| {
        b.iter(|| {
            let section = build_section();
            section.finalize().unwrap();
            black_box(section);
        });
    });

    group.bench_function("emit_100", |b| {
        let section = build_section();
        section.finalize().unwrap();
        let size = section.size().unwrap();

        b.iter(|| {
            let mut sink = Cursor::new(vec![0_u8; size]);
            section.emit(&mut sink, &mut |_patch| {}).unwrap();
            black_box(sink.into_inner());
        });
    });

    group.finish();
}
