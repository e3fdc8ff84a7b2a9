use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pdf_graft::decoders::{DecodeLimits, Filter, FilterStage, decode_chain};
use pdf_graft::{DictBuilder, Merger, Object, ParserOptions, PdfDocument, SaveOptions};

/// Saved document with `pages` pages, each with a small content stream.
fn sample_document(pages: usize) -> Vec<u8> {
    let mut doc = PdfDocument::new().unwrap();
    let root = doc.pages_root().unwrap();
    let mut kids = Vec::with_capacity(pages);
    for i in 0..pages {
        let content = doc.add_object(Object::Stream {
            dict: Default::default(),
            data: format!("BT /F1 12 Tf 72 720 Td (page {}) Tj ET", i).into_bytes().into(),
        });
        let page = DictBuilder::new()
            .name("Type", "Page")
            .insert("Parent", root)
            .insert("Contents", content)
            .into_object();
        kids.push(Object::Reference(doc.add_object(page)));
    }
    let tree = DictBuilder::new()
        .name("Type", "Pages")
        .insert("Count", pages as i64)
        .insert("Kids", kids)
        .into_object();
    doc.set_object(root, tree).unwrap();
    doc.save_to_bytes(&SaveOptions::default().with_compress_streams(true))
        .unwrap()
}

fn bench_open(c: &mut Criterion) {
    let bytes = sample_document(200);
    let mut group = c.benchmark_group("document/open");

    group.bench_function("table_resolve_all", |b| {
        b.iter(|| {
            let data = black_box(bytes.clone());
            let mut doc = PdfDocument::from_bytes(data, ParserOptions::default()).unwrap();
            for id in doc.object_ids() {
                black_box(doc.resolve(id).unwrap());
            }
        })
    });

    group.bench_function("forced_recovery", |b| {
        let options = ParserOptions::default().with_force_recovery(true);
        b.iter(|| {
            let data = black_box(bytes.clone());
            let mut doc = PdfDocument::from_bytes(data, options.clone()).unwrap();
            black_box(doc.page_count().unwrap())
        })
    });

    group.finish();
}

fn bench_flate(c: &mut Criterion) {
    let data: Vec<u8> = (0..256 * 1024).map(|i: u32| (i % 97) as u8).collect();
    let stage = FilterStage::new(Filter::FlateDecode);
    let encoded = stage.encode(&data).unwrap();
    let mut group = c.benchmark_group("filters/flate");

    group.bench_function("encode", |b| b.iter(|| stage.encode(black_box(&data)).unwrap()));
    let stages = [stage.clone()];
    group.bench_function("decode", |b| {
        b.iter(|| decode_chain(black_box(&encoded), &stages, &DecodeLimits::default()))
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let bytes = sample_document(50);
    c.bench_function("merge/append_50_pages", |b| {
        b.iter(|| {
            let mut dest = PdfDocument::new().unwrap();
            let mut src =
                PdfDocument::from_bytes(bytes.clone(), ParserOptions::default()).unwrap();
            black_box(Merger::append(&mut dest, &mut src).unwrap())
        })
    });
}

criterion_group!(benches, bench_open, bench_flate, bench_merge);
criterion_main!(benches);
