//! Criterion benchmarks for the keycode codec.
//!
//! Decoding runs once per key every time a keymap is rendered, so it is the
//! path worth watching.
//!
//! Run with:
//! ```bash
//! cargo bench --package keystudio-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keystudio_core::keycode::{CatalogId, CatalogRegistry, KeycodeParams, OsProfile};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn codec() -> keystudio_core::KeycodeCodec {
    CatalogRegistry::new(CatalogId::Default, OsProfile::Default)
        .expect("bundled catalog must load")
        .codec()
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `encode` for one id of each entry kind.
fn bench_encode(c: &mut Criterion) {
    let codec = codec();
    let cases: &[(&str, &str, Option<KeycodeParams>)] = &[
        ("basic", "KC_A", None),
        ("alias", "KC_ESC", None),
        ("layer", "QK_MO", Some(KeycodeParams::layer(3))),
        ("layer_tap", "QK_LT", Some(KeycodeParams::layer_tap(2, "KC_SPACE"))),
        ("mod_tap", "QK_MT", Some(KeycodeParams::mod_tap("LSFT", "KC_A"))),
    ];

    let mut group = c.benchmark_group("encode");
    for (name, id, params) in cases {
        group.bench_with_input(BenchmarkId::new("kind", name), params, |b, params| {
            b.iter(|| {
                codec
                    .encode(black_box(id), black_box(params.as_ref()))
                    .expect("encode must succeed")
            })
        });
    }
    group.finish();
}

/// Benchmarks `decode` for one code of each shape, plus a miss.
fn bench_decode(c: &mut Criterion) {
    let codec = codec();
    let cases: &[(&str, u16)] = &[
        ("basic", 0x0004),
        ("layer", 0x5223),
        ("layer_tap", 0x4304),
        ("mod_tap", 0x6204),
        ("unknown", 0xFFFF),
    ];

    let mut group = c.benchmark_group("decode");
    for (name, code) in cases {
        group.bench_with_input(BenchmarkId::new("shape", name), code, |b, code| {
            b.iter(|| codec.decode(black_box(*code)))
        });
    }
    group.finish();
}

/// Labels for a full 6x17 keymap layer, the per-render workload.
fn bench_label_layer(c: &mut Criterion) {
    let codec = codec();
    let layer: Vec<u16> = (0..102u16).map(|i| 0x0004 + (i % 0x60)).collect();

    c.bench_function("decode_label_layer_102", |b| {
        b.iter(|| {
            for code in &layer {
                black_box(codec.decode_label(black_box(*code)));
            }
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_label_layer);
criterion_main!(benches);
