// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the blank-row filter in the rowtrim-image crate.
// Uses a synthetic page: bands of "text" rows separated by tall white gaps,
// the layout the filter is meant to tighten.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

use rowtrim_core::FilterParams;
use rowtrim_image::{BlankRowFilter, intensity_view};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 800x1200 RGB page: 20-row text bands every 60 rows, white elsewhere.
fn synthetic_page() -> DynamicImage {
    let (width, height) = (800u32, 1200u32);
    let page = RgbImage::from_fn(width, height, |x, y| {
        if y % 60 < 20 && (x / 3 + y) % 4 == 0 {
            Rgb([20, 20, 20])
        } else {
            Rgb([250, 250, 250])
        }
    });
    DynamicImage::ImageRgb8(page)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_intensity_view(c: &mut Criterion) {
    let page = synthetic_page();
    c.bench_function("intensity_view (800x1200 rgb)", |b| {
        b.iter(|| black_box(intensity_view(black_box(&page))));
    });
}

fn bench_filter_apply(c: &mut Criterion) {
    let page = synthetic_page();
    let filter = BlankRowFilter::new(FilterParams::default());
    c.bench_function("blank_row_filter (800x1200 rgb)", |b| {
        b.iter(|| {
            let (trimmed, summary) = filter.apply(black_box(page.clone()));
            black_box((trimmed, summary));
        });
    });
}

criterion_group!(benches, bench_intensity_view, bench_filter_apply);
criterion_main!(benches);
