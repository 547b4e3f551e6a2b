// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blank-row filter — finds rows whose intensity barely varies and collapses
// long runs of them, keeping the first `spacing` rows of every run.
//
// The filter is a pure function of the pixel data and its parameters. It never
// fails: degenerate images (no rows or no columns) come back unchanged.

use image::{DynamicImage, GrayImage, ImageBuffer, Pixel};
use rowtrim_core::{FilterParams, FilterSummary};
use tracing::{debug, info, instrument};

use crate::luminance::intensity_view;

// ---------------------------------------------------------------------------
// Row statistics
// ---------------------------------------------------------------------------

/// Population standard deviation of a row of intensity values.
///
/// An empty row has no spread and yields 0.
pub fn row_std_dev(row: &[u8]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    let n = row.len() as f64;
    let mean = row.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = row
        .iter()
        .map(|&v| {
            let delta = v as f64 - mean;
            delta * delta
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Blank classification of one row statistic.
///
/// The comparison is strict, so a row sitting exactly on the threshold is
/// content. A zero threshold still admits perfectly uniform rows.
#[inline]
fn is_blank(std_dev: f64, threshold: f64) -> bool {
    std_dev < threshold || (threshold == 0.0 && std_dev == 0.0)
}

// ---------------------------------------------------------------------------
// Run planning
// ---------------------------------------------------------------------------

/// Decide which rows to delete from per-row blank flags.
///
/// Walks the rows top to bottom tracking the current run of consecutive blank
/// rows. When a run ends (at a content row or at the bottom of the image) and
/// it is at least `spacing` rows long, every member past the first `spacing`
/// is scheduled for removal. The result is ascending.
pub fn plan_removals<I>(blank_rows: I, spacing: usize) -> Vec<u32>
where
    I: IntoIterator<Item = bool>,
{
    let mut removals = Vec::new();
    let mut run_start = 0u32;
    let mut run_len = 0usize;
    let mut index = 0u32;

    for blank in blank_rows {
        if blank {
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
        } else {
            close_run(run_start, run_len, spacing, &mut removals);
            run_len = 0;
        }
        index += 1;
    }
    // A run that reaches the last row is closed here.
    close_run(run_start, run_len, spacing, &mut removals);

    removals
}

fn close_run(start: u32, len: usize, spacing: usize, removals: &mut Vec<u32>) {
    if len == 0 || len < spacing {
        return;
    }
    let first_removed = start + spacing as u32;
    let end = start + len as u32;
    removals.extend(first_removed..end);
}

// ---------------------------------------------------------------------------
// Row deletion
// ---------------------------------------------------------------------------

/// Copy `buffer` without the rows listed in `removed`.
///
/// Out-of-range indices are ignored. Returns `None` only if the rebuilt
/// buffer does not fit its dimensions, which cannot happen for a well-formed
/// input.
fn retain_rows<P>(
    buffer: &ImageBuffer<P, Vec<P::Subpixel>>,
    removed: &[u32],
) -> Option<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
{
    let (width, height) = buffer.dimensions();
    let row_len = width as usize * P::CHANNEL_COUNT as usize;

    let mut keep = vec![true; height as usize];
    for &row in removed {
        if let Some(slot) = keep.get_mut(row as usize) {
            *slot = false;
        }
    }
    let kept_rows = keep.iter().filter(|&&k| k).count();

    let mut samples = Vec::with_capacity(kept_rows * row_len);
    for (row, data) in buffer
        .as_raw()
        .chunks_exact(row_len)
        .take(height as usize)
        .enumerate()
    {
        if keep[row] {
            samples.extend_from_slice(data);
        }
    }

    ImageBuffer::from_raw(width, kept_rows as u32, samples)
}

/// Delete the given rows from `image`, keeping its pixel format, width, and
/// the exact content and order of every surviving row.
pub fn remove_rows(image: DynamicImage, rows: &[u32]) -> DynamicImage {
    if rows.is_empty() || image.width() == 0 || image.height() == 0 {
        return image;
    }

    let trimmed = match &image {
        DynamicImage::ImageLuma8(buf) => retain_rows(buf, rows).map(DynamicImage::ImageLuma8),
        DynamicImage::ImageLumaA8(buf) => retain_rows(buf, rows).map(DynamicImage::ImageLumaA8),
        DynamicImage::ImageRgb8(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgb8),
        DynamicImage::ImageRgba8(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgba8),
        DynamicImage::ImageLuma16(buf) => retain_rows(buf, rows).map(DynamicImage::ImageLuma16),
        DynamicImage::ImageLumaA16(buf) => retain_rows(buf, rows).map(DynamicImage::ImageLumaA16),
        DynamicImage::ImageRgb16(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgb16),
        DynamicImage::ImageRgba16(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgba16),
        DynamicImage::ImageRgb32F(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgb32F),
        DynamicImage::ImageRgba32F(buf) => retain_rows(buf, rows).map(DynamicImage::ImageRgba32F),
        other => retain_rows(&other.to_rgba32f(), rows).map(DynamicImage::ImageRgba32F),
    };

    trimmed.unwrap_or(image)
}

// ---------------------------------------------------------------------------
// BlankRowFilter
// ---------------------------------------------------------------------------

/// Configured blank-row filter.
///
/// ```ignore
/// let filter = BlankRowFilter::new(FilterParams::new(10.0, 6));
/// let (trimmed, summary) = filter.apply(image);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRowFilter {
    params: FilterParams,
}

impl BlankRowFilter {
    pub fn new(params: FilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Blank flag for every row of an intensity view.
    pub fn classify(&self, intensity: &GrayImage) -> Vec<bool> {
        let (width, height) = intensity.dimensions();
        if width == 0 {
            return vec![false; height as usize];
        }
        intensity
            .as_raw()
            .chunks_exact(width as usize)
            .take(height as usize)
            .map(|row| is_blank(row_std_dev(row), self.params.threshold))
            .collect()
    }

    /// Rows of `image` that a filter pass would delete, ascending.
    pub fn rows_to_remove(&self, image: &DynamicImage) -> Vec<u32> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }
        let intensity = intensity_view(image);
        plan_removals(self.classify(&intensity), self.params.spacing)
    }

    /// Run the filter, returning the trimmed image and what was removed.
    #[instrument(
        skip(self, image),
        fields(
            width = image.width(),
            height = image.height(),
            threshold = self.params.threshold,
            spacing = self.params.spacing
        )
    )]
    pub fn apply(&self, image: DynamicImage) -> (DynamicImage, FilterSummary) {
        let original_height = image.height();
        let removed_rows = self.rows_to_remove(&image);
        debug!(removed = removed_rows.len(), "Blank rows planned for removal");

        let trimmed = remove_rows(image, &removed_rows);
        info!(
            original_height,
            output_height = trimmed.height(),
            removed = removed_rows.len(),
            "Blank-row filter applied"
        );

        let summary = FilterSummary {
            original_height,
            output_height: trimmed.height(),
            removed_rows,
        };
        (trimmed, summary)
    }
}

/// Filter `image` with `params` and return only the trimmed image.
pub fn filter(image: DynamicImage, params: FilterParams) -> DynamicImage {
    BlankRowFilter::new(params).apply(image).0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
