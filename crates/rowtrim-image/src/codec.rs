// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Codec glue — decode an uploaded file with the `image` crate, run the
// blank-row filter, and encode the result as PNG.

use image::{DynamicImage, ImageFormat};
use rowtrim_core::error::{Result, RowtrimError};
use rowtrim_core::{FilterParams, FilterSummary};
use tracing::{debug, info, instrument};

use crate::filter::BlankRowFilter;

/// Decode raw encoded bytes (PNG, JPEG, BMP, ...). The format is guessed from
/// the leading magic bytes.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        return Err(RowtrimError::ImageDecode("uploaded file is empty".into()));
    }
    let image = image::load_from_memory(data).map_err(|err| {
        RowtrimError::ImageDecode(format!("failed to decode image: {}", err))
    })?;
    debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Image decoded from bytes"
    );
    Ok(image)
}

/// Encode `image` as PNG bytes.
///
/// Float images have no PNG representation and are written as 16-bit.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RowtrimError::ImageEncode(format!(
            "cannot encode a {}x{} image as PNG",
            image.width(),
            image.height()
        )));
    }
    match image {
        DynamicImage::ImageRgb32F(_) => write_png(&DynamicImage::ImageRgb16(image.to_rgb16())),
        DynamicImage::ImageRgba32F(_) => {
            write_png(&DynamicImage::ImageRgba16(image.to_rgba16()))
        }
        _ => write_png(image),
    }
}

fn write_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| RowtrimError::ImageEncode(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

/// Full upload pipeline: decode, filter, re-encode as PNG.
///
/// Fails with `InvalidParameter` when the parameters would remove every row,
/// since an image without rows cannot be encoded.
#[instrument(skip(data, params), fields(data_len = data.len()))]
pub fn process_upload(data: &[u8], params: &FilterParams) -> Result<(Vec<u8>, FilterSummary)> {
    let image = decode(data)?;
    let (trimmed, summary) = BlankRowFilter::new(*params).apply(image);

    if summary.output_height == 0 && summary.original_height > 0 {
        return Err(RowtrimError::InvalidParameter(format!(
            "all {} rows were classified blank and removed; use a spacing above 0 or a lower threshold",
            summary.original_height
        )));
    }

    let png = encode_png(&trimmed)?;
    info!(
        removed = summary.removed_count(),
        png_bytes = png.len(),
        "Upload processed"
    );
    Ok((png, summary))
}
