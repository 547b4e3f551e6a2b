// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// rowtrim-image — Image processing for the Rowtrim service.
//
// Provides the blank-row filter (row statistics, run planning, row deletion),
// the intensity view it classifies rows on, and the decode/encode glue that
// turns an uploaded file into a filtered PNG.

pub mod codec;
pub mod filter;
pub mod luminance;

// Re-export the primary entry points so callers can use `rowtrim_image::filter` etc.
pub use codec::{decode, encode_png, process_upload};
pub use filter::{BlankRowFilter, filter, plan_removals, remove_rows, row_std_dev};
pub use luminance::intensity_view;
