// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// rowtrim-server — HTTP upload endpoint for the Rowtrim service.
//
// A small HTTP/1.1 server on Tokio: request framing, multipart form parsing,
// a credentialed CORS allow-list, and the `/remove_blank_rows` route that
// hands uploads to `rowtrim-image`.

pub mod cors;
pub mod http;
pub mod multipart;
pub mod routes;
pub mod server;

pub use cors::CorsPolicy;
pub use routes::{RouteContext, UPLOAD_PATH, dispatch};
pub use server::RowtrimServer;
