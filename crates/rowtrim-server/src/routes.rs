// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request routing and the upload handler.
//
// `POST /remove_blank_rows` takes a multipart upload in the `file` field plus
// optional `threshold` and `spacing` values (query string or form fields) and
// answers with the filtered image as PNG.

use rowtrim_core::error::{Result, RowtrimError};
use rowtrim_core::{FilterParams, FilterSummary};
use tracing::{debug, info, warn};

use crate::cors::CorsPolicy;
use crate::http::{HttpRequest, HttpResponse};
use crate::multipart::{FormPart, boundary_from_content_type, parse_multipart};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Path of the upload endpoint.
pub const UPLOAD_PATH: &str = "/remove_blank_rows";

/// Form field that carries the image.
pub const UPLOAD_FIELD: &str = "file";

/// Response header reporting how many rows were removed.
pub const REMOVED_ROWS_HEADER: &str = "X-Removed-Rows";

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Everything a request handler needs from the server.
#[derive(Debug, Clone)]
pub struct RouteContext {
    /// Filter parameters used when the request omits them.
    pub defaults: FilterParams,
    pub cors: CorsPolicy,
}

/// Route a parsed request and produce the response, CORS headers included.
pub async fn dispatch(request: &HttpRequest, ctx: &RouteContext) -> HttpResponse {
    if ctx.cors.is_preflight(request) {
        return ctx.cors.preflight_response(request);
    }

    let mut response = if request.path == UPLOAD_PATH {
        if request.method == "POST" {
            match handle_remove_blank_rows(request, &ctx.defaults).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "upload rejected");
                    error_response(&err)
                }
            }
        } else {
            HttpResponse::error(405, "Method Not Allowed").with_header("Allow", "POST")
        }
    } else {
        debug!(path = %request.path, "no route");
        HttpResponse::error(404, "Not Found")
    };

    ctx.cors.decorate(request, &mut response);
    response
}

// ---------------------------------------------------------------------------
// Upload handler
// ---------------------------------------------------------------------------

/// Decode the uploaded image, drop its redundant blank rows, and reply with PNG.
pub async fn handle_remove_blank_rows(
    request: &HttpRequest,
    defaults: &FilterParams,
) -> Result<HttpResponse> {
    let boundary = request
        .header("content-type")
        .and_then(boundary_from_content_type)
        .ok_or_else(|| {
            RowtrimError::MissingUpload(format!(
                "expected a multipart/form-data body with a `{UPLOAD_FIELD}` field"
            ))
        })?;
    let parts = parse_multipart(&request.body, &boundary)?;
    let params = resolve_params(request, &parts, defaults)?;

    let upload = parts
        .into_iter()
        .find(|part| part.name == UPLOAD_FIELD)
        .ok_or_else(|| {
            RowtrimError::MissingUpload(format!("form field `{UPLOAD_FIELD}` is required"))
        })?;
    debug!(
        filename = upload.filename.as_deref().unwrap_or("<none>"),
        bytes = upload.data.len(),
        threshold = params.threshold,
        spacing = params.spacing,
        "upload received"
    );

    let data = upload.data;
    let (png, summary) =
        tokio::task::spawn_blocking(move || rowtrim_image::process_upload(&data, &params))
            .await
            .map_err(|e| RowtrimError::Server(format!("processing task failed: {e}")))??;

    log_summary(&summary);
    Ok(HttpResponse::png(png)
        .with_header(REMOVED_ROWS_HEADER, &summary.removed_count().to_string()))
}

fn log_summary(summary: &FilterSummary) {
    info!(
        original_height = summary.original_height,
        output_height = summary.output_height,
        removed = summary.removed_count(),
        "blank rows removed"
    );
}

/// Work out the filter parameters of a request.
///
/// Non-file form fields take precedence over query parameters; anything
/// missing falls back to `defaults`.
pub fn resolve_params(
    request: &HttpRequest,
    parts: &[FormPart],
    defaults: &FilterParams,
) -> Result<FilterParams> {
    let lookup = |name: &str| -> Result<Option<String>> {
        let field = parts.iter().find(|part| part.name == name && !part.is_file());
        match field {
            Some(part) => part.text().map(|text| Some(text.trim().to_string())).ok_or_else(|| {
                RowtrimError::InvalidParameter(format!("form field `{name}` is not valid UTF-8"))
            }),
            None => Ok(request.query_param(name).map(|value| value.trim().to_string())),
        }
    };

    let mut params = *defaults;
    if let Some(raw) = lookup("threshold")? {
        params.threshold = raw.parse().map_err(|_| {
            RowtrimError::InvalidParameter(format!("threshold must be a number (got {raw:?})"))
        })?;
    }
    if let Some(raw) = lookup("spacing")? {
        params.spacing = raw.parse().map_err(|_| {
            RowtrimError::InvalidParameter(format!(
                "spacing must be a non-negative integer (got {raw:?})"
            ))
        })?;
    }
    params.validate()?;
    Ok(params)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// HTTP status for an error.
pub fn status_for(err: &RowtrimError) -> u16 {
    match err {
        RowtrimError::InvalidParameter(_) | RowtrimError::MissingUpload(_) => 422,
        RowtrimError::MalformedRequest(_) | RowtrimError::ImageDecode(_) => 400,
        RowtrimError::PayloadTooLarge { .. } => 413,
        RowtrimError::LengthRequired => 411,
        RowtrimError::ImageEncode(_)
        | RowtrimError::Server(_)
        | RowtrimError::Config(_)
        | RowtrimError::Io(_)
        | RowtrimError::Serialization(_) => 500,
    }
}

/// JSON error response for `err`.
pub fn error_response(err: &RowtrimError) -> HttpResponse {
    let status = status_for(err);
    let detail = if status == 500 {
        "Internal Server Error".to_string()
    } else {
        err.to_string()
    };
    HttpResponse::error(status, &detail)
}
