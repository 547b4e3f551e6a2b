// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `multipart/form-data` body parsing (RFC 7578).
//
// The whole body is already in memory, so parts are sliced out of it by
// scanning for the boundary delimiter.

use rowtrim_core::error::{Result, RowtrimError};

use crate::http::find_subsequence;

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    /// Field name from `Content-Disposition`.
    pub name: String,
    /// Client-side file name, present for file uploads.
    pub filename: Option<String>,
    /// Declared media type of the part.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// The part's data as UTF-8 text, for plain form fields.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Extract the boundary from a `multipart/form-data` content type.
///
/// Returns `None` for other media types or when no boundary is given.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = split_params(content_type).into_iter();
    let media_type = params.next()?;
    if !media_type.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| unquote(value.trim()).to_string())
        })
        .find(|boundary| !boundary.is_empty())
}

/// Split a multipart body into its parts.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<FormPart>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut separator = b"\r\n".to_vec();
    separator.extend_from_slice(&delimiter);

    let first = find_subsequence(body, &delimiter).ok_or_else(|| {
        RowtrimError::MalformedRequest("multipart body does not contain its boundary".into())
    })?;
    let mut pos = first + delimiter.len();
    let mut parts = Vec::new();

    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        let after_line = skip_line_end(rest).ok_or_else(|| {
            RowtrimError::MalformedRequest("missing line break after boundary".into())
        })?;
        pos += after_line;

        let headers_len = find_subsequence(&body[pos..], b"\r\n\r\n").ok_or_else(|| {
            RowtrimError::MalformedRequest("unterminated part headers".into())
        })?;
        let headers = std::str::from_utf8(&body[pos..pos + headers_len]).map_err(|_| {
            RowtrimError::MalformedRequest("part headers are not valid UTF-8".into())
        })?;
        let data_start = pos + headers_len + 4;

        let data_len = find_subsequence(&body[data_start..], &separator).ok_or_else(|| {
            RowtrimError::MalformedRequest("part is missing its closing boundary".into())
        })?;
        let data = body[data_start..data_start + data_len].to_vec();

        parts.push(build_part(headers, data)?);
        pos = data_start + data_len + separator.len();
    }

    Ok(parts)
}

/// Length of the line ending at the start of `rest`, tolerating transport
/// padding before it.
fn skip_line_end(rest: &[u8]) -> Option<usize> {
    let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    rest[padding..]
        .starts_with(b"\r\n")
        .then_some(padding + 2)
}

fn build_part(headers: &str, data: Vec<u8>) -> Result<FormPart> {
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for param in split_params(value).into_iter().skip(1) {
                let Some((param_key, param_value)) = param.split_once('=') else {
                    continue;
                };
                let param_value = unquote(param_value.trim()).to_string();
                match param_key.trim().to_ascii_lowercase().as_str() {
                    "name" => name = Some(param_value),
                    "filename" => filename = Some(param_value),
                    _ => {}
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let name = name.ok_or_else(|| {
        RowtrimError::MalformedRequest("form part has no name in Content-Disposition".into())
    })?;
    Ok(FormPart {
        name,
        filename,
        content_type,
        data,
    })
}

/// Split a header value on `;`, ignoring separators inside quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
