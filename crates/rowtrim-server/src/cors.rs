// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cross-origin policy for browser front-ends.
//
// Listed origins may call the endpoint with credentials using any method and
// any header. Since credentials are allowed, the matching origin is echoed
// back instead of `*`.

use tracing::debug;

use crate::http::{HttpRequest, HttpResponse};

/// Methods advertised to an allowed preflight.
pub const ALLOWED_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";

/// Seconds a browser may cache a preflight result.
const PREFLIGHT_MAX_AGE: &str = "600";

/// Origin allow-list with credentials enabled.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allow_any: bool,
}

impl CorsPolicy {
    /// Build from configured origins. `"*"` permits every origin; an empty
    /// list turns CORS handling off.
    pub fn new(origins: &[String]) -> Self {
        let allow_any = origins.iter().any(|origin| origin == "*");
        let allowed_origins = origins
            .iter()
            .filter(|origin| *origin != "*")
            .map(|origin| origin.trim_end_matches('/').to_string())
            .collect();
        Self {
            allowed_origins,
            allow_any,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.allow_any || !self.allowed_origins.is_empty()
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allow_any || self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    /// Whether `request` is a CORS preflight this policy should answer.
    pub fn is_preflight(&self, request: &HttpRequest) -> bool {
        self.is_enabled()
            && request.method.eq_ignore_ascii_case("OPTIONS")
            && request.header("origin").is_some()
            && request.header("access-control-request-method").is_some()
    }

    /// Answer a preflight request.
    pub fn preflight_response(&self, request: &HttpRequest) -> HttpResponse {
        let origin = request.header("origin").unwrap_or_default();
        if !self.is_allowed(origin) {
            debug!(origin, "preflight from disallowed origin");
            return HttpResponse::text(400, "Disallowed CORS origin").with_header("Vary", "Origin");
        }

        let mut response = HttpResponse::text(200, "OK")
            .with_header("Access-Control-Allow-Methods", ALLOWED_METHODS)
            .with_header("Access-Control-Max-Age", PREFLIGHT_MAX_AGE);
        if let Some(requested) = request.header("access-control-request-headers") {
            response.set_header("Access-Control-Allow-Headers", requested);
        }
        self.allow_origin(origin, &mut response);
        response
    }

    /// Add CORS headers to a regular response when the caller's origin is allowed.
    pub fn decorate(&self, request: &HttpRequest, response: &mut HttpResponse) {
        if !self.is_enabled() {
            return;
        }
        match request.header("origin") {
            Some(origin) if self.is_allowed(origin) => self.allow_origin(origin, response),
            _ => {}
        }
    }

    fn allow_origin(&self, origin: &str, response: &mut HttpResponse) {
        response.set_header("Access-Control-Allow-Origin", origin);
        response.set_header("Access-Control-Allow-Credentials", "true");
        response.set_header("Vary", "Origin");
    }
}
