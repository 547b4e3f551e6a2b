// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Settings come from an optional JSON file and are then overridden by
// `ROWTRIM_*` environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowtrimError};
use crate::types::FilterParams;

/// Default TCP port of the upload endpoint.
pub const DEFAULT_PORT: u16 = 8000;

/// Default cap on a whole HTTP request (head plus body).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

/// Origin of the local web front-end allowed by default.
pub const DEFAULT_DEV_ORIGIN: &str = "http://localhost:5173";

/// Network settings of the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (default all interfaces).
    pub bind_address: IpAddr,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
    /// Origins permitted by the CORS policy. `"*"` allows any origin, an
    /// empty list disables CORS headers entirely.
    pub allowed_origins: Vec<String>,
    /// Requests larger than this are rejected with 413.
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            allowed_origins: vec![DEFAULT_DEV_ORIGIN.to_string()],
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Filter parameters used when a request does not supply its own.
    pub filter: FilterParams,
}

impl AppConfig {
    /// Parse a JSON document. Absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from `path` if given and present, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data).map_err(|err| {
            RowtrimError::Config(format!("failed to parse {}: {}", path.display(), err))
        })
    }

    /// Apply `ROWTRIM_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ROWTRIM_BIND") {
            self.server.bind_address = parse_override("ROWTRIM_BIND", &value)?;
        }
        if let Some(value) = lookup("ROWTRIM_PORT") {
            self.server.port = parse_override("ROWTRIM_PORT", &value)?;
        }
        if let Some(value) = lookup("ROWTRIM_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("ROWTRIM_MAX_REQUEST_BYTES") {
            self.server.max_request_bytes = parse_override("ROWTRIM_MAX_REQUEST_BYTES", &value)?;
        }
        if let Some(value) = lookup("ROWTRIM_THRESHOLD") {
            self.filter.threshold = parse_override("ROWTRIM_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("ROWTRIM_SPACING") {
            self.filter.spacing = parse_override("ROWTRIM_SPACING", &value)?;
        }
        Ok(())
    }

    /// Check the settings are usable before the server starts.
    pub fn validate(&self) -> Result<()> {
        self.filter
            .validate()
            .map_err(|err| RowtrimError::Config(err.to_string()))?;
        if self.server.max_request_bytes == 0 {
            return Err(RowtrimError::Config(
                "max_request_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| RowtrimError::Config(format!("{key}={value:?}: {err}")))
}
