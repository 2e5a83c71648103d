// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::engine_core::constants::config as keys;
use crate::engine_core::errors::GatewayError;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_address: parse_or(&lookup, keys::ENV_BIND_ADDRESS, defaults.bind_address)?,
            port: parse_or(&lookup, keys::ENV_PORT, defaults.port)?,
            allowed_origins: lookup(keys::ENV_ALLOWED_ORIGINS)
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_level: lookup(keys::ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: lookup(keys::ENV_LOG_FORMAT)
                .map(|s| s.trim().to_lowercase())
                .unwrap_or(defaults.log_format),
            max_body_bytes: parse_or(&lookup, keys::ENV_MAX_BODY_BYTES, defaults.max_body_bytes)?,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, GatewayError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GatewayError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: keys::DEFAULT_BIND_ADDRESS
                .parse()
                .unwrap_or(IpAddr::from([127, 0, 0, 1])),
            port: keys::DEFAULT_PORT,
            allowed_origins: Vec::new(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            max_body_bytes: keys::DEFAULT_MAX_BODY_BYTES,
        }
    }
}
