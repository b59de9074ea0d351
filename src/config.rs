// msnrtp - A client/server implementation of Microsoft's .NET Remoting wire format.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Server configuration: an optional TOML file plus
//! CLI overrides, following the ambient-stack convention of deserializing
//! with `serde`.

use crate::error::{Error, Result};
use crate::frame::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub workers: usize,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            workers: 2,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Custom(format!("invalid config file: {e}")))
    }

    pub fn apply_overrides(&mut self, listen: Option<String>, workers: Option<usize>) {
        if let Some(listen) = listen {
            self.listen_addr = listen;
        }
        if let Some(workers) = workers {
            self.workers = workers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:7431");
        assert_eq!(cfg.workers, 2);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut cfg = ServerConfig::default();
        cfg.apply_overrides(Some("127.0.0.1:9000".to_string()), None);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.workers, 2);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join("msnrtpd_test_config.toml");
        fs::write(&path, "workers = 8\n").unwrap();
        let cfg = ServerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.listen_addr, "0.0.0.0:7431");
        let _ = fs::remove_file(&path);
    }
}
