// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::protocol::{DEFAULT_MAX_REPLY_LENGTH, DEFAULT_USER_AGENT};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("Failure reading connector configuration from {path:?}: {error}")]
  Read {
    path: PathBuf,
    #[source]
    error: std::io::Error,
  },
  #[error("Failure parsing connector configuration: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("max-reply-length must be at least {minimum} bytes, got {configured}")]
  ReplyLengthTooSmall { minimum: usize, configured: usize },
}

/// Settings shared by every negotiation a connector performs
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConnectorConfig {
  /// Value of the `User-Agent` header sent with each CONNECT request
  pub user_agent: String,
  /// Largest proxy reply header block accepted, terminator excluded
  pub max_reply_length: usize,
  /// Trust settings used when the proxy itself is reached over TLS
  pub tls: ProxyTlsOptions,
}

impl Default for ConnectorConfig {
  fn default() -> Self {
    Self {
      user_agent: DEFAULT_USER_AGENT.to_string(),
      max_reply_length: DEFAULT_MAX_REPLY_LENGTH,
      tls: ProxyTlsOptions::default(),
    }
  }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProxyTlsOptions {
  /// PEM file of additional certificate authorities to trust for the proxy
  pub authority: Option<PathBuf>,
  /// Whether the platform's trust store is consulted
  pub native_roots: bool,
  /// Skip proxy certificate validation; requires the `insecure-debug` feature
  pub accept_invalid_certs: bool,
}

impl Default for ProxyTlsOptions {
  fn default() -> Self {
    Self {
      authority: None,
      native_roots: true,
      accept_invalid_certs: false,
    }
  }
}

impl ConnectorConfig {
  /// Smallest reply limit that still fits a status line like `HTTP/1.1 200 OK`
  pub const MIN_REPLY_LENGTH: usize = 16;

  pub fn from_json_slice(json: &[u8]) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_slice(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read(path).map_err(|error| ConfigError::Read {
      path: path.to_path_buf(),
      error,
    })?;
    Self::from_json_slice(&json)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_reply_length < Self::MIN_REPLY_LENGTH {
      return Err(ConfigError::ReplyLengthTooSmall {
        minimum: Self::MIN_REPLY_LENGTH,
        configured: self.max_reply_length,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::{ConfigError, ConnectorConfig};
  use crate::common::protocol::{DEFAULT_MAX_REPLY_LENGTH, DEFAULT_USER_AGENT};

  #[test]
  fn empty_document_yields_defaults() {
    let config = ConnectorConfig::from_json_slice(b"{}").expect("Empty config must parse");
    assert_eq!(config, ConnectorConfig::default());
    assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    assert_eq!(config.max_reply_length, DEFAULT_MAX_REPLY_LENGTH);
    assert!(config.tls.native_roots);
    assert!(!config.tls.accept_invalid_certs);
  }

  #[test]
  fn kebab_case_fields() {
    let config = ConnectorConfig::from_json_slice(
      br#"{
        "user-agent": "corp-agent/2",
        "max-reply-length": 4096,
        "tls": { "authority": "/etc/proxy-ca.pem", "native-roots": false }
      }"#,
    )
    .expect("Config must parse");
    assert_eq!(config.user_agent, "corp-agent/2");
    assert_eq!(config.max_reply_length, 4096);
    assert_eq!(
      config.tls.authority.as_deref(),
      Some(std::path::Path::new("/etc/proxy-ca.pem"))
    );
    assert!(!config.tls.native_roots);
  }

  #[test]
  fn rejects_unknown_fields_and_tiny_limits() {
    assert!(matches!(
      ConnectorConfig::from_json_slice(br#"{ "useragent": "x" }"#),
      Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
      ConnectorConfig::from_json_slice(br#"{ "max-reply-length": 3 }"#),
      Err(ConfigError::ReplyLengthTooSmall { configured: 3, .. })
    ));
  }

  #[test]
  fn missing_file_reports_path() {
    let err = ConnectorConfig::from_json_file("/nonexistent/proxyconnect.json").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/proxyconnect.json"));
  }
}
