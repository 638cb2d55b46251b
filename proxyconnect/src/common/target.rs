// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use std::{fmt, str::FromStr};

/// Destination a proxy is asked to open a tunnel towards
///
/// Credentials are only presented to the proxy when both a username and a password are set.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
  hostname: String,
  port: u16,
  username: Option<String>,
  password: Option<String>,
}

impl TargetDescriptor {
  pub fn new<H: Into<String>>(hostname: H, port: u16) -> Self {
    Self {
      hostname: hostname.into(),
      port,
      username: None,
      password: None,
    }
  }

  pub fn with_credentials<U: Into<String>, P: Into<String>>(
    mut self,
    username: U,
    password: P,
  ) -> Self {
    self.username = Some(username.into());
    self.password = Some(password.into());
    self
  }

  pub fn with_username<U: Into<String>>(mut self, username: Option<U>) -> Self {
    self.username = username.map(Into::into);
    self
  }

  pub fn with_password<P: Into<String>>(mut self, password: Option<P>) -> Self {
    self.password = password.map(Into::into);
    self
  }

  pub fn hostname(&self) -> &str {
    &self.hostname
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn username(&self) -> Option<&str> {
    self.username.as_deref()
  }

  pub fn password(&self) -> Option<&str> {
    self.password.as_deref()
  }

  /// Username and password, only when both are present
  pub fn credentials(&self) -> Option<(&str, &str)> {
    match (&self.username, &self.password) {
      (Some(username), Some(password)) => Some((username, password)),
      _ => None,
    }
  }
}

impl fmt::Debug for TargetDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TargetDescriptor")
      .field("hostname", &self.hostname)
      .field("port", &self.port)
      .field("username", &self.username)
      .field("password", &self.password.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl fmt::Display for TargetDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.hostname.contains(':') && !self.hostname.starts_with('[') {
      write!(f, "[{}]:{}", self.hostname, self.port)
    } else {
      write!(f, "{}:{}", self.hostname, self.port)
    }
  }
}

/// The proxy protocols this crate speaks
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
  /// CONNECT over the raw transport
  Http,
  /// CONNECT over a TLS session established with the proxy itself
  Https,
}

impl ProxyScheme {
  pub fn name(&self) -> &'static str {
    match self {
      ProxyScheme::Http => "http",
      ProxyScheme::Https => "https",
    }
  }

  pub fn uses_tls(&self) -> bool {
    matches!(self, ProxyScheme::Https)
  }

  /// CONNECT proxies resolve the destination name themselves
  pub fn supports_hostname(&self) -> bool {
    true
  }

  pub fn default_port(&self) -> u16 {
    match self {
      ProxyScheme::Http => 8080,
      ProxyScheme::Https => 443,
    }
  }
}

impl fmt::Display for ProxyScheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointParseError {
  #[error("Unsupported proxy scheme {0:?}; expected \"http\" or \"https\"")]
  UnsupportedScheme(String),
  #[error("Proxy endpoint is missing a host")]
  MissingHost,
  #[error("Invalid proxy port {0:?}")]
  InvalidPort(String),
  #[error("IPv6 proxy host {0:?} must be enclosed in brackets")]
  UnbracketedIpv6(String),
}

impl FromStr for ProxyScheme {
  type Err = EndpointParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "http" => Ok(ProxyScheme::Http),
      "https" => Ok(ProxyScheme::Https),
      _ => Err(EndpointParseError::UnsupportedScheme(s.to_string())),
    }
  }
}

/// Location of a proxy server, as written in `scheme://host[:port]` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
  pub scheme: ProxyScheme,
  pub host: String,
  pub port: u16,
}

impl ProxyEndpoint {
  /// `host:port` suitable for handing to a socket connect call
  pub fn authority(&self) -> String {
    if self.host.contains(':') {
      format!("[{}]:{}", self.host, self.port)
    } else {
      format!("{}:{}", self.host, self.port)
    }
  }
}

impl fmt::Display for ProxyEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://{}", self.scheme, self.authority())
  }
}

impl FromStr for ProxyEndpoint {
  type Err = EndpointParseError;

  /// Accepts `http://host:port`, `https://host`, `https://[::1]:8443`; a missing scheme means http
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (scheme, rest) = match s.split_once("://") {
      Some((scheme, rest)) => (scheme.parse::<ProxyScheme>()?, rest),
      None => (ProxyScheme::Http, s),
    };
    let rest = rest.trim_end_matches('/');
    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
      let (host, after) = bracketed
        .split_once(']')
        .ok_or(EndpointParseError::MissingHost)?;
      let port = match after.strip_prefix(':') {
        Some(port) => Some(port),
        None if after.is_empty() => None,
        None => return Err(EndpointParseError::InvalidPort(after.to_string())),
      };
      (host, port)
    } else {
      match rest.rsplit_once(':') {
        // IPv6 literals must be bracketed
        Some((host, _)) if host.contains(':') => {
          return Err(EndpointParseError::UnbracketedIpv6(rest.to_string()))
        }
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
      }
    };
    if host.is_empty() {
      return Err(EndpointParseError::MissingHost);
    }
    let port = match port {
      Some(port) => port
        .parse::<u16>()
        .map_err(|_| EndpointParseError::InvalidPort(port.to_string()))?,
      None => scheme.default_port(),
    };
    Ok(Self {
      scheme,
      host: host.to_string(),
      port,
    })
  }
}
