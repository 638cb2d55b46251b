// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{fmt::Write as _, net::IpAddr};

use super::TunnelError;
use crate::common::target::TargetDescriptor;

/// Default `User-Agent` presented to proxies
pub const DEFAULT_USER_AGENT: &str = concat!("proxyconnect/", env!("CARGO_PKG_VERSION"));

/// A serialized CONNECT request, ready to be written to the proxy
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
  bytes: Vec<u8>,
  has_credentials: bool,
}

impl ConnectRequest {
  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// Whether a `Proxy-Authorization` header was emitted
  pub fn has_credentials(&self) -> bool {
    self.has_credentials
  }
}

impl std::fmt::Debug for ConnectRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    // The body may carry credentials; only show its shape
    f.debug_struct("ConnectRequest")
      .field("len", &self.bytes.len())
      .field("has_credentials", &self.has_credentials)
      .finish()
  }
}

/// Produces the `host:port` authority embedded in the request line and `Host` header
fn ascii_authority(target: &TargetDescriptor) -> Result<String, TunnelError> {
  let hostname = target.hostname();
  let invalid = || TunnelError::InvalidHostname {
    hostname: hostname.to_string(),
  };
  let bare = hostname
    .strip_prefix('[')
    .and_then(|h| h.strip_suffix(']'))
    .unwrap_or(hostname);
  match bare.parse::<IpAddr>() {
    Ok(IpAddr::V6(v6)) => Ok(format!("[{}]:{}", v6, target.port())),
    Ok(IpAddr::V4(v4)) => Ok(format!("{}:{}", v4, target.port())),
    Err(_) => {
      let ascii = idna::domain_to_ascii(hostname).map_err(|_| invalid())?;
      if ascii.is_empty() {
        return Err(invalid());
      }
      Ok(format!("{}:{}", ascii, target.port()))
    }
  }
}

/// Builds the CONNECT request for `target`
///
/// The request line always asks for `HTTP/1.0`; proxies are judged by their reply version only.
pub fn build_request(
  target: &TargetDescriptor,
  user_agent: &str,
) -> Result<ConnectRequest, TunnelError> {
  let authority = ascii_authority(target)?;
  let mut request = String::with_capacity(160);
  // Writing into a String cannot fail
  let _ = write!(
    request,
    "CONNECT {authority} HTTP/1.0\r\n\
     Host: {authority}\r\n\
     Proxy-Connection: keep-alive\r\n\
     User-Agent: {user_agent}\r\n",
    authority = authority,
    user_agent = user_agent,
  );

  let has_credentials = match target.credentials() {
    Some((username, password)) => {
      let encoded = STANDARD.encode(format!("{}:{}", username, password));
      let _ = write!(request, "Proxy-Authorization: Basic {}\r\n", encoded);
      true
    }
    None => false,
  };
  request.push_str("\r\n");

  Ok(ConnectRequest {
    bytes: request.into_bytes(),
    has_credentials,
  })
}
