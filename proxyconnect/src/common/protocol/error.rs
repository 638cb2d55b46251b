// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0

/// Flat classification of a [TunnelError], for callers deciding how to react
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  HandshakeFailed,
  WriteFailed,
  ReadFailed,
  ConnectionClosed,
  ReplyTooLong,
  MalformedStatusLine,
  ProxyAuthRequired,
  ProxyAuthFailed,
  ProxyRefused,
  InvalidHostname,
  Cancelled,
}

/// Terminal failure of a single tunnel negotiation attempt
#[derive(thiserror::Error, Debug)]
pub enum TunnelError {
  #[error("TLS handshake with HTTP proxy failed: {0}")]
  HandshakeFailed(#[source] std::io::Error),
  #[error("Failed sending CONNECT request to HTTP proxy: {0}")]
  WriteFailed(#[source] std::io::Error),
  #[error("Failed reading HTTP proxy reply: {0}")]
  ReadFailed(#[source] std::io::Error),
  #[error("HTTP proxy server closed connection unexpectedly.")]
  ConnectionClosed,
  #[error("HTTP proxy reply exceeded {limit} bytes without completing its header block")]
  ReplyTooLong { limit: usize },
  #[error("Bad HTTP proxy reply")]
  MalformedStatusLine,
  #[error("HTTP proxy authentication required")]
  ProxyAuthRequired,
  #[error("HTTP proxy authentication failed")]
  ProxyAuthFailed,
  #[error("{}", refusal_message(.code, .reason))]
  ProxyRefused { code: i32, reason: String },
  #[error("Destination hostname {hostname:?} cannot be converted to ASCII")]
  InvalidHostname { hostname: String },
  #[error("HTTP proxy negotiation was cancelled")]
  Cancelled,
}

fn refusal_message(code: &i32, reason: &str) -> String {
  if reason.is_empty() {
    String::from("Connection failed due to broken HTTP reply")
  } else {
    format!("HTTP proxy connection failed: {} {}", code, reason)
  }
}

impl TunnelError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      TunnelError::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
      TunnelError::WriteFailed(_) => ErrorKind::WriteFailed,
      TunnelError::ReadFailed(_) => ErrorKind::ReadFailed,
      TunnelError::ConnectionClosed => ErrorKind::ConnectionClosed,
      TunnelError::ReplyTooLong { .. } => ErrorKind::ReplyTooLong,
      TunnelError::MalformedStatusLine => ErrorKind::MalformedStatusLine,
      TunnelError::ProxyAuthRequired => ErrorKind::ProxyAuthRequired,
      TunnelError::ProxyAuthFailed => ErrorKind::ProxyAuthFailed,
      TunnelError::ProxyRefused { .. } => ErrorKind::ProxyRefused,
      TunnelError::InvalidHostname { .. } => ErrorKind::InvalidHostname,
      TunnelError::Cancelled => ErrorKind::Cancelled,
    }
  }

  /// True when retrying with credentials may succeed where this attempt did not
  pub fn requires_credentials(&self) -> bool {
    matches!(self, TunnelError::ProxyAuthRequired)
  }

  /// True for failures reported by the proxy itself, as opposed to transport or local failures
  pub fn is_proxy_reply(&self) -> bool {
    matches!(
      self.kind(),
      ErrorKind::MalformedStatusLine
        | ErrorKind::ProxyAuthRequired
        | ErrorKind::ProxyAuthFailed
        | ErrorKind::ProxyRefused
    )
  }
}
