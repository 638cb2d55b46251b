// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use super::TunnelError;

/// Blank line closing an HTTP header block
pub const HTTP_END_MARKER: &[u8; 4] = b"\r\n\r\n";

/// Default upper bound on the size of a proxy's reply header block
pub const DEFAULT_MAX_REPLY_LENGTH: usize = 64 * 1024;

/// Collects a proxy reply one byte at a time until the header terminator arrives
///
/// Reading a byte at a time means nothing past the terminator is ever consumed from the
/// transport, so the tunnel handed back to the caller starts exactly where the reply ends.
#[derive(Debug, Clone)]
pub struct ReplyAccumulator {
  buffer: Vec<u8>,
  limit: usize,
}

impl ReplyAccumulator {
  pub fn new(limit: usize) -> Self {
    Self {
      buffer: Vec::with_capacity(128),
      limit,
    }
  }

  /// Appends a byte; yields the reply without its terminator once the terminator is seen
  pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, TunnelError> {
    self.buffer.push(byte);
    if self.buffer.ends_with(HTTP_END_MARKER) {
      let mut reply = std::mem::take(&mut self.buffer);
      reply.truncate(reply.len() - HTTP_END_MARKER.len());
      return Ok(Some(reply));
    }
    if self.buffer.len() >= self.limit.saturating_add(HTTP_END_MARKER.len()) {
      return Err(TunnelError::ReplyTooLong { limit: self.limit });
    }
    Ok(None)
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }
}

/// Parses a leading integer the way C's `atoi` does, saturating instead of overflowing
fn parse_leading_int(input: &[u8]) -> i32 {
  let mut position = input
    .iter()
    .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c))
    .count();
  let negative = match input.get(position) {
    Some(b'-') => {
      position += 1;
      true
    }
    Some(b'+') => {
      position += 1;
      false
    }
    _ => false,
  };
  let magnitude = input[position.min(input.len())..]
    .iter()
    .take_while(|b| b.is_ascii_digit())
    .fold(0i64, |acc, digit| {
      acc
        .saturating_mul(10)
        .saturating_add(i64::from(digit - b'0'))
    });
  let value = if negative { -magnitude } else { magnitude };
  value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Classifies a proxy's reply to a CONNECT request
///
/// `buffer` is the header block without its terminating blank line. Only the status line is
/// inspected; `has_credentials` distinguishes a rejected login from a missing one on 407.
pub fn validate_reply(buffer: &[u8], has_credentials: bool) -> Result<(), TunnelError> {
  const VERSION_PREFIX: &[u8] = b"HTTP/1.";
  if !buffer.starts_with(VERSION_PREFIX)
    || !matches!(buffer.get(VERSION_PREFIX.len()), Some(b'0' | b'1'))
  {
    return Err(TunnelError::MalformedStatusLine);
  }

  let after_version = &buffer[VERSION_PREFIX.len() + 1..];
  let spaces = after_version.iter().take_while(|b| **b == b' ').count();
  let status = &after_version[spaces..];
  let code = parse_leading_int(status);

  if (200..300).contains(&code) {
    return Ok(());
  }

  if code == 407 {
    return Err(if has_credentials {
      TunnelError::ProxyAuthFailed
    } else {
      TunnelError::ProxyAuthRequired
    });
  }

  let digits = status.iter().take_while(|b| b.is_ascii_digit()).count();
  let after_code = &status[digits..];
  let spaces = after_code.iter().take_while(|b| **b == b' ').count();
  let reason = &after_code[spaces..];
  let reason = match reason.iter().position(|b| *b == b'\r') {
    Some(end) => &reason[..end],
    None => reason,
  };

  Err(TunnelError::ProxyRefused {
    code,
    reason: String::from_utf8_lossy(reason).into_owned(),
  })
}
