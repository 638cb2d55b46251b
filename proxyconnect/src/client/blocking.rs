// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! Blocking CONNECT negotiation over any `Read + Write` transport
use std::io::{ErrorKind as IOErrorKind, Read, Write};

use super::tls::ProxyTls;
use crate::{
  common::{
    protocol::{build_request, validate_reply, ReplyAccumulator, TunnelError},
    target::TargetDescriptor,
  },
  config::ConnectorConfig,
  util::tunnel_stream::ProxyStream,
};

fn tls_handshake<S: Read + Write>(
  mut transport: S,
  proxy_tls: &ProxyTls,
) -> Result<ProxyStream<S>, TunnelError> {
  let mut connection = rustls::ClientConnection::new(
    proxy_tls.client_config().clone(),
    proxy_tls.server_name().clone(),
  )
  .map_err(|e| TunnelError::HandshakeFailed(std::io::Error::new(IOErrorKind::InvalidInput, e)))?;
  while connection.is_handshaking() {
    connection
      .complete_io(&mut transport)
      .map_err(TunnelError::HandshakeFailed)?;
  }
  tracing::debug!(server_name = ?proxy_tls.server_name(), "TLS session with proxy established");
  Ok(ProxyStream::Tls(Box::new(rustls::StreamOwned::new(
    connection, transport,
  ))))
}

/// Reads single bytes until the header terminator; nothing beyond it is consumed
fn read_reply<S: Read>(stream: &mut S, limit: usize) -> Result<Vec<u8>, TunnelError> {
  let mut accumulator = ReplyAccumulator::new(limit);
  let mut byte = [0u8; 1];
  loop {
    match stream.read(&mut byte) {
      Ok(0) => {
        tracing::debug!(received = accumulator.len(), "Proxy closed before replying");
        return Err(TunnelError::ConnectionClosed);
      }
      Ok(_) => {
        if let Some(reply) = accumulator.push(byte[0])? {
          return Ok(reply);
        }
      }
      Err(e) if e.kind() == IOErrorKind::Interrupted => continue,
      // TLS sessions torn down without close_notify surface as UnexpectedEof
      Err(e) if e.kind() == IOErrorKind::UnexpectedEof => {
        tracing::debug!(received = accumulator.len(), "Proxy dropped session before replying");
        return Err(TunnelError::ConnectionClosed);
      }
      Err(e) => return Err(TunnelError::ReadFailed(e)),
    }
  }
}

/// Negotiates a tunnel to `target` through the proxy at the other end of `transport`
///
/// With `proxy_tls`, the transport is first upgraded to TLS and the proxy's certificate is
/// verified; the returned stream is then the TLS session. On failure the transport is dropped,
/// along with any TLS session opened over it.
pub fn connect_tunnel<S: Read + Write>(
  transport: S,
  target: &TargetDescriptor,
  proxy_tls: Option<&ProxyTls>,
  config: &ConnectorConfig,
) -> Result<ProxyStream<S>, TunnelError> {
  let span = tracing::debug_span!("http_connect", %target, tls = proxy_tls.is_some(), mode = "blocking");
  let _entered = span.enter();

  let request = build_request(target, &config.user_agent)?;

  let mut stream = match proxy_tls {
    Some(proxy_tls) => tls_handshake(transport, proxy_tls)?,
    None => ProxyStream::Plain(transport),
  };

  tracing::trace!(bytes = request.len(), "Sending CONNECT request");
  stream
    .write_all(request.as_bytes())
    .and_then(|()| stream.flush())
    .map_err(TunnelError::WriteFailed)?;

  let reply = read_reply(&mut stream, config.max_reply_length)?;
  tracing::trace!(bytes = reply.len(), "Received proxy reply");

  match validate_reply(&reply, request.has_credentials()) {
    Ok(()) => {
      tracing::debug!("Tunnel established");
      Ok(stream)
    }
    Err(e) => {
      tracing::debug!(error = %e, "Proxy refused tunnel");
      Err(e)
    }
  }
}
