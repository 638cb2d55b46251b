// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! Cancellable CONNECT negotiation over any tokio `AsyncRead + AsyncWrite` transport
use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing_futures::Instrument;

use super::tls::ProxyTls;
use crate::{
  common::{
    protocol::{build_request, validate_reply, ConnectRequest, ReplyAccumulator, TunnelError},
    target::TargetDescriptor,
  },
  config::ConnectorConfig,
  ext::future::TryFutureExtExt,
  util::{
    cancellation::CancellationListener,
    tunnel_stream::{AsyncProxyStream, TunnelStream},
  },
};

enum SessionState<S> {
  Handshaking(tokio_rustls::Connect<S>),
  Writing(AsyncProxyStream<S>),
  Flushing(AsyncProxyStream<S>),
  Reading(AsyncProxyStream<S>),
  Finished,
}

/// One negotiation in flight; owns the transport until it resolves or is dropped
struct ConnectSession<S> {
  state: SessionState<S>,
  request: ConnectRequest,
  written: usize,
  reply: ReplyAccumulator,
}

impl<S> ConnectSession<S>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  fn new(
    transport: S,
    target: &TargetDescriptor,
    proxy_tls: Option<&ProxyTls>,
    config: &ConnectorConfig,
  ) -> Result<Self, TunnelError> {
    let request = build_request(target, &config.user_agent)?;
    let state = match proxy_tls {
      Some(proxy_tls) => SessionState::Handshaking(
        tokio_rustls::TlsConnector::from(proxy_tls.client_config().clone())
          .connect(proxy_tls.server_name().clone(), transport),
      ),
      None => SessionState::Writing(AsyncProxyStream::Plain(transport)),
    };
    Ok(Self {
      state,
      request,
      written: 0,
      reply: ReplyAccumulator::new(config.max_reply_length),
    })
  }
}

impl<S> Future for ConnectSession<S>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  type Output = Result<AsyncProxyStream<S>, TunnelError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    loop {
      match std::mem::replace(&mut this.state, SessionState::Finished) {
        SessionState::Handshaking(mut connect) => match Pin::new(&mut connect).poll(cx) {
          Poll::Pending => {
            this.state = SessionState::Handshaking(connect);
            return Poll::Pending;
          }
          Poll::Ready(Ok(tls)) => {
            tracing::debug!("TLS session with proxy established");
            this.state = SessionState::Writing(AsyncProxyStream::Tls(Box::new(tls)));
          }
          Poll::Ready(Err(e)) => return Poll::Ready(Err(TunnelError::HandshakeFailed(e))),
        },
        SessionState::Writing(mut stream) => {
          let remaining = &this.request.as_bytes()[this.written..];
          if remaining.is_empty() {
            tracing::trace!(bytes = this.written, "CONNECT request sent");
            this.state = SessionState::Flushing(stream);
            continue;
          }
          match Pin::new(&mut stream).poll_write(cx, remaining) {
            Poll::Pending => {
              this.state = SessionState::Writing(stream);
              return Poll::Pending;
            }
            Poll::Ready(Ok(0)) => {
              return Poll::Ready(Err(TunnelError::WriteFailed(
                std::io::ErrorKind::WriteZero.into(),
              )))
            }
            Poll::Ready(Ok(n)) => {
              this.written += n;
              this.state = SessionState::Writing(stream);
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Err(TunnelError::WriteFailed(e))),
          }
        }
        SessionState::Flushing(mut stream) => match Pin::new(&mut stream).poll_flush(cx) {
          Poll::Pending => {
            this.state = SessionState::Flushing(stream);
            return Poll::Pending;
          }
          Poll::Ready(Ok(())) => this.state = SessionState::Reading(stream),
          Poll::Ready(Err(e)) => return Poll::Ready(Err(TunnelError::WriteFailed(e))),
        },
        SessionState::Reading(mut stream) => {
          // One byte at a time, so no tunnel data is consumed past the header terminator
          let mut byte = [0u8; 1];
          let mut buf = ReadBuf::new(&mut byte);
          match Pin::new(&mut stream).poll_read(cx, &mut buf) {
            Poll::Pending => {
              this.state = SessionState::Reading(stream);
              return Poll::Pending;
            }
            Poll::Ready(Ok(())) => {
              if buf.filled().is_empty() {
                tracing::debug!(received = this.reply.len(), "Proxy closed before replying");
                return Poll::Ready(Err(TunnelError::ConnectionClosed));
              }
              match this.reply.push(byte[0]) {
                Ok(None) => this.state = SessionState::Reading(stream),
                Ok(Some(reply)) => {
                  tracing::trace!(bytes = reply.len(), "Received proxy reply");
                  return Poll::Ready(
                    validate_reply(&reply, this.request.has_credentials()).map(|()| stream),
                  );
                }
                Err(e) => return Poll::Ready(Err(e)),
              }
            }
            Poll::Ready(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {
              this.state = SessionState::Reading(stream);
            }
            // TLS sessions torn down without close_notify surface as UnexpectedEof
            Poll::Ready(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
              tracing::debug!(received = this.reply.len(), "Proxy dropped session before replying");
              return Poll::Ready(Err(TunnelError::ConnectionClosed));
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Err(TunnelError::ReadFailed(e))),
          }
        }
        // Polled after completion
        SessionState::Finished => return Poll::Pending,
      }
    }
  }
}

/// Negotiates a tunnel to `target` through the proxy at the other end of `transport`
///
/// Nothing happens until the returned future is polled. If `cancellation` fires before the
/// negotiation completes, the future resolves to [TunnelError::Cancelled] and the transport is
/// dropped at once, without any further reads or writes. Dropping the future has the same
/// effect.
pub fn connect_tunnel<S>(
  transport: S,
  target: &TargetDescriptor,
  proxy_tls: Option<&ProxyTls>,
  config: &ConnectorConfig,
  cancellation: CancellationListener,
) -> impl Future<Output = Result<AsyncProxyStream<S>, TunnelError>> + Send
where
  S: TunnelStream,
{
  let span = tracing::debug_span!("http_connect", %target, tls = proxy_tls.is_some(), mode = "suspending");
  let session = ConnectSession::new(transport, target, proxy_tls, config);
  async move {
    let session = session?;
    let res = session
      .try_poll_until_or_else(cancellation.cancelled_owned(), || {
        Err(TunnelError::Cancelled)
      })
      .await;
    match &res {
      Ok(_) => tracing::debug!("Tunnel established"),
      Err(TunnelError::Cancelled) => tracing::debug!("Negotiation cancelled"),
      Err(e) => tracing::debug!(error = %e, "Proxy refused tunnel"),
    }
    res
  }
  .instrument(span)
}
