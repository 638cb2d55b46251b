// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use std::io::{Error as IOError, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A duplex async stream that can carry a proxy negotiation, and later the tunnel itself
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + ?Sized> TunnelStream for T {}

/// The stream handed back by the blocking connector
///
/// `Tls` wraps the original transport when the proxy was reached over TLS; either way the
/// wrapped transport is the one the negotiation ran over.
pub enum ProxyStream<S: Read + Write> {
  Plain(S),
  Tls(Box<rustls::StreamOwned<rustls::ClientConnection, S>>),
}

impl<S: Read + Write> ProxyStream<S> {
  pub fn is_tls(&self) -> bool {
    matches!(self, ProxyStream::Tls(_))
  }

  /// The underlying transport, beneath any TLS session
  pub fn get_ref(&self) -> &S {
    match self {
      ProxyStream::Plain(s) => s,
      ProxyStream::Tls(s) => &s.sock,
    }
  }

  pub fn get_mut(&mut self) -> &mut S {
    match self {
      ProxyStream::Plain(s) => s,
      ProxyStream::Tls(s) => &mut s.sock,
    }
  }
}

impl<S: Read + Write> std::fmt::Debug for ProxyStream<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ProxyStream::Plain(_) => f.write_str("ProxyStream::Plain"),
      ProxyStream::Tls(_) => f.write_str("ProxyStream::Tls"),
    }
  }
}

impl<S: Read + Write> Read for ProxyStream<S> {
  fn read(&mut self, buf: &mut [u8]) -> Result<usize, IOError> {
    match self {
      ProxyStream::Plain(s) => s.read(buf),
      ProxyStream::Tls(s) => s.read(buf),
    }
  }
}

impl<S: Read + Write> Write for ProxyStream<S> {
  fn write(&mut self, buf: &[u8]) -> Result<usize, IOError> {
    match self {
      ProxyStream::Plain(s) => s.write(buf),
      ProxyStream::Tls(s) => s.write(buf),
    }
  }

  fn flush(&mut self) -> Result<(), IOError> {
    match self {
      ProxyStream::Plain(s) => s.flush(),
      ProxyStream::Tls(s) => s.flush(),
    }
  }
}

/// The stream handed back by the suspending connector
pub enum AsyncProxyStream<S> {
  Plain(S),
  Tls(Box<tokio_rustls::client::TlsStream<S>>),
}

impl<S> AsyncProxyStream<S> {
  pub fn is_tls(&self) -> bool {
    matches!(self, AsyncProxyStream::Tls(_))
  }

  /// The underlying transport, beneath any TLS session
  pub fn get_ref(&self) -> &S {
    match self {
      AsyncProxyStream::Plain(s) => s,
      AsyncProxyStream::Tls(s) => s.get_ref().0,
    }
  }

  pub fn get_mut(&mut self) -> &mut S {
    match self {
      AsyncProxyStream::Plain(s) => s,
      AsyncProxyStream::Tls(s) => s.get_mut().0,
    }
  }
}

impl<S> std::fmt::Debug for AsyncProxyStream<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AsyncProxyStream::Plain(_) => f.write_str("AsyncProxyStream::Plain"),
      AsyncProxyStream::Tls(_) => f.write_str("AsyncProxyStream::Tls"),
    }
  }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for AsyncProxyStream<S> {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<Result<(), IOError>> {
    match self.get_mut() {
      AsyncProxyStream::Plain(ref mut s) => AsyncRead::poll_read(Pin::new(s), cx, buf),
      AsyncProxyStream::Tls(ref mut s) => AsyncRead::poll_read(Pin::new(&mut **s), cx, buf),
    }
  }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for AsyncProxyStream<S> {
  fn poll_write(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<Result<usize, IOError>> {
    match self.get_mut() {
      AsyncProxyStream::Plain(ref mut s) => AsyncWrite::poll_write(Pin::new(s), cx, buf),
      AsyncProxyStream::Tls(ref mut s) => AsyncWrite::poll_write(Pin::new(&mut **s), cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), IOError>> {
    match self.get_mut() {
      AsyncProxyStream::Plain(ref mut s) => AsyncWrite::poll_flush(Pin::new(s), cx),
      AsyncProxyStream::Tls(ref mut s) => AsyncWrite::poll_flush(Pin::new(&mut **s), cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), IOError>> {
    match self.get_mut() {
      AsyncProxyStream::Plain(ref mut s) => AsyncWrite::poll_shutdown(Pin::new(s), cx),
      AsyncProxyStream::Tls(ref mut s) => AsyncWrite::poll_shutdown(Pin::new(&mut **s), cx),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{AsyncProxyStream, ProxyStream, TunnelStream};

  /// Asserts that AsyncProxyStream complies with TunnelStream
  fn _assert_traits() {
    let _x: &dyn TunnelStream = &AsyncProxyStream::Plain(tokio::io::duplex(64).0);
    unreachable!("Compile-time static assertion function should never be called");
  }

  #[tokio::test]
  async fn plain_async_stream_passes_through() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let (near, mut far) = tokio::io::duplex(64);
    let mut stream = AsyncProxyStream::Plain(near);
    assert!(!stream.is_tls());
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    far.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
    far.write_all(b"pong").await.unwrap();
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
  }

  #[test]
  fn plain_blocking_stream_passes_through() {
    use std::io::{Read, Write};
    let mut stream = ProxyStream::Plain(std::io::Cursor::new(Vec::new()));
    stream.write_all(b"ping").unwrap();
    stream.get_mut().set_position(0);
    let mut buf = String::new();
    stream.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "ping");
    assert_eq!(format!("{:?}", stream), "ProxyStream::Plain");
  }
}
