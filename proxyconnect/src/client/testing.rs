// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! Scripted in-memory transports shared by the driver tests
use std::{
  collections::VecDeque,
  io::{Read, Write},
  pin::Pin,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
  },
  task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Default, Debug)]
struct ProbeState {
  written: Mutex<Vec<u8>>,
  writes: AtomicUsize,
  reads: AtomicUsize,
  released: AtomicBool,
}

/// Observes a [ScriptedTransport] after it has been moved into a driver
#[derive(Default, Debug, Clone)]
pub(crate) struct TransportProbe(Arc<ProbeState>);

impl TransportProbe {
  pub fn written(&self) -> Vec<u8> {
    self.0.written.lock().unwrap().clone()
  }

  /// Number of I/O calls that reached the transport, in either direction
  pub fn io_calls(&self) -> usize {
    self.0.writes.load(Ordering::SeqCst) + self.0.reads.load(Ordering::SeqCst)
  }

  pub fn released(&self) -> bool {
    self.0.released.load(Ordering::SeqCst)
  }
}

/// Replays `reply` to the reader, records everything written, and reports when dropped
///
/// Writes accept at most `write_chunk` bytes per call. Once the reply runs out, reads see EOF,
/// or stay pending forever when built with [ScriptedTransport::hang_after_reply].
pub(crate) struct ScriptedTransport {
  probe: TransportProbe,
  reply: VecDeque<u8>,
  write_chunk: usize,
  hang_after_reply: bool,
}

impl ScriptedTransport {
  pub fn new(probe: &TransportProbe, reply: &[u8]) -> Self {
    Self {
      probe: probe.clone(),
      reply: reply.iter().copied().collect(),
      write_chunk: usize::MAX,
      hang_after_reply: false,
    }
  }

  pub fn write_chunk(mut self, write_chunk: usize) -> Self {
    self.write_chunk = write_chunk.max(1);
    self
  }

  pub fn hang_after_reply(mut self) -> Self {
    self.hang_after_reply = true;
    self
  }

  fn accept_write(&mut self, buf: &[u8]) -> usize {
    let accepted = buf.len().min(self.write_chunk);
    self.probe.0.writes.fetch_add(1, Ordering::SeqCst);
    self
      .probe
      .0
      .written
      .lock()
      .unwrap()
      .extend_from_slice(&buf[..accepted]);
    accepted
  }

  fn fill(&mut self, buf: &mut [u8]) -> usize {
    self.probe.0.reads.fetch_add(1, Ordering::SeqCst);
    let count = buf.len().min(self.reply.len());
    for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..count)) {
      *slot = byte;
    }
    count
  }
}

impl Drop for ScriptedTransport {
  fn drop(&mut self) {
    self.probe.0.released.store(true, Ordering::SeqCst);
  }
}

impl Read for ScriptedTransport {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    Ok(self.fill(buf))
  }
}

impl Write for ScriptedTransport {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    Ok(self.accept_write(buf))
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

impl AsyncRead for ScriptedTransport {
  fn poll_read(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<std::io::Result<()>> {
    let this = self.get_mut();
    if this.reply.is_empty() && this.hang_after_reply {
      return Poll::Pending;
    }
    let count = this.fill(buf.initialize_unfilled());
    buf.advance(count);
    Poll::Ready(Ok(()))
  }
}

impl AsyncWrite for ScriptedTransport {
  fn poll_write(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<std::io::Result<usize>> {
    Poll::Ready(Ok(self.get_mut().accept_write(buf)))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
    Poll::Ready(Ok(()))
  }
}
