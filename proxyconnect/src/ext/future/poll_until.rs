// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use std::{pin::Pin, task::Poll};

use futures::{future::FusedFuture, Future, FutureExt, TryFuture};

/// Polls `task` until it completes or `canceller` does, checking the canceller first each time
///
/// Once either side finishes, both are released; the task is never polled again.
pub struct PollUntil<F, C> {
  pub(super) task: Option<Pin<Box<F>>>,
  pub(super) canceller: Option<Pin<Box<C>>>,
}

impl<F, C, O> Future for PollUntil<F, C>
where
  F: Future<Output = O>,
  O: Unpin,
  C: Future,
{
  type Output = Option<O>;

  fn poll(
    mut self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Self::Output> {
    let Self { canceller, task } = std::ops::DerefMut::deref_mut(&mut self);
    let (canceller_ref, task_ref) = match (canceller.as_mut(), task.as_mut()) {
      (Some(canceller), Some(task)) => (canceller, task),
      // This allows us to act as a FusedFuture without an additional field
      _ => return Poll::Pending,
    };
    if FutureExt::poll_unpin(canceller_ref, cx).is_ready() {
      *canceller = None;
      *task = None;
      return Poll::Ready(None);
    }
    let res = futures::ready!(task_ref.poll_unpin(cx));
    *canceller = None;
    *task = None;
    Poll::Ready(Some(res))
  }
}

impl<F, C, O> FusedFuture for PollUntil<F, C>
where
  F: Future<Output = O>,
  O: Unpin,
  C: Future,
{
  fn is_terminated(&self) -> bool {
    self.canceller.is_none()
  }
}

pub struct TryPollUntilOrElse<F, C, FE> {
  pub(super) inner: PollUntil<F, C>,
  pub(super) make_alternate: Option<Box<FE>>,
}

impl<F, C, T, E, MakeAlternative> Future for TryPollUntilOrElse<F, C, MakeAlternative>
where
  F: TryFuture<Output = Result<T, E>>,
  MakeAlternative: FnOnce() -> Result<T, E>,
  T: Unpin,
  E: Unpin,
  C: Future,
{
  type Output = Result<T, E>;

  fn poll(
    mut self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Self::Output> {
    let Self {
      make_alternate,
      inner,
    } = std::ops::DerefMut::deref_mut(&mut self);
    if make_alternate.is_none() {
      // This allows us to act as a FusedFuture without an additional field
      return Poll::Pending;
    }

    let res = futures::ready!(inner.poll_unpin(cx));
    Poll::Ready(match res {
      Some(res) => {
        make_alternate.take();
        res
      }
      None => match make_alternate.take() {
        Some(make) => make(),
        None => unreachable!("Alternate presence is checked before polling"),
      },
    })
  }
}

impl<F, C, T, E, MakeAlternative> FusedFuture for TryPollUntilOrElse<F, C, MakeAlternative>
where
  F: TryFuture<Output = Result<T, E>>,
  MakeAlternative: (FnOnce() -> Result<T, E>) + Unpin,
  T: Unpin,
  E: Unpin,
  C: Future,
{
  fn is_terminated(&self) -> bool {
    self.make_alternate.is_none() || self.inner.is_terminated()
  }
}
