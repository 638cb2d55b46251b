// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0

use futures::{Future, FutureExt, TryFuture, TryFutureExt};

mod poll_until;
pub use poll_until::{PollUntil, TryPollUntilOrElse};

pub trait FutureExtExt: FutureExt {
  /// Resolves to `None` if `cancellation` completes first; the task is dropped at that moment
  fn poll_until<C>(self, cancellation: C) -> PollUntil<Self, C>
  where
    C: Future,
    Self: Sized,
  {
    PollUntil {
      canceller: Some(Box::pin(cancellation)),
      task: Some(Box::pin(self)),
    }
  }
}

impl<Fut: ?Sized + FutureExt> FutureExtExt for Fut {}

pub trait TryFutureExtExt: TryFutureExt {
  /// Resolves to `make_alternate()` if `cancellation` completes before the task does
  fn try_poll_until_or_else<Success, Error, C, MakeAlternate>(
    self,
    cancellation: C,
    make_alternate: MakeAlternate,
  ) -> TryPollUntilOrElse<Self, C, MakeAlternate>
  where
    Self: TryFuture<Ok = Success, Error = Error> + Sized,
    MakeAlternate: (FnOnce() -> Result<Success, Error>),
    Success: Unpin,
    Error: Unpin,
    C: Future,
  {
    TryPollUntilOrElse {
      inner: self.poll_until(cancellation),
      make_alternate: Some(Box::new(make_alternate)),
    }
  }
}

impl<Fut: ?Sized + TryFutureExt> TryFutureExtExt for Fut {}
