// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use futures::future::Future;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A [CancellationToken] that cannot be triggered by its recipient
///
/// Negotiations receive one of these; only the caller holding the original token may cancel.
/// Child tokens can be produced from it, allowing sub-cancellation.
#[derive(Debug, Clone, Default)]
#[repr(transparent)]
pub struct CancellationListener {
  token: CancellationToken,
}

impl CancellationListener {
  /// A listener whose source has been dropped; it is never cancelled
  pub fn never() -> Self {
    Self::default()
  }

  pub fn child_token(&self) -> CancellationToken {
    self.token.child_token()
  }

  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.token.cancelled()
  }

  /// Like [CancellationListener::cancelled], but owns its listener so it can outlive `self`
  pub fn cancelled_owned(&self) -> impl Future<Output = ()> + Send + 'static {
    let token = self.token.clone();
    async move { token.cancelled().await }
  }
}

impl From<CancellationToken> for CancellationListener {
  fn from(token: CancellationToken) -> Self {
    Self { token }
  }
}

impl From<&CancellationToken> for CancellationListener {
  fn from(token: &CancellationToken) -> Self {
    Self {
      token: token.clone(),
    }
  }
}
