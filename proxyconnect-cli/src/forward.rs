// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0

use anyhow::{Context as AnyhowContext, Result};
use futures::future::{self, Either};
use proxyconnect::{
  ext::future::FutureExtExt,
  util::{cancellation::CancellationListener, splice_streams},
  HttpConnectClient, ProxyEndpoint, TargetDescriptor,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing_futures::Instrument;

use crate::ConnectArgs;

#[derive(Clone, Debug)]
pub struct ForwardArgs {
  pub bind: SocketAddr,
  pub connect: ConnectArgs,
}

struct ForwardContext {
  client: HttpConnectClient,
  proxy: ProxyEndpoint,
  target: TargetDescriptor,
}

/// Opens a TCP connection to the proxy; `None` if shutdown arrives first
async fn dial_proxy(
  proxy: &ProxyEndpoint,
  shutdown: &CancellationListener,
) -> Result<Option<TcpStream>> {
  let dialed = TcpStream::connect(proxy.authority())
    .poll_until(shutdown.cancelled_owned())
    .await;
  let proxy_stream = match dialed {
    Some(res) => res.with_context(|| format!("Connecting to proxy {}", proxy))?,
    None => return Ok(None),
  };
  proxy_stream.set_nodelay(true)?;
  Ok(Some(proxy_stream))
}

async fn forward_connection(
  context: Arc<ForwardContext>,
  mut local: TcpStream,
  shutdown: CancellationListener,
) -> Result<()> {
  let proxy_stream = match dial_proxy(&context.proxy, &shutdown).await? {
    Some(proxy_stream) => proxy_stream,
    None => {
      tracing::debug!("Proxy dial abandoned by shutdown");
      return Ok(());
    }
  };
  let mut tunnel = context
    .client
    .connect(proxy_stream, &context.target, shutdown.clone())
    .await
    .with_context(|| format!("Negotiating tunnel to {}", context.target))?;
  tracing::debug!(tls = tunnel.is_tls(), "Tunnel established, splicing");

  let splice = Box::pin(splice_streams(&mut local, &mut tunnel));
  match future::select(splice, Box::pin(shutdown.cancelled())).await {
    Either::Left((res, _)) => {
      let (sent, received) = res?;
      tracing::debug!(sent, received, "Connection closed");
    }
    Either::Right(((), _)) => tracing::debug!("Connection aborted by shutdown"),
  }
  Ok(())
}

pub async fn forward_main(config: ForwardArgs) -> Result<()> {
  let context = Arc::new(ForwardContext {
    client: config.connect.build_client()?,
    proxy: config.connect.proxy.clone(),
    target: config.connect.target.clone(),
  });

  let (shutdown, sigint_handler_task) = {
    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    let sigint_handler_task = tokio::task::spawn(async move {
      let _ = tokio::signal::ctrl_c().await;
      shutdown_trigger.cancel();
    });
    (shutdown, sigint_handler_task)
  };

  let listener = TcpListener::bind(config.bind)
    .await
    .with_context(|| format!("Binding local listener on {}", config.bind))?;
  tracing::info!(bind = %config.bind, "Listening for local connections");

  loop {
    let (local, peer) = tokio::select! {
      _ = shutdown.cancelled() => break,
      accepted = listener.accept() => accepted.context("Accepting local connection")?,
    };
    if let Err(e) = local.set_nodelay(true) {
      tracing::debug!(?peer, error = ?e, "Failed to set TCP_NODELAY");
    }
    let context = Arc::clone(&context);
    let cancellation = CancellationListener::from(shutdown.child_token());
    tokio::task::spawn(
      async move {
        if let Err(e) = forward_connection(context, local, cancellation).await {
          tracing::warn!(error = ?e, "Forwarding failed");
        }
      }
      .instrument(tracing::info_span!("forward", %peer)),
    );
  }

  sigint_handler_task.abort();
  tracing::info!("Shutting down...");
  Ok(())
}
