// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0

use anyhow::{Context as AnyhowContext, Result};
use std::{net::TcpStream, time::Duration};

use crate::ConnectArgs;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Negotiates a single tunnel with the blocking driver and reports the outcome
pub fn probe_main(config: ConnectArgs) -> Result<()> {
  let client = config.build_client()?;
  let transport = TcpStream::connect(config.proxy.authority())
    .with_context(|| format!("Connecting to proxy {}", config.proxy))?;
  transport.set_read_timeout(Some(PROBE_TIMEOUT))?;
  transport.set_write_timeout(Some(PROBE_TIMEOUT))?;

  match client.connect_blocking(transport, &config.target) {
    Ok(stream) => {
      tracing::info!(
        proxy = %config.proxy,
        target = %config.target,
        tls = stream.is_tls(),
        "Proxy accepted tunnel"
      );
      Ok(())
    }
    Err(e) => {
      tracing::warn!(
        proxy = %config.proxy,
        target = %config.target,
        kind = ?e.kind(),
        requires_credentials = e.requires_credentials(),
        "Proxy refused tunnel"
      );
      Err(e).context("Probe failed")
    }
  }
}
