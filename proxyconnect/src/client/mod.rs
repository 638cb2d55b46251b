// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use std::io::{Read, Write};

use futures::Future;

use crate::{
  common::{
    protocol::TunnelError,
    target::{ProxyEndpoint, TargetDescriptor},
  },
  config::ConnectorConfig,
  util::{
    cancellation::CancellationListener,
    tunnel_stream::{AsyncProxyStream, ProxyStream, TunnelStream},
  },
};

pub mod blocking;
pub mod suspending;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

use tls::{ProxyTls, TlsConfigError};

/// Connector for a single proxy, usable from both blocking and async callers
///
/// Holds the settings shared across negotiations; each call to [HttpConnectClient::connect] or
/// [HttpConnectClient::connect_blocking] takes a fresh transport already connected to the proxy.
#[derive(Debug, Clone)]
pub struct HttpConnectClient {
  config: ConnectorConfig,
  proxy_tls: Option<ProxyTls>,
}

impl HttpConnectClient {
  /// A connector speaking plaintext HTTP to the proxy
  pub fn new(config: ConnectorConfig) -> Self {
    Self {
      config,
      proxy_tls: None,
    }
  }

  pub fn with_proxy_tls(mut self, proxy_tls: ProxyTls) -> Self {
    self.proxy_tls = Some(proxy_tls);
    self
  }

  /// A connector for `endpoint`, negotiating TLS with it when its scheme calls for it
  ///
  /// The proxy's certificate is verified against `server_name` when given, otherwise against the
  /// endpoint's host, using the trust settings in `config.tls`.
  pub fn for_endpoint(
    config: ConnectorConfig,
    endpoint: &ProxyEndpoint,
    server_name: Option<&str>,
  ) -> Result<Self, TlsConfigError> {
    let proxy_tls = if endpoint.scheme.uses_tls() {
      let server_name = server_name.unwrap_or(&endpoint.host);
      Some(ProxyTls::from_options(&config.tls, server_name)?)
    } else {
      None
    };
    Ok(Self { config, proxy_tls })
  }

  pub fn config(&self) -> &ConnectorConfig {
    &self.config
  }

  pub fn proxy_tls(&self) -> Option<&ProxyTls> {
    self.proxy_tls.as_ref()
  }

  pub fn connect_blocking<S: Read + Write>(
    &self,
    transport: S,
    target: &TargetDescriptor,
  ) -> Result<ProxyStream<S>, TunnelError> {
    blocking::connect_tunnel(transport, target, self.proxy_tls.as_ref(), &self.config)
  }

  pub fn connect<S>(
    &self,
    transport: S,
    target: &TargetDescriptor,
    cancellation: CancellationListener,
  ) -> impl Future<Output = Result<AsyncProxyStream<S>, TunnelError>> + Send
  where
    S: TunnelStream,
  {
    suspending::connect_tunnel(
      transport,
      target,
      self.proxy_tls.as_ref(),
      &self.config,
      cancellation,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::{
    testing::{ScriptedTransport, TransportProbe},
    tls::{
      tests::{TestAuthority, PROXY_NAME},
      TlsConfigError,
    },
    HttpConnectClient,
  };
  use crate::{
    common::target::{ProxyEndpoint, TargetDescriptor},
    config::{ConnectorConfig, ProxyTlsOptions},
    util::cancellation::CancellationListener,
  };

  #[tokio::test]
  async fn drivers_agree_on_every_reply() {
    let replies: &[&[u8]] = &[
      b"HTTP/1.0 200 Connection established\r\n\r\n",
      b"HTTP/1.1 204 No Content\r\nVia: proxy\r\n\r\n",
      b"HTTP/1.1 299\r\n\r\n",
      b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n",
      b"HTTP/1.1 403 Forbidden\r\n\r\n",
      b"HTTP/1.1 502 \r\n\r\n",
      b"HTTP/1.1 abc\r\n\r\n",
      b"HTTP/2 200 OK\r\n\r\n",
      b"SSH-2.0-OpenSSH\r\n\r\n",
      b"HTTP/1.1 200 OK\r\n",
    ];
    let client = HttpConnectClient::new(ConnectorConfig::default());
    for target in [
      TargetDescriptor::new("example.com", 443),
      TargetDescriptor::new("example.com", 443).with_credentials("alice", "hunter2"),
    ] {
      for reply in replies {
        let blocking_probe = TransportProbe::default();
        let blocking = client
          .connect_blocking(ScriptedTransport::new(&blocking_probe, reply), &target)
          .map(|_| ())
          .map_err(|e| (e.kind(), e.to_string()));

        let suspending_probe = TransportProbe::default();
        let suspending = client
          .connect(
            ScriptedTransport::new(&suspending_probe, reply),
            &target,
            CancellationListener::never(),
          )
          .await
          .map(|_| ())
          .map_err(|e| (e.kind(), e.to_string()));

        assert_eq!(
          blocking,
          suspending,
          "Drivers disagree on reply {:?}",
          String::from_utf8_lossy(reply)
        );
        assert_eq!(blocking_probe.written(), suspending_probe.written());
      }
    }
  }

  #[test]
  fn plain_endpoints_skip_tls() {
    let endpoint: ProxyEndpoint = "http://proxy.internal:3128".parse().unwrap();
    let client = HttpConnectClient::for_endpoint(ConnectorConfig::default(), &endpoint, None)
      .expect("Plain endpoints need no trust store");
    assert!(client.proxy_tls().is_none());
  }

  #[test]
  fn tls_endpoints_require_trust() {
    let endpoint: ProxyEndpoint = "https://proxy.internal".parse().unwrap();
    let config = ConnectorConfig {
      tls: ProxyTlsOptions {
        native_roots: false,
        ..ProxyTlsOptions::default()
      },
      ..ConnectorConfig::default()
    };
    assert!(HttpConnectClient::for_endpoint(config, &endpoint, None).is_err());
  }

  #[test]
  fn server_name_override_is_verified_instead_of_host() {
    let authority = TestAuthority::generate();
    let path = std::env::temp_dir().join(format!(
      "proxyconnect-override-{}.pem",
      std::process::id()
    ));
    std::fs::write(&path, authority.cert_pem.as_bytes()).expect("Writing authority must succeed");
    let config = ConnectorConfig {
      tls: ProxyTlsOptions {
        authority: Some(path.clone()),
        native_roots: false,
        accept_invalid_certs: false,
      },
      ..ConnectorConfig::default()
    };
    let endpoint: ProxyEndpoint = "https://192.0.2.10:8443".parse().unwrap();

    let overridden = HttpConnectClient::for_endpoint(config.clone(), &endpoint, Some(PROXY_NAME));
    let rejected = HttpConnectClient::for_endpoint(config, &endpoint, Some("not a hostname"));
    let _ = std::fs::remove_file(&path);

    let overridden = overridden.expect("Override name must be accepted");
    assert_eq!(
      overridden.proxy_tls().map(|tls| tls.server_name().clone()),
      Some(rustls::ServerName::try_from(PROXY_NAME).unwrap())
    );
    assert!(matches!(
      rejected,
      Err(TlsConfigError::InvalidServerName(name)) if name == "not a hostname"
    ));
  }
}
