// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! TLS towards the proxy itself, for `https` proxies
//!
//! This secures the hop between client and proxy only; anything spoken inside the tunnel
//! afterwards is the caller's business.
use std::{io::BufReader, path::Path, sync::Arc};

use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};

use crate::config::ProxyTlsOptions;

#[derive(thiserror::Error, Debug)]
pub enum TlsConfigError {
  #[error("Failed reading certificate authority file {path:?}: {error}")]
  Authority {
    path: std::path::PathBuf,
    #[source]
    error: std::io::Error,
  },
  #[error("Failed loading platform trust store: {0}")]
  NativeRoots(#[source] std::io::Error),
  #[error("No trusted certificate authorities were configured for the proxy")]
  NoRootCertificates,
  #[error("{0:?} is not a valid TLS server name")]
  InvalidServerName(String),
  #[error("accept-invalid-certs requires building with the `insecure-debug` feature")]
  InsecureUnavailable,
  #[error("TLS configuration rejected: {0}")]
  Rustls(#[from] rustls::Error),
}

/// What the connector needs to speak TLS to a proxy: a client config and the name to verify
#[derive(Clone)]
pub struct ProxyTls {
  client_config: Arc<ClientConfig>,
  server_name: ServerName,
}

impl ProxyTls {
  /// Verify the proxy against `server_name`, typically the host the proxy was reached at
  pub fn new(client_config: Arc<ClientConfig>, server_name: &str) -> Result<Self, TlsConfigError> {
    let server_name = ServerName::try_from(server_name)
      .map_err(|_| TlsConfigError::InvalidServerName(server_name.to_string()))?;
    Ok(Self {
      client_config,
      server_name,
    })
  }

  pub fn from_options(options: &ProxyTlsOptions, server_name: &str) -> Result<Self, TlsConfigError> {
    Self::new(Arc::new(build_client_config(options)?), server_name)
  }

  pub fn client_config(&self) -> &Arc<ClientConfig> {
    &self.client_config
  }

  pub fn server_name(&self) -> &ServerName {
    &self.server_name
  }
}

impl std::fmt::Debug for ProxyTls {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProxyTls")
      .field("server_name", &self.server_name)
      .finish_non_exhaustive()
  }
}

fn load_authority(path: &Path, roots: &mut RootCertStore) -> Result<(), TlsConfigError> {
  let read_error = |error| TlsConfigError::Authority {
    path: path.to_path_buf(),
    error,
  };
  let file = std::fs::File::open(path).map_err(read_error)?;
  let certs = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(read_error)?;
  let (added, ignored) = roots.add_parsable_certificates(&certs);
  tracing::debug!(?path, added, ignored, "Loaded proxy certificate authorities");
  Ok(())
}

fn load_native_roots(roots: &mut RootCertStore) -> Result<(), TlsConfigError> {
  let certs = rustls_native_certs::load_native_certs().map_err(TlsConfigError::NativeRoots)?;
  let mut ignored = 0usize;
  for cert in certs {
    if roots.add(&Certificate(cert.0)).is_err() {
      ignored += 1;
    }
  }
  tracing::trace!(roots = roots.len(), ignored, "Loaded platform trust store");
  Ok(())
}

/// Builds the rustls client configuration described by `options`
pub fn build_client_config(options: &ProxyTlsOptions) -> Result<ClientConfig, TlsConfigError> {
  if options.accept_invalid_certs {
    return insecure_client_config();
  }
  let mut roots = RootCertStore::empty();
  if options.native_roots {
    load_native_roots(&mut roots)?;
  }
  if let Some(authority) = &options.authority {
    load_authority(authority, &mut roots)?;
  }
  if roots.is_empty() {
    return Err(TlsConfigError::NoRootCertificates);
  }
  Ok(
    ClientConfig::builder()
      .with_safe_defaults()
      .with_root_certificates(roots)
      .with_no_client_auth(),
  )
}

#[cfg(not(feature = "insecure-debug"))]
fn insecure_client_config() -> Result<ClientConfig, TlsConfigError> {
  Err(TlsConfigError::InsecureUnavailable)
}

#[cfg(feature = "insecure-debug")]
fn insecure_client_config() -> Result<ClientConfig, TlsConfigError> {
  tracing::warn!("Proxy certificate validation is disabled");
  let mut config = ClientConfig::builder()
    .with_safe_defaults()
    .with_root_certificates(RootCertStore::empty())
    .with_no_client_auth();
  config
    .dangerous()
    .set_certificate_verifier(Arc::new(insecure::AcceptAnyCertificate));
  Ok(config)
}

#[cfg(feature = "insecure-debug")]
mod insecure {
  use rustls::client::{ServerCertVerified, ServerCertVerifier};
  use rustls::{Certificate, Error, ServerName};
  use std::time::SystemTime;

  pub struct AcceptAnyCertificate;

  impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
      &self,
      _end_entity: &Certificate,
      _intermediates: &[Certificate],
      _server_name: &ServerName,
      _scts: &mut dyn Iterator<Item = &[u8]>,
      _ocsp_response: &[u8],
      _now: SystemTime,
    ) -> Result<ServerCertVerified, Error> {
      Ok(ServerCertVerified::assertion())
    }
  }
}
