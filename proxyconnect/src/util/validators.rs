// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
use anyhow::{Context, Error as AnyErr, Result};
use std::net::SocketAddr;
use std::path::Path;

use crate::common::target::ProxyEndpoint;

pub fn validate_existing_file(v: &str) -> Result<(), String> {
  if !Path::new(&v).exists() {
    Err(String::from("A file must exist at the given path"))
  } else {
    Ok(())
  }
}

pub fn parse_socketaddr(v: &str) -> Result<SocketAddr> {
  use std::net::ToSocketAddrs;
  ToSocketAddrs::to_socket_addrs(v)
    .map_err(AnyErr::from)
    .and_then(|mut items| {
      items
        .next()
        .ok_or_else(|| AnyErr::msg("No addresses were resolved from the given host"))
    })
}

/// Splits `host:port` or `[v6]:port` without resolving the host
///
/// The proxy resolves tunnel destinations, so names are passed through untouched.
pub fn parse_host_port(v: &str) -> Result<(String, u16)> {
  let (host, port) = if let Some(bracketed) = v.strip_prefix('[') {
    let (host, rest) = bracketed
      .split_once(']')
      .ok_or_else(|| AnyErr::msg("Unterminated '[' in host"))?;
    let port = rest
      .strip_prefix(':')
      .ok_or_else(|| AnyErr::msg("Could not match ':' after bracketed host"))?;
    (host, port)
  } else {
    v.rsplit_once(':')
      .ok_or_else(|| AnyErr::msg("Could not match ':' in host:port string"))?
  };
  if host.is_empty() {
    return Err(AnyErr::msg("Host component was empty"));
  }
  let port = port
    .parse::<u16>()
    .with_context(|| format!("Port component {:?} was not a valid u16", port))?;
  Ok((host.to_string(), port))
}

pub fn parse_proxy_endpoint(v: &str) -> Result<ProxyEndpoint> {
  v.parse::<ProxyEndpoint>()
    .with_context(|| format!("Invalid proxy endpoint {:?}", v))
}

pub fn validate_socketaddr(v: &str) -> Result<(), String> {
  parse_socketaddr(v).map(|_| ()).map_err(|e| e.to_string())
}

pub fn validate_host_port(v: &str) -> Result<(), String> {
  parse_host_port(v).map(|_| ()).map_err(|e| e.to_string())
}

pub fn validate_proxy_endpoint(v: &str) -> Result<(), String> {
  parse_proxy_endpoint(v)
    .map(|_| ())
    .map_err(|e| format!("{:#}", e))
}

#[cfg(test)]
mod tests {
  use super::{parse_host_port, parse_socketaddr, validate_existing_file, validate_proxy_endpoint};

  #[test]
  fn host_port_pairs() {
    assert_eq!(
      parse_host_port("example.com:443").unwrap(),
      ("example.com".to_string(), 443)
    );
    assert_eq!(
      parse_host_port("[2001:db8::1]:22").unwrap(),
      ("2001:db8::1".to_string(), 22)
    );
    assert!(parse_host_port("example.com").is_err());
    assert!(parse_host_port(":80").is_err());
    assert!(parse_host_port("example.com:99999").is_err());
    assert!(parse_host_port("[::1]22").is_err());
  }

  #[test]
  fn socket_addresses() {
    assert_eq!(
      parse_socketaddr("127.0.0.1:8080").unwrap(),
      "127.0.0.1:8080".parse().unwrap()
    );
    assert!(parse_socketaddr("127.0.0.1").is_err());
  }

  #[test]
  fn string_validators() {
    assert!(validate_proxy_endpoint("https://proxy:3128").is_ok());
    assert!(validate_proxy_endpoint("gopher://proxy").is_err());
    assert!(validate_existing_file("/definitely/not/here").is_err());
  }
}
