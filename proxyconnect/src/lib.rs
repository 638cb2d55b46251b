// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! HTTP CONNECT tunnel negotiation over already-established transports
//!
//! Given a stream connected to an HTTP (or HTTPS) proxy, the drivers in [client] ask the proxy
//! to open a forwarding tunnel to a destination and hand the stream back once the proxy agrees.
//! The same exchange is offered as a blocking call ([client::blocking]) and as a cancellable
//! future ([client::suspending]); both share the request builder and reply validator in
//! [common::protocol].

pub mod client;
pub mod common;
pub mod config;
pub mod ext;
pub mod util;

pub use client::{tls::ProxyTls, HttpConnectClient};
pub use common::{
  protocol::{ErrorKind, TunnelError},
  target::{ProxyEndpoint, ProxyScheme, TargetDescriptor},
};
pub use config::ConnectorConfig;
