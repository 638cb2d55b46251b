// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
#![warn(unused_imports)]

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use proxyconnect::{
  util::validators::{
    parse_host_port, parse_proxy_endpoint, parse_socketaddr, validate_existing_file,
    validate_host_port, validate_proxy_endpoint, validate_socketaddr,
  },
  ConnectorConfig, HttpConnectClient, ProxyEndpoint, TargetDescriptor,
};
use std::path::PathBuf;

mod forward;
mod probe;

/// Settings common to every subcommand that negotiates a tunnel
#[derive(Clone, Debug)]
pub struct ConnectArgs {
  pub proxy: ProxyEndpoint,
  pub target: TargetDescriptor,
  pub san: Option<String>,
  pub authority: Option<PathBuf>,
  pub config: Option<PathBuf>,
}

impl ConnectArgs {
  /// Builds the connector described by these arguments and any configuration file
  pub fn build_client(&self) -> Result<HttpConnectClient> {
    let mut config = match &self.config {
      Some(path) => ConnectorConfig::from_json_file(path)?,
      None => ConnectorConfig::default(),
    };
    if let Some(authority) = &self.authority {
      config.tls.authority = Some(authority.clone());
    }
    HttpConnectClient::for_endpoint(config, &self.proxy, self.san.as_deref())
      .with_context(|| format!("Configuring TLS for proxy {}", self.proxy))
  }
}

fn connect_args() -> Vec<Arg<'static>> {
  vec![
    Arg::new("proxy")
      .help("Proxy to tunnel through, as http://host:port or https://host:port")
      .long("proxy")
      .short('p')
      .validator(validate_proxy_endpoint)
      .takes_value(true)
      .required(true),
    Arg::new("target")
      .help("Destination host:port the proxy should connect to")
      .long("target")
      .short('t')
      .validator(validate_host_port)
      .takes_value(true)
      .required(true),
    Arg::new("user")
      .long("user")
      .short('u')
      .takes_value(true)
      .required(false),
    Arg::new("password")
      .long("password")
      .takes_value(true)
      .required(false),
    Arg::new("san")
      .help("Name to verify the proxy's certificate against; defaults to the proxy host")
      .long("san")
      .short('s')
      .takes_value(true)
      .required(false),
    Arg::new("authority")
      .long("authority")
      .short('a')
      .validator(validate_existing_file)
      .takes_value(true)
      .required(false),
    Arg::new("config")
      .long("config")
      .short('c')
      .validator(validate_existing_file)
      .takes_value(true)
      .required(false),
  ]
}

fn main() {
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  let collector = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .finish();
  tracing::subscriber::set_global_default(collector).expect("Logger init must succeed");
  let app = Command::new(env!("CARGO_BIN_NAME"))
    .version(env!("CARGO_PKG_VERSION"))
    .about(env!("CARGO_PKG_DESCRIPTION"))
    .subcommand(
      Command::new("forward")
        .about("Forward local TCP connections to a target through the proxy")
        .arg(
          Arg::new("bind")
            .long("bind")
            .short('b')
            .validator(validate_socketaddr)
            .default_value("127.0.0.1:8022")
            .takes_value(true),
        )
        .args(connect_args()),
    )
    .subcommand(
      Command::new("probe")
        .about("Negotiate a single tunnel and report whether the proxy accepted it")
        .args(connect_args()),
    )
    .subcommand_required(true)
    .arg_required_else_help(true);
  let matches = app.get_matches();
  let mode = matches.subcommand_name().unwrap_or("<No subcommand?>");
  let handler = main_args_handler(&matches);
  let rt = tokio::runtime::Builder::new_multi_thread()
    .thread_name("tokio-reactor-worker")
    .enable_all()
    .build()
    .expect("Tokio Runtime setup failure");
  match rt.block_on(handler) {
    Err(err) => {
      tracing::error!(mode = mode, err = ?err, "dispatch_command_failure");
      std::process::exit(1);
    }
    Ok(_) => tracing::info!("{} exited successfully", mode),
  }
}

pub fn connect_arg_handling(args: &'_ ArgMatches) -> Result<ConnectArgs> {
  let (host, port) = parse_host_port(args.value_of("target").unwrap())?;
  let target = TargetDescriptor::new(host, port)
    .with_username(args.value_of("user"))
    .with_password(args.value_of("password"));
  Ok(ConnectArgs {
    proxy: parse_proxy_endpoint(args.value_of("proxy").unwrap())?,
    target,
    san: args.value_of("san").map(String::from),
    authority: args.value_of("authority").map(PathBuf::from),
    config: args.value_of("config").map(PathBuf::from),
  })
}

async fn main_args_handler(matches: &'_ ArgMatches) -> Result<()> {
  match matches
    .subcommand()
    .expect("Subcommand is marked as required")
  {
    ("forward", opts) => {
      let connect = connect_arg_handling(opts)?;
      let bind = parse_socketaddr(opts.value_of("bind").unwrap())?;
      tracing::info!(%bind, proxy = %connect.proxy, target = %connect.target, "Forwarding");
      forward::forward_main(forward::ForwardArgs { bind, connect }).await
    }
    ("probe", opts) => {
      let connect = connect_arg_handling(opts)?;
      // The blocking driver runs off the reactor
      tokio::task::spawn_blocking(move || probe::probe_main(connect))
        .await
        .context("Probe task failed")?
    }
    (_, _) => unreachable!(),
  }
}

#[cfg(test)]
mod tests {
  use super::ConnectArgs;
  use proxyconnect::TargetDescriptor;

  #[test]
  fn plain_proxies_need_no_trust_store() {
    let args = ConnectArgs {
      proxy: "http://proxy.internal:3128".parse().unwrap(),
      target: TargetDescriptor::new("example.com", 443),
      san: None,
      authority: None,
      config: None,
    };
    let client = args.build_client().expect("Plain proxy client must build");
    assert!(client.proxy_tls().is_none());
  }

  #[test]
  fn missing_config_file_is_reported() {
    let args = ConnectArgs {
      proxy: "http://proxy.internal:3128".parse().unwrap(),
      target: TargetDescriptor::new("example.com", 443),
      san: None,
      authority: None,
      config: Some("/nonexistent/proxyconnect.json".into()),
    };
    assert!(args.build_client().is_err());
  }
}
