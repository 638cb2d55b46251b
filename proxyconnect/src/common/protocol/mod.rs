// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license OR Apache 2.0
//! The CONNECT exchange, independent of how bytes reach the proxy
//!
//! Both connectors run the same sequence: [build_request], write it in full, feed the reply
//! through a [ReplyAccumulator] until the header terminator, then [validate_reply].

pub mod error;
pub mod reply;
pub mod request;

pub use error::{ErrorKind, TunnelError};
pub use reply::{validate_reply, ReplyAccumulator, DEFAULT_MAX_REPLY_LENGTH, HTTP_END_MARKER};
pub use request::{build_request, ConnectRequest, DEFAULT_USER_AGENT};
