//! Resilient async IRC client engine.
//!
//! One [`Client`] owns one connection to one server: it parses the RFC 1459
//! line protocol, runs the registration state machine (including nickname
//! collision recovery and SASL PLAIN), tracks joined channels, answers PING
//! and CTCP, serializes outbound writes, and transparently reconnects with
//! exponential backoff. Every received message is delivered to a consumer
//! channel in arrival order; transport transitions are reported on a second
//! channel. Multi-server support is N independent clients.
//!
//! # Example
//!
//! ```no_run
//! use courier_sdk::{Client, Config};
//!
//! # async fn example() {
//! let (client, mut messages, _connection) =
//!     Client::new(Config::new("irc.example", "alice"));
//! client.connect();
//!
//! while let Some(msg) = messages.recv().await {
//!     if msg.command == "001" {
//!         client.join(&["#rust"]).await;
//!     }
//! }
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod irc;
pub mod sasl;

pub use client::{Client, MAX_LINE_LEN};
pub use config::{Config, NickFallback, SaslConfig};
pub use error::Error;
pub use event::ConnectionState;
pub use irc::Message;
