//! # longwire
//!
//! A foundation library for building IRC-based network services around a
//! long-lived, self-healing client connection.
//!
//! ## Features
//!
//! - Plain TCP and TLS transports with SNI and optional client certificates
//! - Incremental line framing with overlong-line recovery
//! - Total, zero-copy IRC message parsing
//! - Sans-IO registration state machine with CAP negotiation and SASL PLAIN
//! - A shadow model of the server's channel/user state with prefix tracking
//! - A hookable event surface (`on_connect`, `on_chat`, `on_kick`, ...)
//! - Auto-reconnect with attempt budgets and a stay-dead switch
//! - Rehash-aware TOML configuration binding with fallback sections
//!
//! ## Quick Start
//!
//! ```no_run
//! use longwire::{Client, Config, Context, EventHandler, ThinkStatus};
//!
//! struct Greeter;
//!
//! impl EventHandler for Greeter {
//!     fn on_connect(&mut self, ctx: &mut Context<'_>) {
//!         let _ = ctx.join("#longwire");
//!     }
//!
//!     fn on_chat(&mut self, ctx: &mut Context<'_>, channel: &str, nick: &str, message: &str) {
//!         if message == "!ping" {
//!             let _ = ctx.privmsg(channel, &format!("{nick}: pong"));
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("services.toml").expect("config");
//!     let mut client = Client::new(config.section("ExampleNet"), config.root_section(), Greeter);
//!
//!     loop {
//!         if client.think().await == ThinkStatus::Dead {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(20)).await;
//!     }
//! }
//! ```
//!
//! The session half is sans-IO: tests (and embedders with their own I/O)
//! can drive [`Session::handle_line`] with literal server lines and inspect
//! the queued replies, no socket required.

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod casemap;
pub mod client;
pub mod config;
pub mod ctcp;
pub mod error;
pub mod events;
pub mod framer;
pub mod handshake;
pub mod isupport;
pub mod message;
pub mod reconnect;
pub mod sasl;
pub mod track;
pub mod transport;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::client::{
    Client, ConnectionStatus, LineOutcome, Session, ThinkStatus, HANDSHAKE_BUDGET,
    LINES_PER_THINK,
};
pub use self::config::{Config, SectionHandle, SectionPair};
pub use self::ctcp::Ctcp;
pub use self::error::{
    ConfigError, Error, HandshakeError, ProtocolError, Result, TransportError,
};
pub use self::events::{Context, EventHandler, NullHandler};
pub use self::framer::{Framed, LineFramer, MAX_LINE_LEN};
pub use self::handshake::{
    Action, Handshake, HandshakeConfig, RegistrationState, SaslCredentials,
};
pub use self::isupport::{ChanModes, IsupportEntry, PrefixSpec, ServerParams};
pub use self::message::{Message, Prefix};
pub use self::reconnect::Reconnector;
pub use self::sasl::{encode_plain, SASL_CHUNK_SIZE};
pub use self::track::{Channel, Member, SharedUser, Tracker, User};
pub use self::transport::{ClientIdentity, Connector, Datagram, Listener, Transport};
