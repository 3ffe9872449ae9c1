//! # hybi13 - Sans-I/O RFC 6455 WebSocket processor
//!
//! `hybi13` implements the WebSocket wire protocol without touching a
//! socket. The caller feeds received bytes into a [`Processor`], takes
//! complete [`Message`]s out, and writes the [`PreparedFrame`]s it gets
//! back for outgoing data.
//!
//! ## Features
//!
//! - **Resumable frame parsing** across arbitrary input splits
//! - **Strict RFC 6455 validation** of headers, masking and UTF-8
//! - **Opening handshake** helpers for both roles
//! - **permessage-deflate** (RFC 7692) behind the `compression` feature
//! - **Injected randomness** for masking keys and handshake nonces
//!
//! ## Quick Start
//!
//! ```rust
//! use hybi13::{Config, Message, Processor, Role};
//!
//! let mut client = Processor::new(Role::Client, Config::new(), || 0x1234_5678_u32);
//! let mut server = Processor::new(Role::Server, Config::new(), || 0_u32);
//!
//! let frame = client.prepare_data_frame(&Message::text("hello")).unwrap();
//! let wire = frame.to_vec();
//!
//! assert_eq!(server.consume(&wire).unwrap(), wire.len());
//! let message = server.get_message().unwrap();
//! assert_eq!(message.as_text(), Some("hello"));
//! ```

pub mod close;
pub mod config;
pub mod error;
pub mod extensions;
pub mod message;
pub mod processor;
pub mod protocol;
pub mod rng;
pub mod role;
pub mod uri;

pub use close::{CloseCode, CloseFrame};
pub use config::{Config, DeflateConfig, Limits, WindowBitsMode};
pub use error::{Error, Result};
pub use message::Message;
pub use processor::{PreparedFrame, Processor, State};
pub use protocol::{OpCode, WS_GUID, compute_accept_key};
pub use rng::{RandomSource, SystemRandom};
pub use role::Role;
pub use uri::WsUri;
