//! `distort-dispatch`: a coordinator that routes file-distortion requests
//! from clients to registered workers over fixed-size TCP frames.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  0x01 / 0x10 / 0x07   ┌─────────────┐  0x02 / 0x07  ┌──────────┐
//!  │  Client  │──────────────────────▶│ Coordinator │◀──────────────│  Worker  │
//!  └────┬─────┘◀─── worker ip&port ───└──────┬──────┘               └────▲─────┘
//!       │                                    │                           │
//!       │                             ┌──────▼──────┐                    │
//!       │                             │  Registry   │  one slot per      │
//!       │                             │ Text, Media │  category          │
//!       │                             └─────────────┘                    │
//!       │                0x03 username&file&size&md5&factor              │
//!       └────────────────────────────────────────────────────────────────┘
//!
//!  every hop: 256-byte frame ── FrameStream (exact reads / writes) ── TCP
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]        : 256-byte wire frame and checksum
//! - [`payload`]      : typed `&`-separated frame payloads
//! - [`transport`]    : exact-length reads and writes, whole-frame stream
//! - [`registry`]     : shared worker table, one slot per category
//! - [`coordinator`]  : frame dispatch and the connection server
//! - [`client`]       : client session and worker exchange
//! - [`worker`]       : worker registration and request handling
//! - [`command`]      : interactive client commands
//! - [`category`]     : media categories and extension mapping
//! - [`state`]        : client state machine types
//! - [`config`]       : role configuration files and runtime options
//! - [`error`]        : error types

pub mod category;
pub mod client;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod frame;
pub mod payload;
pub mod registry;
pub mod state;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};
