//! tether - Persistent duplex execution channel for Corral apps
//!
//! Each remote app exposes an execution endpoint speaking a small JSON frame
//! protocol over a WebSocket. A `Tether` holds exactly one such connection
//! and multiplexes any number of concurrently outstanding requests over it,
//! correlated by request id.
//!
//! ## Architecture
//!
//! Reactor pattern to avoid lock contention:
//! - Socket owned by a dedicated reactor task
//! - Requests flow through an mpsc channel
//! - Responses routed via oneshot channels keyed by request id
//!
//! Responses may arrive in any order; a caller blocked on one ticket is
//! unaffected by the others. There is no retry, reconnect, or heartbeat
//! here: a tether that fails stays failed, and the registry layer decides
//! what that means for callers.
//!
//! ## Usage
//!
//! ```ignore
//! let tether = Tether::connect("ws://app-host/app", "app-host", options).await?;
//! let ticket = tether.submit(json!({"prompt": "a red fox"}), "super-user").await?;
//! let result = tether.response(ticket).await?;
//! ```

pub mod frame;

mod client;

pub use client::{Tether, TetherError, TetherOptions, Ticket};
pub use frame::{FrameError, RequestFrame, ResponseFrame};
