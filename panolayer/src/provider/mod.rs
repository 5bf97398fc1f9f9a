//! Tile fetch boundary.
//!
//! The engine never talks to a network itself; it polls a
//! [`FetchProvider`] through cancellable [`FetchRequest`] handles, one poll
//! per scheduling slot. Real deployments implement these traits over their
//! transport; [`SimProvider`] is the deterministic in-process stand-in used
//! by tests and the demo CLI.

mod sim;
mod types;

pub use sim::{make_payload, SimProvider};
pub use types::{FetchError, FetchPoll, FetchProvider, FetchRequest};
