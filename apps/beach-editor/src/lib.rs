//! Host-side core for driving an embedded, headless editor process.
//!
//! The editor runs as a child process speaking MessagePack-RPC over its
//! stdin/stdout. [`client::EditorClient`] owns the process, the RPC transport
//! and a [`grid::Screen`] that replays the editor's `redraw` notifications into
//! an addressable cell matrix for a terminal front end to paint.

pub mod client;
pub mod config;
pub mod error;
pub mod grid;
pub mod process;
pub mod protocol;
pub mod redraw;
pub mod rpc;
pub mod telemetry;
