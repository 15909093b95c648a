//! bubu-do: personal task tracker with AI subtask breakdown.
//!
//! The `bubu-do` binary serves the REST API in [`api`]; `bubu-ctl` is a
//! command-line client that keeps signed-out tasks in a local file
//! ([`local`]) and merges them into the account on login ([`sync`]).

pub mod api;
pub mod auth;
pub mod breakdown;
pub mod config;
pub mod dates;
pub mod error;
pub mod llm;
pub mod local;
pub mod logger;
pub mod model;
pub mod state;
pub mod store;
pub mod sync;
