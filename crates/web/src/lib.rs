//! HTTP control surface for the session daemon.
//!
//! Thin plumbing over [`wagate_session::SessionManager`]: a small axum app
//! exposing status, send, and disconnect behind a bearer token.

pub mod auth;
pub mod server;

pub use server::{ControlState, build_control_app, serve};
