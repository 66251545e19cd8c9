//! Systrack Bot Library Crate
//!
//! The HTTP face of the conversational engine: configuration, Postgres
//! repositories, handlers and routing. The `bot` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
