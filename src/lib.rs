//! Caprelay - packet-capture tunneling relay, server side
//!
//! Clients tunnel complete IP packets inside the payload of a pseudo-TCP
//! carrier connection. This crate decapsulates them, source-NATs them onto
//! the upstream link and re-encapsulates the return traffic.

pub mod capture;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod telemetry;

pub use error::{Error, Result};
