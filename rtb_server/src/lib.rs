//! HTTP and WebSocket front end for Ride the Bus lobbies.
//!
//! The router in [`api`] is a thin layer over
//! [`ride_the_bus::LobbyService`]; every replica running this server can
//! serve any lobby because sessions live in the shared store.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
