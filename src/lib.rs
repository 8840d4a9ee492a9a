//! Authoritative game server for a real-time multiplayer tank arena
//!
//! Clients speak a newline-delimited text protocol over TCP. Each socket is
//! served by its own task; a single simulation task advances the world at a
//! fixed tick rate and broadcasts the results.

pub mod app;
pub mod config;
pub mod game;
pub mod net;
pub mod util;
