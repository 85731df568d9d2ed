//! Core domain + application logic for the song-lyrics chat bot.
//!
//! This crate is framework-agnostic. Telegram, Spotify, Genius and SQLite
//! live behind ports (traits) implemented in adapter crates.

pub mod clearing;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod providers;
pub mod replies;
pub mod security;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
