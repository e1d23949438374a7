//! Library crate for courtside-sync, exposing the scoreboard core for the console binary and integration tests.

pub mod clock;
pub mod config;
pub mod console;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
