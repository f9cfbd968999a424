//! Core module - Agent state, configuration, errors and events

pub mod config;
pub mod error;
pub mod events;
pub mod state;
