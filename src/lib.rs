//! Sign language translation service
//!
//! Accepts uploaded videos and runs each one through three ordered stages
//! (pose detection, gloss generation, Spanish translation) as a background
//! job whose progress callers poll.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
