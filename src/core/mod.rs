//! Core translation engine module

pub mod adapter;
pub mod capability;
pub mod classifier;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
