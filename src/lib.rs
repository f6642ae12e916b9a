//! Playlist migration library - shared modules for all binaries.

pub mod app;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod scoring;
pub mod sync;
