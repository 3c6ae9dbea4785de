#![deny(clippy::unwrap_used)]

pub mod ai;
pub mod config;
pub mod csv;
pub mod drive;
pub mod etsy;
pub mod export;
pub mod folder_context;
pub mod folder_name;
pub mod loader;
pub mod normalizer;
pub mod processor;
pub mod state;
pub mod xlsx;
