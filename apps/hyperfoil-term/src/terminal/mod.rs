pub mod app;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod keys;
pub mod prompt;
pub mod render;
