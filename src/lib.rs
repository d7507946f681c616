//! Live listening-port to process correlation, on this machine or on a
//! remote host reached over SSH.
//!
//! The [`engine`] refreshes [`model::Snapshot`]s in the background, the
//! [`view`] filters and sorts them, and [`kill`] signals their owners.

pub mod app;
pub mod cli;
pub mod config;
pub mod correlate;
pub mod engine;
pub mod error;
pub mod event;
pub mod kill;
pub mod local;
pub mod model;
pub mod output;
pub mod parse;
pub mod platform;
pub mod process_dir;
pub mod remote;
pub mod scanner;
pub mod ui;
pub mod view;
