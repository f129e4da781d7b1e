//! Backend resolution and state migration for infrastructure working
//! directories.
//!
//! The entry point is [`resolver::Resolver`], which decides which backend
//! governs a working directory and moves state when that decision changes.

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod record;
pub mod resolver;
pub mod settings;
pub mod ui;
pub mod workspace;
