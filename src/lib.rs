//! Font Manager library.
//!
//! Custom fonts, named typography presets and theme-bound auto-switching for
//! a host chat UI. The host is reached only through the traits in [`host`];
//! [`headless`] provides an in-memory host for the CLI and tests.

pub mod commands;
pub mod config;
pub mod css;
pub mod dialog_manager;
pub mod error;
pub mod fonts;
pub mod headless;
pub mod host;
pub mod manager;
pub mod overrides;
pub mod persist;
pub mod session;
pub mod theme;
pub mod validation;
pub mod watcher;

#[cfg(test)]
mod integration_tests;
