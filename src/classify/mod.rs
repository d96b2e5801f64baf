//! Pattern-driven classification of file paths and account logins.
//!
//! The [`pattern`] module provides the shared matching engine: ordered
//! capture-template rules for paths and an anchored glob for pattern sets.
//! [`ModuleClassifier`] assigns changed files to logical modules and flags
//! generated files; [`BotClassifier`] separates human accounts from bots.
//! Both consume immutable configuration values, keeping every classification
//! a pure function of its inputs.

pub mod bot;
pub mod module;
pub mod pattern;

pub use bot::{BotClassifier, BotConfig, BotSignal, BotVerdict};
pub use module::{ModuleClassifier, ModuleConfig, ROOT_MODULE};
