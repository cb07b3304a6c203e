//! Opsbot core - intent classification and configuration
//!
//! This crate holds the pure, deterministic heart of the assistant:
//! - **Intent classification** (`intent`) - ordered regex rules that turn
//!   free text into a typed, parameterized action with a confidence score
//! - **Configuration** (`config`) - layered TOML/env/override loading with
//!   fail-fast validation
//!
//! Classification is deterministic and side-effect free: the same rule set
//! and input always produce the same `IntentMatch`. Everything network- or
//! timer-shaped lives in the `opsbot-mcp` and `opsbot-agent` crates.

pub mod config;
pub mod intent;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use intent::{classify, examples_for, suggestions_for, IntentKind, IntentMatch};
