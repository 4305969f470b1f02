//! Braid compile driver
//!
//! The library entry point an embedding host calls to compile one Braid
//! source file: [`compile`] validates the supplied configuration, runs
//! the frontend passes from `braid-lang`, and renders target artifacts
//! through the backends keyed by output extension (currently the QVM
//! assembly backend from `braid-qvm`).
//!
//! # Example
//!
//! ```no_run
//! use braid_compile::{compile, ConfigMap};
//!
//! let mut config = ConfigMap::new();
//! config.insert("targets".to_string(), vec!["bell.qvm".to_string()]);
//!
//! let result = compile("bell.bd", &config);
//! for diag in &result.errors {
//!     eprintln!("{diag}");
//! }
//! ```

pub mod config;
pub mod driver;

pub use config::{Config, ConfigError, ConfigMap};
pub use driver::{compile, CompileResult, SOURCE_EXTENSION};

pub use braid_lang::{Diagnostic, Severity, SourcePos};
