//! # Kestrel Core
//!
//! Core functionality for the kestrel behavior-driven test runner.
//!
//! This crate provides the building blocks behind the `kestrel` CLI:
//! - Suite tree and the `describe`/`it` definition DSL
//! - Spec file discovery and loading
//! - Test runner with hooks, filters and failure classification
//! - Event bus connecting the runner to reporters and extensions
//! - Reporter registry and built-in reporters
//! - Configuration management
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | spec files          | ---> | loader (discovery)  | ---> | suite tree          |
//! | kestrel::spec!      |      | walkdir + glob      |      | suites/tests/hooks  |
//! +---------------------+      +---------------------+      +---------------------+
//!                                                                     |
//!                                                                     v
//! +---------------------+      +---------------------+      +---------------------+
//! | reporters           | <--- | event bus           | <--- | runner (execution)  |
//! | dot/spec/table/...  |      | runner.start, ...   |      | + filters           |
//! +---------------------+      +---------------------+      +---------------------+
//!            ^                          ^
//!            |                          |
//! +---------------------+      +---------------------+
//! | reporter factory    | <--- | command             |
//! | name -> factory     |      | config + invocation |
//! +---------------------+      +---------------------+
//! ```
//!
//! Most users should use the main `kestrel` crate rather than importing
//! `kestrel-core` directly.

pub mod assertion;
pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod loader;
pub mod reporter;
pub mod runner;
pub mod suite;

// Re-export crates used by the assertion macros and spec registration
pub use eyre;
pub use inventory;
pub use pretty_assertions;

// Re-export key functionality
pub use bus::{Event, EventBus, EventName};
pub use command::{Command, ExitStatus, Invocation};
pub use config::{Color, Config};
pub use error::{DiscoveryError, Error, Result};
pub use loader::{Definitions, RegisteredSpecs, SpecRegistration, SpecSource, SuiteLoader};
pub use reporter::{
    DotReporter, Output, Reporter, ReporterFactory, SpecReporter, TableReporter,
};
pub use runner::{
    DeclarationFilter, Filter, FocusFilter, RunResult, Runner, SkipFilter,
};
pub use suite::{Failure, FailureKind, Outcome, Scope, Status, SuiteId, SuiteTree, TestId};
