//! # Kestrel - behavior-driven test runner
//!
//! Kestrel organizes tests into nested suites declared with `describe`/`it`,
//! discovers spec files on disk, runs them with `before`/`after` hooks and
//! streams the results to pluggable reporters through an event bus.
//!
//! ## Quick Start
//!
//! Spec files are Rust source files compiled into a test binary. Each one
//! registers its suites with [`spec!`]; only the files kestrel finds under the
//! configured paths (default `specs/`, glob `*.spec.rs`) are run.
//!
//! ```rust,no_run
//! use kestrel::{check, check_eq, eyre};
//!
//! kestrel::spec!(|s| {
//!     s.describe("Vec", |s| {
//!         s.it("starts empty", || {
//!             check!(Vec::<u8>::new().is_empty());
//!             Ok(())
//!         });
//!
//!         s.context("after a push", |s| {
//!             s.it("has one element", || {
//!                 let mut v = Vec::new();
//!                 v.push(1);
//!                 check_eq!(1, v.len());
//!                 Ok(())
//!             });
//!             s.todo("pops it back");
//!         });
//!     });
//! });
//!
//! fn main() -> eyre::Result<std::process::ExitCode> {
//!     kestrel::App::new().run()
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Nested suites**: `describe`/`context` with `before_all`, `after_all`,
//!   `before_each` and `after_each` hooks
//! - **Pending and focused tests**: `xit`, `todo`, `xdescribe`, `fit`, `fdescribe`
//! - **Failure classification**: assertion failures, unexpected faults and hook
//!   failures are reported separately
//! - **Reporters**: `dot`, `spec`, `table` and `silent` built in, third-party ones
//!   installed with [`App::install_reporter`]
//! - **Extensions**: handlers subscribed with [`App::on`] observe every event of
//!   an invocation
//!
//! ## Configuration
//!
//! `kestrel.toml` (or the file named by `KESTREL_CONFIG` / `--config`):
//!
//! ```toml
//! grep = "*.spec.rs"
//! reporter = "spec"
//! paths = ["specs"]
//! ```

mod app;

// Re-export error handling and registration crates for user convenience
pub use eyre;
pub use inventory;
pub use pretty_assertions;

// Re-export main application struct
pub use app::App;

// Re-export core functionality
pub use kestrel_core::{
    assertion, bus, command, config, loader, reporter, runner, suite,
    {check, check_eq, check_ne, check_str_eq},
    {Color, Command, Config, Definitions, Event, EventBus, EventName, ExitStatus, Invocation},
    {Output, Reporter, ReporterFactory, RunResult, Scope, SuiteLoader, SuiteTree},
};

/// Registers the suites of the current spec file.
///
/// The definition runs only when the file is discovered under the configured
/// paths. It receives the [`Scope`] of the root suite.
#[macro_export]
macro_rules! spec {
    ($define:expr $(,)?) => {
        $crate::inventory::submit! {
            $crate::loader::SpecRegistration::new(file!(), $define)
        }
    };
}
