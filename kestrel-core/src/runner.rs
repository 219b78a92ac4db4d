/// kestrel's test runner
use regex::Regex;
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};
use tracing::*;

use crate::{
    assertion,
    bus::{Event, EventBus},
    config::Config,
    suite::{Failure, FailureKind, Hook, Node, Outcome, Status, SuiteId, SuiteTree, TestId},
    Error,
};

/// A fault raised by a hook or a test body.
#[derive(Debug)]
pub enum Fault {
    /// The callable returned an error.
    Returned(eyre::Report),
    /// The callable panicked.
    Panicked(String),
}

impl Fault {
    /// Whether the fault comes from an assertion: one of the `check*` macros or any
    /// panic, the way the libtest harness treats `assert!` and friends.
    pub fn is_assertion(&self) -> bool {
        match self {
            Fault::Returned(report) => assertion::is_assertion(report),
            Fault::Panicked(_) => true,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Returned(report) => write!(f, "{report:#}"),
            Fault::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Invokes `f`, converting both returned errors and panics into a [`Fault`].
pub fn invoke(f: &dyn Fn() -> eyre::Result<()>) -> Result<(), Fault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Fault::Returned(e)),
        Err(e) => {
            let message = if let Some(message) = e.downcast_ref::<&str>() {
                message.to_string()
            } else if let Some(message) = e.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(Fault::Panicked(message))
        }
    }
}

/// Runs `hooks` in order, stopping at the first fault.
fn run_setup(hooks: &[Hook]) -> Result<(), Fault> {
    hooks.iter().try_for_each(|hook| invoke(hook.as_ref()))
}

/// Runs every hook even if some fault. The first fault is returned.
fn run_teardown(hooks: &[Hook]) -> Result<(), Fault> {
    let mut first = None;
    for hook in hooks {
        if let Err(fault) = invoke(hook.as_ref()) {
            first.get_or_insert(fault);
        }
    }
    first.map_or(Ok(()), Err)
}

/// A failed or errored test.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub test: TestId,
    pub title: String,
    pub failure: Failure,
}

/// A fault in a suite's `before_all` or `after_all` hooks.
#[derive(Debug, Clone)]
pub struct SuiteErrorRecord {
    pub suite: SuiteId,
    pub title: String,
    pub failure: Failure,
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub pending: usize,
    /// Failures in the order tests finished.
    pub failures: Vec<FailureRecord>,
    pub suite_errors: Vec<SuiteErrorRecord>,
    pub duration: Duration,
}

impl RunResult {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.pending
    }

    pub fn is_failure(&self) -> bool {
        self.failed + self.errored > 0
    }

    fn record(&mut self, test: TestId, title: String, outcome: &Outcome) {
        match outcome.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Errored => self.errored += 1,
            Status::Pending => self.pending += 1,
        }
        if let Some(failure) = &outcome.failure {
            self.failures.push(FailureRecord {
                test,
                title,
                failure: failure.clone(),
            });
        }
    }
}

/// Test case filter trait. A test that is filtered out is reported pending.
pub trait Filter {
    fn filter(&self, tree: &SuiteTree, test: TestId) -> bool;
}

/// Keeps tests whose full title matches the focus pattern.
pub struct FocusFilter {
    pattern: Option<Regex>,
}

impl Filter for FocusFilter {
    fn filter(&self, tree: &SuiteTree, test: TestId) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };

        pattern.is_match(&tree.full_title(test))
    }
}

/// Drops tests whose full title matches the skip pattern.
pub struct SkipFilter {
    pattern: Option<Regex>,
}

impl Filter for SkipFilter {
    fn filter(&self, tree: &SuiteTree, test: TestId) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };

        !pattern.is_match(&tree.full_title(test))
    }
}

/// Drops tests that were declared pending, and unfocused tests when the tree has
/// focused nodes.
pub struct DeclarationFilter;

impl Filter for DeclarationFilter {
    fn filter(&self, tree: &SuiteTree, test: TestId) -> bool {
        if tree.is_declared_pending(test) {
            return false;
        }

        !tree.has_focus() || tree.is_focused(test)
    }
}

fn compile(pattern: Option<&str>) -> crate::Result<Option<Regex>> {
    pattern
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

pub struct Runner {
    bus: EventBus,
    filters: Vec<Box<dyn Filter>>,
}

impl Runner {
    pub fn new(bus: &EventBus) -> Runner {
        Runner {
            bus: bus.clone(),
            filters: vec![Box::new(DeclarationFilter)],
        }
    }

    /// Runner honouring the focus and skip patterns of `cfg`.
    pub fn with_config(bus: &EventBus, cfg: &Config) -> crate::Result<Runner> {
        let mut runner = Runner::new(bus);
        runner.add_filter(FocusFilter {
            pattern: compile(cfg.focus.as_deref())?,
        });
        runner.add_filter(SkipFilter {
            pattern: compile(cfg.skip.as_deref())?,
        });
        Ok(runner)
    }

    pub fn add_filter(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Runs every test of `tree` depth-first in declaration order. Returns an
    /// error only when an event handler fails or the tree was already run.
    pub fn run(&self, tree: &SuiteTree) -> eyre::Result<RunResult> {
        let started = Instant::now();
        let mut result = RunResult::default();

        self.bus.publish(&Event::RunnerStart { tree })?;
        self.visit_suite(tree, tree.root(), None, &mut result)?;
        result.duration = started.elapsed();
        debug!(
            "run finished: {} passed, {} failed, {} errored, {} pending",
            result.passed, result.failed, result.errored, result.pending
        );
        self.bus.publish(&Event::RunnerEnd {
            tree,
            result: &result,
        })?;

        Ok(result)
    }

    /// `broken` carries the setup failure of an enclosing suite. Hooks of broken
    /// suites never run.
    fn visit_suite(
        &self,
        tree: &SuiteTree,
        suite: SuiteId,
        broken: Option<&Failure>,
        result: &mut RunResult,
    ) -> eyre::Result<()> {
        let node = tree.get_suite(suite);
        let setup_failure = match broken {
            Some(_) => None,
            None => run_setup(node.before_all()).err().map(|fault| {
                Failure::new(
                    FailureKind::SuiteSetup,
                    format!("\"{}\": {fault}", node.description),
                )
            }),
        };

        self.bus.publish(&Event::SuiteStart { tree, suite })?;
        if let Some(failure) = &setup_failure {
            error!("before_all of \"{}\" failed: {failure}", node.description);
            self.suite_error(tree, suite, failure.clone(), result)?;
        }

        let broken = broken.or(setup_failure.as_ref());
        for child in node.children() {
            match *child {
                Node::Suite(id) => self.visit_suite(tree, id, broken, result)?,
                Node::Test(id) => self.visit_test(tree, id, broken, result)?,
            }
        }

        // Teardown runs even when this suite's setup faulted.
        if broken.is_none() || setup_failure.is_some() {
            if let Err(fault) = run_teardown(node.after_all()) {
                let failure = Failure::new(
                    FailureKind::Hook,
                    format!("after_all of \"{}\": {fault}", node.description),
                );
                error!("{failure}");
                self.suite_error(tree, suite, failure, result)?;
            }
        }

        self.bus.publish(&Event::SuiteEnd { tree, suite })
    }

    fn suite_error(
        &self,
        tree: &SuiteTree,
        suite: SuiteId,
        failure: Failure,
        result: &mut RunResult,
    ) -> eyre::Result<()> {
        self.bus.publish(&Event::SuiteError {
            tree,
            suite,
            failure: &failure,
        })?;
        result.suite_errors.push(SuiteErrorRecord {
            suite,
            title: tree.get_suite(suite).description.clone(),
            failure,
        });
        Ok(())
    }

    fn visit_test(
        &self,
        tree: &SuiteTree,
        test: TestId,
        broken: Option<&Failure>,
        result: &mut RunResult,
    ) -> eyre::Result<()> {
        self.bus.publish(&Event::TestStart { tree, test })?;

        let outcome = match broken {
            Some(failure) => Outcome::failure(failure.clone()),
            None if !self.filters.iter().all(|f| f.filter(tree, test)) => Outcome::pending(),
            None => self.execute(tree, test),
        };

        let title = tree.full_title(test);
        let node = tree.get_test(test);
        if node.finish(outcome).is_err() {
            eyre::bail!("test \"{title}\" has already finished; a suite tree runs only once");
        }
        let Some(outcome) = node.outcome() else {
            eyre::bail!("test \"{title}\" has no outcome");
        };
        debug!("{title}: {}", outcome.status);
        result.record(test, title, outcome);

        self.bus.publish(&Event::TestEnd {
            tree,
            test,
            status: outcome.status,
            failure: outcome.failure.as_ref(),
        })
    }

    /// before_each (outer to inner), body, after_each (inner to outer). The first
    /// fault decides the outcome; after_each hooks always run.
    fn execute(&self, tree: &SuiteTree, test: TestId) -> Outcome {
        let mut failure = run_setup(&tree.before_each_chain(test))
            .err()
            .map(|fault| Failure::new(FailureKind::Hook, format!("before_each: {fault}")));

        if failure.is_none() {
            if let Some(body) = tree.get_test(test).body() {
                if let Err(fault) = invoke(body.as_ref()) {
                    let kind = if fault.is_assertion() {
                        FailureKind::Assertion
                    } else {
                        FailureKind::Fault
                    };
                    failure = Some(Failure::new(kind, fault.to_string()));
                }
            }
        }

        if let Err(fault) = run_teardown(&tree.after_each_chain(test)) {
            failure.get_or_insert_with(|| {
                Failure::new(FailureKind::Hook, format!("after_each: {fault}"))
            });
        }

        match failure {
            Some(failure) => Outcome::failure(failure),
            None => Outcome::passed(),
        }
    }
}
