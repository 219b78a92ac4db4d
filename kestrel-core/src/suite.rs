//! # Suite tree
//!
//! Suites and tests live in a single arena, [`SuiteTree`], and refer to each other
//! through [`SuiteId`] and [`TestId`] indices. A suite owns its children; the
//! `parent` index on a node is only ever used to walk upwards for hook
//! inheritance and titles.
//!
//! Trees are built through a [`Scope`], a builder handle bound to one suite:
//!
//! ```rust,ignore
//! use kestrel_core::{check_eq, suite::SuiteTree};
//!
//! let tree = SuiteTree::suite("arithmetic", |s| {
//!     s.before_each(|| Ok(()));
//!     s.describe("addition", |s| {
//!         s.it("adds two numbers", || {
//!             check_eq!(4, 2 + 2);
//!             Ok(())
//!         });
//!     });
//! });
//! ```
//!
//! Registration order is execution order.

use itertools::Itertools;
use once_cell::unsync::OnceCell;
use std::{fmt, rc::Rc};

/// A setup or teardown callable.
pub type Hook = Rc<dyn Fn() -> eyre::Result<()>>;

/// The assertions of a test.
pub type Body = Rc<dyn Fn() -> eyre::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiteId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(usize);

/// A child of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Suite(SuiteId),
    Test(TestId),
}

/// How a node was declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Declared with `xdescribe`/`xit`. Never executed.
    Pending,
    /// Declared with `fdescribe`/`fit`. When any node is focused, only focused
    /// nodes execute.
    Focused,
}

/// Terminal status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Pending,
    Passed,
    Failed,
    Errored,
}

/// Cause of a failed or errored test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FailureKind {
    /// An assertion did not hold.
    #[strum(serialize = "assertion failure")]
    Assertion,
    /// The body returned an error or panicked for a reason other than an assertion.
    #[strum(serialize = "unexpected fault")]
    Fault,
    /// A `before_each` or `after_each` hook faulted.
    #[strum(serialize = "hook failure")]
    Hook,
    /// A `before_all` hook of an enclosing suite faulted.
    #[strum(serialize = "suite setup failed")]
    SuiteSetup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Failure {
        Failure {
            kind,
            message: message.into(),
        }
    }

    /// Status a test ends up with when it fails this way.
    pub fn status(&self) -> Status {
        match self.kind {
            FailureKind::Assertion => Status::Failed,
            _ => Status::Errored,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub failure: Option<Failure>,
}

impl Outcome {
    pub fn passed() -> Outcome {
        Outcome {
            status: Status::Passed,
            failure: None,
        }
    }

    pub fn pending() -> Outcome {
        Outcome {
            status: Status::Pending,
            failure: None,
        }
    }

    pub fn failure(failure: Failure) -> Outcome {
        Outcome {
            status: failure.status(),
            failure: Some(failure),
        }
    }
}

pub struct Suite {
    pub description: String,
    pub parent: Option<SuiteId>,
    pub mode: Mode,
    children: Vec<Node>,
    before_all: Vec<Hook>,
    after_all: Vec<Hook>,
    before_each: Vec<Hook>,
    after_each: Vec<Hook>,
}

impl Suite {
    fn new(description: String, parent: Option<SuiteId>, mode: Mode) -> Suite {
        Suite {
            description,
            parent,
            mode,
            children: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn before_all(&self) -> &[Hook] {
        &self.before_all
    }

    pub fn after_all(&self) -> &[Hook] {
        &self.after_all
    }

    pub fn before_each(&self) -> &[Hook] {
        &self.before_each
    }

    pub fn after_each(&self) -> &[Hook] {
        &self.after_each
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("description", &self.description)
            .field("parent", &self.parent)
            .field("mode", &self.mode)
            .field("children", &self.children)
            .field("before_all", &self.before_all.len())
            .field("after_all", &self.after_all.len())
            .field("before_each", &self.before_each.len())
            .field("after_each", &self.after_each.len())
            .finish()
    }
}

pub struct Test {
    pub description: String,
    pub parent: SuiteId,
    pub mode: Mode,
    body: Option<Body>,
    outcome: OnceCell<Outcome>,
}

impl Test {
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    pub fn status(&self) -> Option<Status> {
        self.outcome.get().map(|outcome| outcome.status)
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.outcome.get().and_then(|outcome| outcome.failure.as_ref())
    }

    /// Records the terminal outcome. The first outcome sticks; a second attempt is
    /// handed back to the caller.
    pub(crate) fn finish(&self, outcome: Outcome) -> Result<(), Outcome> {
        self.outcome.set(outcome)
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("description", &self.description)
            .field("parent", &self.parent)
            .field("mode", &self.mode)
            .field("has_body", &self.body.is_some())
            .field("outcome", &self.outcome.get())
            .finish()
    }
}

/// Arena holding a whole suite tree. The root suite is always present.
#[derive(Debug)]
pub struct SuiteTree {
    suites: Vec<Suite>,
    tests: Vec<Test>,
}

impl SuiteTree {
    pub fn new(description: impl Into<String>) -> SuiteTree {
        SuiteTree {
            suites: vec![Suite::new(description.into(), None, Mode::Normal)],
            tests: Vec::new(),
        }
    }

    /// Builds a tree whose root suite is populated by `builder`.
    pub fn suite(description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteTree {
        let mut tree = SuiteTree::new(description);
        let root = tree.root();
        builder(&mut tree.scope(root));
        tree
    }

    pub fn root(&self) -> SuiteId {
        SuiteId(0)
    }

    /// Builder handle bound to the given suite.
    pub fn scope(&mut self, suite: SuiteId) -> Scope<'_> {
        Scope { tree: self, suite }
    }

    pub fn get_suite(&self, id: SuiteId) -> &Suite {
        &self.suites[id.0]
    }

    pub fn get_test(&self, id: TestId) -> &Test {
        &self.tests[id.0]
    }

    /// All tests in the tree in execution order.
    pub fn tests(&self) -> Vec<TestId> {
        self.tests_under(self.root())
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Tests contained, transitively, in `suite` in execution order.
    pub fn tests_under(&self, suite: SuiteId) -> Vec<TestId> {
        let mut found = Vec::new();
        self.collect_tests(suite, &mut found);
        found
    }

    fn collect_tests(&self, suite: SuiteId, found: &mut Vec<TestId>) {
        for child in self.get_suite(suite).children() {
            match *child {
                Node::Suite(id) => self.collect_tests(id, found),
                Node::Test(id) => found.push(id),
            }
        }
    }

    /// `suite` followed by its ancestors, innermost first.
    pub fn ancestors(&self, suite: SuiteId) -> impl Iterator<Item = SuiteId> + '_ {
        std::iter::successors(Some(suite), |id| self.get_suite(*id).parent)
    }

    /// Number of suites above `suite`. The root has depth 0.
    pub fn depth(&self, suite: SuiteId) -> usize {
        self.ancestors(suite).count() - 1
    }

    /// `before_each` hooks that apply to `test`, outermost suite first.
    pub fn before_each_chain(&self, test: TestId) -> Vec<Hook> {
        let lineage: Vec<_> = self.ancestors(self.get_test(test).parent).collect();
        lineage
            .into_iter()
            .rev()
            .flat_map(|id| self.get_suite(id).before_each().iter().cloned())
            .collect()
    }

    /// `after_each` hooks that apply to `test`, innermost suite first.
    pub fn after_each_chain(&self, test: TestId) -> Vec<Hook> {
        self.ancestors(self.get_test(test).parent)
            .flat_map(|id| self.get_suite(id).after_each().iter().cloned())
            .collect()
    }

    /// Space separated descriptions from the outermost suite down to `test`.
    pub fn full_title(&self, test: TestId) -> String {
        let test = self.get_test(test);
        let lineage: Vec<_> = self.ancestors(test.parent).collect();
        lineage
            .into_iter()
            .rev()
            .map(|id| self.get_suite(id).description.as_str())
            .chain(std::iter::once(test.description.as_str()))
            .filter(|description| !description.is_empty())
            .join(" ")
    }

    /// Whether any suite or test in the tree was declared focused.
    pub fn has_focus(&self) -> bool {
        self.suites.iter().any(|suite| suite.mode == Mode::Focused)
            || self.tests.iter().any(|test| test.mode == Mode::Focused)
    }

    /// Whether `test` or one of its suites was declared pending.
    pub fn is_declared_pending(&self, test: TestId) -> bool {
        let t = self.get_test(test);
        t.mode == Mode::Pending
            || t.body.is_none()
            || self
                .ancestors(t.parent)
                .any(|id| self.get_suite(id).mode == Mode::Pending)
    }

    /// Whether `test` or one of its suites was declared focused.
    pub fn is_focused(&self, test: TestId) -> bool {
        let t = self.get_test(test);
        t.mode == Mode::Focused
            || self
                .ancestors(t.parent)
                .any(|id| self.get_suite(id).mode == Mode::Focused)
    }

    fn add_suite(&mut self, parent: SuiteId, description: String, mode: Mode) -> SuiteId {
        let id = SuiteId(self.suites.len());
        self.suites.push(Suite::new(description, Some(parent), mode));
        self.suites[parent.0].children.push(Node::Suite(id));
        id
    }

    fn add_test(&mut self, parent: SuiteId, description: String, body: Option<Body>, mode: Mode) -> TestId {
        let id = TestId(self.tests.len());
        self.tests.push(Test {
            description,
            parent,
            mode,
            body,
            outcome: OnceCell::new(),
        });
        self.suites[parent.0].children.push(Node::Test(id));
        id
    }
}

/// Builder handle bound to one suite of a [`SuiteTree`].
pub struct Scope<'a> {
    tree: &'a mut SuiteTree,
    suite: SuiteId,
}

impl Scope<'_> {
    /// The suite this scope appends to.
    pub fn id(&self) -> SuiteId {
        self.suite
    }

    /// Adds a nested suite and runs `builder` in its scope right away.
    pub fn describe(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Normal, builder)
    }

    /// Alias of [`Scope::describe`].
    pub fn context(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Normal, builder)
    }

    /// A nested suite whose tests are all reported pending.
    pub fn xdescribe(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Pending, builder)
    }

    pub fn xcontext(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Pending, builder)
    }

    /// A nested suite that is focused.
    pub fn fdescribe(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Focused, builder)
    }

    pub fn fcontext(&mut self, description: impl Into<String>, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        self.nested(description.into(), Mode::Focused, builder)
    }

    fn nested(&mut self, description: String, mode: Mode, builder: impl FnOnce(&mut Scope<'_>)) -> SuiteId {
        let id = self.tree.add_suite(self.suite, description, mode);
        builder(&mut self.tree.scope(id));
        id
    }

    pub fn it(&mut self, description: impl Into<String>, body: impl Fn() -> eyre::Result<()> + 'static) -> TestId {
        self.tree
            .add_test(self.suite, description.into(), Some(Rc::new(body)), Mode::Normal)
    }

    /// A test that is reported pending without running.
    pub fn xit(&mut self, description: impl Into<String>, body: impl Fn() -> eyre::Result<()> + 'static) -> TestId {
        self.tree
            .add_test(self.suite, description.into(), Some(Rc::new(body)), Mode::Pending)
    }

    pub fn fit(&mut self, description: impl Into<String>, body: impl Fn() -> eyre::Result<()> + 'static) -> TestId {
        self.tree
            .add_test(self.suite, description.into(), Some(Rc::new(body)), Mode::Focused)
    }

    /// A test without a body yet. Always pending.
    pub fn todo(&mut self, description: impl Into<String>) -> TestId {
        self.tree
            .add_test(self.suite, description.into(), None, Mode::Normal)
    }

    pub fn before_all(&mut self, hook: impl Fn() -> eyre::Result<()> + 'static) {
        self.tree.suites[self.suite.0].before_all.push(Rc::new(hook));
    }

    pub fn after_all(&mut self, hook: impl Fn() -> eyre::Result<()> + 'static) {
        self.tree.suites[self.suite.0].after_all.push(Rc::new(hook));
    }

    pub fn before_each(&mut self, hook: impl Fn() -> eyre::Result<()> + 'static) {
        self.tree.suites[self.suite.0].before_each.push(Rc::new(hook));
    }

    pub fn after_each(&mut self, hook: impl Fn() -> eyre::Result<()> + 'static) {
        self.tree.suites[self.suite.0].after_each.push(Rc::new(hook));
    }
}
