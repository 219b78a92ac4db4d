//! # Event bus
//!
//! Synchronous publish/subscribe used to coordinate the command, the runner and
//! reporters. Handlers are grouped by [`EventName`] and invoked in subscription
//! order on the caller's stack.
//!
//! ```text
//! Publishers:                       Subscribers:
//!   Command ──┐                 ┌──► reporter (dot/spec/table/...)
//!             ├──► EventBus ────┤
//!   Runner  ──┘   (per name,    └──► extension handlers
//!                  in order)
//! ```
//!
//! A handler that returns an error stops the dispatch and the error travels back
//! to the publisher. The runner does not swallow it: a broken reporter aborts the
//! run instead of hiding results.

use eyre::WrapErr;
use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};
use tracing::*;

use crate::{
    command::{Command, Invocation},
    config::Config,
    reporter::{Output, ReporterFactory},
    runner::RunResult,
    suite::{Failure, Status, SuiteId, SuiteTree, TestId},
};

/// Names of the events published during an invocation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum EventName {
    #[strum(serialize = "execute")]
    Execute,
    #[strum(serialize = "reporters")]
    Reporters,
    #[strum(serialize = "load")]
    Load,
    #[strum(serialize = "runner.start")]
    RunnerStart,
    #[strum(serialize = "suite.start")]
    SuiteStart,
    #[strum(serialize = "test.start")]
    TestStart,
    #[strum(serialize = "test.end")]
    TestEnd,
    #[strum(serialize = "suite.error")]
    SuiteError,
    #[strum(serialize = "suite.end")]
    SuiteEnd,
    #[strum(serialize = "runner.end")]
    RunnerEnd,
}

/// Event payloads. Every variant borrows from the publisher for the duration of
/// the dispatch.
pub enum Event<'a> {
    Execute {
        input: &'a Invocation,
        output: &'a Output,
    },
    Reporters {
        input: &'a Invocation,
        factory: &'a ReporterFactory,
    },
    Load {
        command: &'a Command,
        config: &'a Config,
    },
    RunnerStart {
        tree: &'a SuiteTree,
    },
    SuiteStart {
        tree: &'a SuiteTree,
        suite: SuiteId,
    },
    TestStart {
        tree: &'a SuiteTree,
        test: TestId,
    },
    TestEnd {
        tree: &'a SuiteTree,
        test: TestId,
        status: Status,
        failure: Option<&'a Failure>,
    },
    SuiteError {
        tree: &'a SuiteTree,
        suite: SuiteId,
        failure: &'a Failure,
    },
    SuiteEnd {
        tree: &'a SuiteTree,
        suite: SuiteId,
    },
    RunnerEnd {
        tree: &'a SuiteTree,
        result: &'a RunResult,
    },
}

impl Event<'_> {
    pub fn name(&self) -> EventName {
        match self {
            Event::Execute { .. } => EventName::Execute,
            Event::Reporters { .. } => EventName::Reporters,
            Event::Load { .. } => EventName::Load,
            Event::RunnerStart { .. } => EventName::RunnerStart,
            Event::SuiteStart { .. } => EventName::SuiteStart,
            Event::TestStart { .. } => EventName::TestStart,
            Event::TestEnd { .. } => EventName::TestEnd,
            Event::SuiteError { .. } => EventName::SuiteError,
            Event::SuiteEnd { .. } => EventName::SuiteEnd,
            Event::RunnerEnd { .. } => EventName::RunnerEnd,
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.name())
    }
}

pub type Handler = Rc<dyn Fn(&Event<'_>) -> eyre::Result<()>>;

/// Handle to the bus of one invocation. Clones share the same handler table.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Rc<RefCell<HashMap<EventName, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    /// Appends `handler` to the handlers of `name`.
    pub fn subscribe(
        &self,
        name: EventName,
        handler: impl Fn(&Event<'_>) -> eyre::Result<()> + 'static,
    ) {
        self.handlers
            .borrow_mut()
            .entry(name)
            .or_default()
            .push(Rc::new(handler));
    }

    /// Invokes every handler currently registered for the event, in registration
    /// order. Handlers subscribed while the dispatch is in progress are not called
    /// for this event.
    pub fn publish(&self, event: &Event<'_>) -> eyre::Result<()> {
        let name = event.name();
        let handlers = self
            .handlers
            .borrow()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        trace!("publishing {name} to {} handler(s)", handlers.len());

        for handler in handlers {
            handler(event).wrap_err_with(|| format!("\"{name}\" handler failed"))?;
        }

        Ok(())
    }

    pub fn handler_count(&self, name: EventName) -> usize {
        self.handlers.borrow().get(&name).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        let mut map = f.debug_map();
        for (name, list) in handlers.iter() {
            map.entry(&name.as_ref(), &list.len());
        }
        map.finish()
    }
}
