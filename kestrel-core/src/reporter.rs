use console::{style, Term};
use eyre::WrapErr;
use indexmap::IndexMap;
use std::{cell::RefCell, fmt, rc::Rc, time::Duration};
use tabled::{settings::Style, Table, Tabled};
use tracing::*;

use crate::{
    bus::{Event, EventBus, EventName},
    runner::RunResult,
    suite::{Failure, Status, SuiteId, SuiteTree, TestId},
    Error,
};

enum Sink {
    Term(Term),
    Buffer(String),
}

/// Destination of reporter output: the terminal or an in-memory buffer. Clones
/// write to the same destination.
#[derive(Clone)]
pub struct Output {
    sink: Rc<RefCell<Sink>>,
}

impl Output {
    pub fn stdout() -> Output {
        Output {
            sink: Rc::new(RefCell::new(Sink::Term(Term::stdout()))),
        }
    }

    pub fn buffer() -> Output {
        Output {
            sink: Rc::new(RefCell::new(Sink::Buffer(String::new()))),
        }
    }

    pub fn write_str(&self, s: &str) -> eyre::Result<()> {
        match &mut *self.sink.borrow_mut() {
            Sink::Term(term) => term
                .write_str(s)
                .wrap_err("failed to write character on terminal"),
            Sink::Buffer(buf) => {
                buf.push_str(s);
                Ok(())
            }
        }
    }

    pub fn write_line(&self, s: &str) -> eyre::Result<()> {
        match &mut *self.sink.borrow_mut() {
            Sink::Term(term) => term
                .write_line(s)
                .wrap_err("failed to write line on terminal"),
            Sink::Buffer(buf) => {
                buf.push_str(s);
                buf.push('\n');
                Ok(())
            }
        }
    }

    /// Everything written so far. Always empty for the terminal.
    pub fn contents(&self) -> String {
        match &*self.sink.borrow() {
            Sink::Term(_) => String::new(),
            Sink::Buffer(buf) => buf.clone(),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.sink.borrow() {
            Sink::Term(_) => f.write_str("Output(terminal)"),
            Sink::Buffer(buf) => write!(f, "Output(buffer, {} bytes)", buf.len()),
        }
    }
}

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the test runner, then attach
/// the reporter to a bus with [`subscribe`].
pub trait Reporter {
    /// Called before the first suite is entered.
    fn on_runner_start(&mut self, _tree: &SuiteTree) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a suite is entered.
    fn on_suite_start(&mut self, _tree: &SuiteTree, _suite: SuiteId) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a test case starts.
    fn on_test_start(&mut self, _tree: &SuiteTree, _test: TestId) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a test case ends.
    fn on_test_end(
        &mut self,
        _tree: &SuiteTree,
        _test: TestId,
        _status: Status,
        _failure: Option<&Failure>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a `before_all` or `after_all` hook of a suite faults.
    fn on_suite_error(
        &mut self,
        _tree: &SuiteTree,
        _suite: SuiteId,
        _failure: &Failure,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a suite is left.
    fn on_suite_end(&mut self, _tree: &SuiteTree, _suite: SuiteId) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once every test has finished.
    fn on_runner_end(&mut self, _tree: &SuiteTree, _result: &RunResult) -> eyre::Result<()> {
        Ok(())
    }
}

/// Subscribes every `on_xxx` method of `reporter` to the matching event.
pub fn subscribe(reporter: impl Reporter + 'static, bus: &EventBus) {
    let reporter = Rc::new(RefCell::new(reporter));

    for name in [
        EventName::RunnerStart,
        EventName::SuiteStart,
        EventName::TestStart,
        EventName::TestEnd,
        EventName::SuiteError,
        EventName::SuiteEnd,
        EventName::RunnerEnd,
    ] {
        let reporter = reporter.clone();
        bus.subscribe(name, move |event| {
            let mut reporter = reporter.borrow_mut();
            match *event {
                Event::RunnerStart { tree } => reporter.on_runner_start(tree),
                Event::SuiteStart { tree, suite } => reporter.on_suite_start(tree, suite),
                Event::TestStart { tree, test } => reporter.on_test_start(tree, test),
                Event::TestEnd {
                    tree,
                    test,
                    status,
                    failure,
                } => reporter.on_test_end(tree, test, status, failure),
                Event::SuiteError {
                    tree,
                    suite,
                    failure,
                } => reporter.on_suite_error(tree, suite, failure),
                Event::SuiteEnd { tree, suite } => reporter.on_suite_end(tree, suite),
                Event::RunnerEnd { tree, result } => reporter.on_runner_end(tree, result),
                _ => Ok(()),
            }
        });
    }
}

/// Builds a reporter for one run by subscribing to the bus.
pub type Factory = Rc<dyn Fn(&EventBus, &Output) -> eyre::Result<()>>;

pub struct ReporterEntry {
    pub name: String,
    pub description: String,
    pub factory: Factory,
}

impl fmt::Debug for ReporterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Registry of reporters by name. Registration order is listing order.
#[derive(Debug, Default)]
pub struct ReporterFactory {
    entries: RefCell<IndexMap<String, Rc<ReporterEntry>>>,
}

impl ReporterFactory {
    /// Registry with the built-in reporters.
    pub fn new() -> ReporterFactory {
        let factory = ReporterFactory::empty();
        factory.register("dot", "dot matrix of test results", |bus, output| {
            subscribe(DotReporter::new(output.clone()), bus);
            Ok(())
        });
        factory.register("spec", "hierarchical view of suites and tests", |bus, output| {
            subscribe(SpecReporter::new(output.clone()), bus);
            Ok(())
        });
        factory.register("table", "table of every test and its status", |bus, output| {
            subscribe(TableReporter::new(output.clone()), bus);
            Ok(())
        });
        factory.register("silent", "no output", |_, _| Ok(()));
        factory
    }

    pub fn empty() -> ReporterFactory {
        ReporterFactory::default()
    }

    /// Adds a reporter. An existing entry with the same name is replaced in place.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        factory: impl Fn(&EventBus, &Output) -> eyre::Result<()> + 'static,
    ) {
        let name = name.into();
        debug!("registering reporter \"{name}\"");
        self.entries.borrow_mut().insert(
            name.clone(),
            Rc::new(ReporterEntry {
                name,
                description: description.into(),
                factory: Rc::new(factory),
            }),
        );
    }

    pub fn get(&self, name: &str) -> crate::Result<Rc<ReporterEntry>> {
        self.entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownReporter(name.to_string()))
    }

    pub fn list(&self) -> Vec<Rc<ReporterEntry>> {
        self.entries.borrow().values().cloned().collect()
    }

    /// Instantiates the reporter `name`, subscribing it to `bus`.
    pub fn attach(&self, name: &str, bus: &EventBus, output: &Output) -> eyre::Result<()> {
        let entry = self.get(name)?;
        (entry.factory)(bus, output)
            .wrap_err_with(|| format!("failed to create reporter \"{name}\""))
    }
}

fn marker(status: Status) -> String {
    match status {
        Status::Passed => style("✓").green().to_string(),
        Status::Failed => style("✘").red().to_string(),
        Status::Errored => style("✘").red().bold().to_string(),
        Status::Pending => style("-").cyan().to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() > 0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Counts, suite errors and numbered failure details shared by the built-in
/// reporters.
pub fn write_summary(output: &Output, result: &RunResult) -> eyre::Result<()> {
    output.write_line("")?;
    output.write_line(&format!(
        "  {} ({})",
        style(format!("{} passing", result.passed)).green(),
        format_duration(result.duration)
    ))?;
    if result.failed > 0 {
        output.write_line(&format!("  {}", style(format!("{} failing", result.failed)).red()))?;
    }
    if result.errored > 0 {
        output.write_line(&format!(
            "  {}",
            style(format!("{} errored", result.errored)).red().bold()
        ))?;
    }
    if result.pending > 0 {
        output.write_line(&format!("  {}", style(format!("{} pending", result.pending)).cyan()))?;
    }

    for error in &result.suite_errors {
        output.write_line("")?;
        output.write_line(&format!(
            "  {} {}: {}",
            style("suite error").red(),
            error.title,
            error.failure
        ))?;
    }

    for (i, record) in result.failures.iter().enumerate() {
        output.write_line("")?;
        output.write_line(&format!("  {}) {}", i + 1, record.title))?;
        output.write_line(&format!("     {}", style(record.failure.kind).red()))?;
        for line in record.failure.message.lines() {
            output.write_line(&format!("     {}", style(line).dim()))?;
        }
    }

    Ok(())
}

/// One character per test, then the summary.
pub struct DotReporter {
    output: Output,
}

impl DotReporter {
    pub fn new(output: Output) -> DotReporter {
        DotReporter { output }
    }
}

impl Reporter for DotReporter {
    fn on_test_end(
        &mut self,
        _tree: &SuiteTree,
        _test: TestId,
        status: Status,
        _failure: Option<&Failure>,
    ) -> eyre::Result<()> {
        let dot = match status {
            Status::Passed => style(".").dim(),
            Status::Failed => style("F").red(),
            Status::Errored => style("E").red().bold(),
            Status::Pending => style("-").cyan(),
        };
        self.output.write_str(&dot.to_string())
    }

    fn on_runner_end(&mut self, _tree: &SuiteTree, result: &RunResult) -> eyre::Result<()> {
        self.output.write_line("")?;
        write_summary(&self.output, result)
    }
}

/// Suites and tests indented by depth.
pub struct SpecReporter {
    output: Output,
}

impl SpecReporter {
    pub fn new(output: Output) -> SpecReporter {
        SpecReporter { output }
    }

    fn indent(tree: &SuiteTree, suite: SuiteId) -> String {
        "  ".repeat(tree.depth(suite))
    }
}

impl Reporter for SpecReporter {
    fn on_suite_start(&mut self, tree: &SuiteTree, suite: SuiteId) -> eyre::Result<()> {
        let description = &tree.get_suite(suite).description;
        if description.is_empty() {
            return Ok(());
        }
        self.output
            .write_line(&format!("{}{description}", Self::indent(tree, suite)))
    }

    fn on_test_end(
        &mut self,
        tree: &SuiteTree,
        test: TestId,
        status: Status,
        failure: Option<&Failure>,
    ) -> eyre::Result<()> {
        let node = tree.get_test(test);
        let indent = Self::indent(tree, node.parent);
        let line = match failure {
            Some(failure) => format!(
                "{indent}  {} {} {}",
                marker(status),
                node.description,
                style(format!("({})", failure.kind)).red()
            ),
            None => format!("{indent}  {} {}", marker(status), node.description),
        };
        self.output.write_line(&line)
    }

    fn on_suite_error(
        &mut self,
        tree: &SuiteTree,
        suite: SuiteId,
        failure: &Failure,
    ) -> eyre::Result<()> {
        self.output.write_line(&format!(
            "{}  {} {failure}",
            Self::indent(tree, suite),
            style("!").red().bold()
        ))
    }

    fn on_runner_end(&mut self, _tree: &SuiteTree, result: &RunResult) -> eyre::Result<()> {
        write_summary(&self.output, result)
    }
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Suite")]
    suite: String,
    #[tabled(rename = "Test")]
    test: String,
    #[tabled(rename = "Status")]
    status: Status,
}

/// Collects every test and prints them as a table at the end of the run.
pub struct TableReporter {
    output: Output,
    rows: Vec<Row>,
}

impl TableReporter {
    pub fn new(output: Output) -> TableReporter {
        TableReporter {
            output,
            rows: Vec::new(),
        }
    }
}

impl Reporter for TableReporter {
    fn on_test_end(
        &mut self,
        tree: &SuiteTree,
        test: TestId,
        status: Status,
        _failure: Option<&Failure>,
    ) -> eyre::Result<()> {
        let node = tree.get_test(test);
        let suite: Vec<_> = tree
            .ancestors(node.parent)
            .map(|id| tree.get_suite(id).description.as_str())
            .filter(|description| !description.is_empty())
            .collect();
        self.rows.push(Row {
            suite: suite.into_iter().rev().collect::<Vec<_>>().join(" > "),
            test: node.description.clone(),
            status,
        });
        Ok(())
    }

    fn on_runner_end(&mut self, _tree: &SuiteTree, result: &RunResult) -> eyre::Result<()> {
        if !self.rows.is_empty() {
            let mut table = Table::new(std::mem::take(&mut self.rows));
            table.with(Style::modern());
            self.output.write_line(&table.to_string())?;
        }
        write_summary(&self.output, result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{check, runner::Runner};
    use pretty_assertions::assert_eq;

    fn sample() -> SuiteTree {
        SuiteTree::suite("", |s| {
            s.describe("Stack", |s| {
                s.it("pushes", || Ok(()));
                s.it("pops", || {
                    check!(1 > 2);
                    Ok(())
                });
                s.xit("peeks", || Ok(()));
            });
        })
    }

    fn run_with(name: &str) -> eyre::Result<String> {
        console::set_colors_enabled(false);
        let bus = EventBus::new();
        let output = Output::buffer();
        ReporterFactory::new().attach(name, &bus, &output)?;
        Runner::new(&bus).run(&sample())?;
        Ok(output.contents())
    }

    #[test]
    fn dot_reporter() -> eyre::Result<()> {
        let out = run_with("dot")?;
        let first = out.lines().next().unwrap_or_default();
        assert_eq!(first, ".F-");
        assert!(out.contains("1 passing"));
        assert!(out.contains("1 failing"));
        assert!(out.contains("1 pending"));
        assert!(out.contains("1) Stack pops"));
        assert!(out.contains("check failed: 1 > 2"));
        Ok(())
    }

    #[test]
    fn spec_reporter() -> eyre::Result<()> {
        let out = run_with("spec")?;
        assert!(out.contains("  Stack\n"));
        assert!(out.contains("    ✓ pushes"));
        assert!(out.contains("    ✘ pops (assertion failure)"));
        assert!(out.contains("    - peeks"));
        Ok(())
    }

    #[test]
    fn table_reporter() -> eyre::Result<()> {
        let out = run_with("table")?;
        assert!(out.contains("Suite"));
        assert!(out.contains("pushes"));
        assert!(out.contains("failed"));
        Ok(())
    }

    #[test]
    fn silent_reporter_subscribes_nothing() -> eyre::Result<()> {
        let bus = EventBus::new();
        ReporterFactory::new().attach("silent", &bus, &Output::buffer())?;
        assert_eq!(bus.handler_count(EventName::TestEnd), 0);
        Ok(())
    }

    #[test]
    fn unknown_reporter() {
        let err = ReporterFactory::new().get("nyan").unwrap_err();
        assert!(matches!(err, Error::UnknownReporter(name) if name == "nyan"));
    }

    #[test]
    fn register_overwrites_in_place() -> eyre::Result<()> {
        let factory = ReporterFactory::new();
        factory.register("spec", "custom spec", |_, _| Ok(()));
        factory.register("json", "machine readable", |_, _| Ok(()));

        let names: Vec<_> = factory.list().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["dot", "spec", "table", "silent", "json"]);
        assert_eq!(factory.get("spec")?.description, "custom spec");
        Ok(())
    }
}
