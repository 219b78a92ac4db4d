//! # Command
//!
//! Single orchestration entry point. [`Command::run`] resolves the configuration,
//! gives extensions a chance to hook in through the bus, selects the reporter,
//! loads the spec files, runs them and maps the result to an [`ExitStatus`].
//!
//! ```text
//! execute ─► reporters ─► [list?] ─► attach reporter ─► load ─► SuiteLoader ─► Runner
//!                                                                                │
//!                                      ExitStatus ◄── RunResult ◄────────────────┘
//! ```

use std::{cell::RefCell, fmt, path::PathBuf, process::ExitCode};
use tracing::*;

use crate::{
    bus::{Event, EventBus},
    config::Config,
    loader::SuiteLoader,
    reporter::{Output, ReporterFactory},
    runner::{RunResult, Runner},
};

/// Already tokenized invocation options. Unset fields fall back to the
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub reporter: Option<String>,
    pub list_reporters: bool,
    pub paths: Vec<PathBuf>,
    pub grep: Option<String>,
    pub focus: Option<String>,
    pub skip: Option<String>,
    pub fail_on_empty: bool,
}

/// Process exit status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every test passed, or nothing ran.
    Success = 0,
    /// At least one test failed or errored.
    Failure = 1,
    /// Bad invocation: unknown reporter, discovery error, broken handler.
    Error = 2,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> ExitCode {
        ExitCode::from(status as u8)
    }
}

pub struct Command {
    config: RefCell<Config>,
    bus: EventBus,
    factory: ReporterFactory,
    loader: RefCell<SuiteLoader>,
    result: RefCell<Option<RunResult>>,
}

impl Command {
    pub fn new(config: Config, bus: &EventBus, factory: ReporterFactory) -> Command {
        Command {
            config: RefCell::new(config),
            bus: bus.clone(),
            factory,
            loader: RefCell::new(SuiteLoader::default()),
            result: RefCell::new(None),
        }
    }

    pub fn with_loader(mut self, loader: SuiteLoader) -> Command {
        *self.loader.get_mut() = loader;
        self
    }

    /// Replaces the loader. Meant for `load` handlers: the loader in place once
    /// they return is the one used for discovery.
    pub fn set_loader(&self, loader: SuiteLoader) {
        *self.loader.borrow_mut() = loader;
    }

    /// Adjusts the configuration of the current invocation. Changes made by
    /// `load` handlers apply to filtering and discovery.
    pub fn update_config(&self, update: impl FnOnce(&mut Config)) {
        update(&mut self.config.borrow_mut());
    }

    /// Configuration of the last invocation, or the base configuration before
    /// the first one.
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    pub fn loader(&self) -> SuiteLoader {
        self.loader.borrow().clone()
    }

    pub fn factory(&self) -> &ReporterFactory {
        &self.factory
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Result of the last completed run.
    pub fn result(&self) -> Option<RunResult> {
        self.result.borrow().clone()
    }

    fn resolve(&self, input: &Invocation) -> Config {
        let mut cfg = self.config();
        if let Some(reporter) = &input.reporter {
            cfg.reporter = reporter.clone();
        }
        if let Some(grep) = &input.grep {
            cfg.grep = grep.clone();
        }
        if !input.paths.is_empty() {
            cfg.paths = input.paths.clone();
        }
        if input.focus.is_some() {
            cfg.focus = input.focus.clone();
        }
        if input.skip.is_some() {
            cfg.skip = input.skip.clone();
        }
        cfg.fail_on_empty |= input.fail_on_empty;
        cfg
    }

    /// Runs the invocation. Errors are written to `output` and mapped to
    /// [`ExitStatus::Error`].
    pub fn run(&self, input: &Invocation, output: &Output) -> ExitStatus {
        match self.execute(input, output) {
            Ok(status) => {
                debug!("exiting with {status:?}");
                status
            }
            Err(e) => {
                error!("invocation aborted: {e:?}");
                fail(output, &e)
            }
        }
    }

    fn execute(&self, input: &Invocation, output: &Output) -> eyre::Result<ExitStatus> {
        *self.config.borrow_mut() = self.resolve(input);
        *self.result.borrow_mut() = None;

        self.bus.publish(&Event::Execute { input, output })?;
        self.bus.publish(&Event::Reporters {
            input,
            factory: &self.factory,
        })?;

        if input.list_reporters {
            for entry in self.factory.list() {
                output.write_line(&format!("{} - {}", entry.name, entry.description))?;
            }
            return Ok(ExitStatus::Success);
        }

        let entry = match self.factory.get(&self.config.borrow().reporter) {
            Ok(entry) => entry,
            Err(e) => return Ok(fail(output, &e)),
        };
        (entry.factory)(&self.bus, output)?;
        debug!("reporter \"{}\" attached", entry.name);

        self.bus.publish(&Event::Load {
            command: self,
            config: &self.config(),
        })?;

        let config = self.config();
        let loader = self.loader();

        let runner = match Runner::with_config(&self.bus, &config) {
            Ok(runner) => runner,
            Err(e) => return Ok(fail(output, &e)),
        };
        let tree = match loader.load_config(&config) {
            Ok(tree) => tree,
            Err(e) => return Ok(fail(output, &e)),
        };

        let result = runner.run(&tree)?;
        let status = if result.total() == 0 {
            output.write_line("no tests found")?;
            if config.fail_on_empty {
                ExitStatus::Failure
            } else {
                ExitStatus::Success
            }
        } else if result.is_failure() {
            ExitStatus::Failure
        } else {
            ExitStatus::Success
        };
        *self.result.borrow_mut() = Some(result);

        Ok(status)
    }
}

fn fail(output: &Output, e: &dyn fmt::Display) -> ExitStatus {
    if let Err(write_err) = output.write_line(&format!("error: {e:#}")) {
        error!("failed to write error to output: {write_err:#}");
    }
    ExitStatus::Error
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("config", &self.config.borrow())
            .field("bus", &self.bus)
            .field("factory", &self.factory)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bus::EventName, check_eq, loader::Definitions};
    use pretty_assertions::assert_eq;
    use std::{cell::Cell, fs, rc::Rc};

    struct Fixture {
        dir: tempfile::TempDir,
        bus: EventBus,
        output: Output,
    }

    impl Fixture {
        fn new(files: &[&str]) -> eyre::Result<Fixture> {
            let dir = tempfile::tempdir()?;
            for file in files {
                fs::write(dir.path().join(file), "")?;
            }
            Ok(Fixture {
                dir,
                bus: EventBus::new(),
                output: Output::buffer(),
            })
        }

        fn command(&self, definitions: Definitions) -> Command {
            let config = Config {
                paths: vec![self.dir.path().to_path_buf()],
                ..Default::default()
            };
            Command::new(config, &self.bus, ReporterFactory::new())
                .with_loader(SuiteLoader::new(definitions))
        }
    }

    fn passing() -> Definitions {
        let mut defs = Definitions::new();
        defs.add("pass.spec.rs", |s| {
            s.describe("suite", |s| {
                s.it("passes", || Ok(()));
            });
        });
        defs
    }

    #[test]
    fn empty_run_succeeds_by_default() -> eyre::Result<()> {
        let fixture = Fixture::new(&["notaspec.rs"])?;
        let command = fixture.command(passing());

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        let result = command.result().expect("run completed");
        assert_eq!(
            (result.passed, result.failed, result.errored, result.pending),
            (0, 0, 0, 0)
        );
        assert!(fixture.output.contents().contains("no tests found"));
        Ok(())
    }

    #[test]
    fn empty_run_can_fail() -> eyre::Result<()> {
        let fixture = Fixture::new(&[])?;
        let input = Invocation {
            fail_on_empty: true,
            ..Default::default()
        };

        let status = fixture.command(passing()).run(&input, &fixture.output);

        assert_eq!(status, ExitStatus::Failure);
        Ok(())
    }

    #[test]
    fn passing_run_exits_zero() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        let command = fixture.command(passing());

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(command.result().map(|r| r.passed), Some(1));
        Ok(())
    }

    #[test]
    fn failing_run_exits_one() -> eyre::Result<()> {
        let fixture = Fixture::new(&["fail.spec.rs"])?;
        let mut defs = Definitions::new();
        defs.add("fail.spec.rs", |s| {
            s.describe("fail suite", |s| {
                s.it("fail", || {
                    check_eq!("expected", "actual");
                    Ok(())
                });
            });
        });
        let failure = Rc::new(RefCell::new(None));
        let sink = failure.clone();
        fixture.bus.subscribe(EventName::TestEnd, move |event| {
            if let Event::TestEnd { failure, .. } = event {
                *sink.borrow_mut() = failure.map(|f| f.to_string());
            }
            Ok(())
        });
        let command = fixture.command(defs);

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Failure);
        assert_eq!(status.code(), 1);
        assert_eq!(command.result().map(|r| r.failed), Some(1));
        let failure = failure.borrow().clone().unwrap_or_default();
        assert!(failure.starts_with("assertion failure"));
        Ok(())
    }

    #[test]
    fn suite_setup_failure_exits_one() -> eyre::Result<()> {
        let fixture = Fixture::new(&["setup.spec.rs"])?;
        let mut defs = Definitions::new();
        defs.add("setup.spec.rs", |s| {
            s.describe("needs a server", |s| {
                s.before_all(|| Err(eyre::eyre!("port in use")));
                s.it("a", || Ok(()));
                s.describe("nested", |s| {
                    s.it("b", || Ok(()));
                });
            });
        });
        let command = fixture.command(defs);

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Failure);
        let result = command.result().expect("run completed");
        assert_eq!(result.errored, 2);
        assert!(result
            .failures
            .iter()
            .all(|f| f.failure.to_string().contains("suite setup failed")));
        Ok(())
    }

    #[test]
    fn lists_reporters_without_running() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        let command = fixture.command(passing());
        command.factory().register("custom", "a third-party reporter", |_, _| Ok(()));
        let input = Invocation {
            list_reporters: true,
            ..Default::default()
        };

        let status = command.run(&input, &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        assert!(command.result().is_none());
        let content = fixture.output.contents();
        for entry in command.factory().list() {
            assert!(
                content.contains(&format!("{} - {}", entry.name, entry.description)),
                "reporter {} should be displayed",
                entry.name
            );
        }
        assert!(content.contains("custom - a third-party reporter"));
        Ok(())
    }

    #[test]
    fn unknown_reporter_runs_nothing() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let mut defs = Definitions::new();
        defs.add("pass.spec.rs", move |s| {
            let flag = flag.clone();
            s.it("passes", move || {
                flag.set(true);
                Ok(())
            });
        });
        let command = fixture.command(defs);
        let input = Invocation {
            reporter: Some("nyan".into()),
            ..Default::default()
        };

        let status = command.run(&input, &fixture.output);

        assert_eq!(status, ExitStatus::Error);
        assert_ne!(status.code(), 0);
        assert!(!ran.get());
        assert!(fixture.output.contents().contains("unknown reporter \"nyan\""));
        Ok(())
    }

    #[test]
    fn missing_path_is_a_discovery_error() -> eyre::Result<()> {
        let fixture = Fixture::new(&[])?;
        let input = Invocation {
            paths: vec![fixture.dir.path().join("missing")],
            ..Default::default()
        };

        let status = fixture.command(passing()).run(&input, &fixture.output);

        assert_eq!(status, ExitStatus::Error);
        assert!(fixture.output.contents().contains("does not exist"));
        Ok(())
    }

    #[test]
    fn reporter_option_updates_configuration() -> eyre::Result<()> {
        let fixture = Fixture::new(&[])?;
        let command = fixture.command(passing());
        command.factory().register("test", "desc", |_, _| Ok(()));
        let input = Invocation {
            reporter: Some("test".into()),
            grep: Some("*.feature.rs".into()),
            ..Default::default()
        };

        command.run(&input, &fixture.output);

        let cfg = command.config();
        assert_eq!(cfg.reporter, "test");
        assert_eq!(cfg.grep, "*.feature.rs");
        Ok(())
    }

    #[test]
    fn publishes_extension_events_in_order() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        let seen = Rc::new(RefCell::new(Vec::new()));
        for name in [
            EventName::Execute,
            EventName::Reporters,
            EventName::Load,
            EventName::RunnerStart,
        ] {
            let seen = seen.clone();
            fixture.bus.subscribe(name, move |event| {
                let entry = match event {
                    Event::Reporters { factory, .. } => {
                        format!("{name} {}", factory.list().len())
                    }
                    Event::Load { config, .. } => format!("{name} {}", config.reporter),
                    _ => name.to_string(),
                };
                seen.borrow_mut().push(entry);
                Ok(())
            });
        }

        fixture
            .command(passing())
            .run(&Invocation::default(), &fixture.output);

        assert_eq!(
            *seen.borrow(),
            vec!["execute", "reporters 4", "load dot", "runner.start"]
        );
        Ok(())
    }

    #[test]
    fn reporters_event_can_register_reporter() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        let attached = Rc::new(Cell::new(false));
        let flag = attached.clone();
        fixture
            .bus
            .subscribe(EventName::Reporters, move |event| {
                if let Event::Reporters { factory, .. } = event {
                    let flag = flag.clone();
                    factory.register("plugin", "registered by an extension", move |_, _| {
                        flag.set(true);
                        Ok(())
                    });
                }
                Ok(())
            });
        let input = Invocation {
            reporter: Some("plugin".into()),
            ..Default::default()
        };

        let status = fixture.command(passing()).run(&input, &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        assert!(attached.get());
        Ok(())
    }

    #[test]
    fn load_handler_can_swap_the_loader() -> eyre::Result<()> {
        let fixture = Fixture::new(&["swapped.spec.rs"])?;
        let mut swapped = Definitions::new();
        swapped.add("swapped.spec.rs", |s| {
            s.describe("swapped", |s| {
                s.it("runs", || Ok(()));
                s.it("also runs", || Ok(()));
            });
        });
        fixture.bus.subscribe(EventName::Load, move |event| {
            if let Event::Load { command, .. } = event {
                command.set_loader(SuiteLoader::new(swapped.clone()));
            }
            Ok(())
        });
        let command = fixture.command(passing());

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(command.result().map(|r| r.passed), Some(2));
        Ok(())
    }

    #[test]
    fn load_handler_can_adjust_configuration() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs", "other.spec.rs"])?;
        let mut defs = passing();
        defs.add("other.spec.rs", |s| {
            s.it("slow test", || Err(eyre::eyre!("should be skipped")));
        });
        fixture.bus.subscribe(EventName::Load, |event| {
            if let Event::Load { command, .. } = event {
                command.update_config(|cfg| cfg.skip = Some("^slow".into()));
            }
            Ok(())
        });
        let command = fixture.command(defs);

        let status = command.run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Success);
        let result = command.result().expect("run completed");
        assert_eq!((result.passed, result.pending), (1, 1));
        assert_eq!(command.config().skip.as_deref(), Some("^slow"));
        Ok(())
    }

    #[test]
    fn broken_handler_aborts_with_error() -> eyre::Result<()> {
        let fixture = Fixture::new(&["pass.spec.rs"])?;
        fixture
            .bus
            .subscribe(EventName::TestEnd, |_| Err(eyre::eyre!("reporter bug")));

        let status = fixture
            .command(passing())
            .run(&Invocation::default(), &fixture.output);

        assert_eq!(status, ExitStatus::Error);
        assert!(fixture.output.contents().contains("reporter bug"));
        Ok(())
    }
}
