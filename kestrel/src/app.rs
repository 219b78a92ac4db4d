use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use itertools::Itertools;
use std::{ffi::OsString, path::PathBuf, process::ExitCode, str::FromStr};
use tracing::*;
use tracing_subscriber::EnvFilter;

use crate::{
    Color, Command, Config, Event, EventBus, EventName, ExitStatus, Invocation, Output,
    ReporterFactory, SuiteLoader,
};

/// Build the CLI with clap's builder pattern
fn build_cli(factory: &ReporterFactory) -> ClapCommand {
    let reporter_choices = factory.list().iter().map(|entry| entry.name.clone()).join(", ");
    ClapCommand::new("kestrel")
        .about("kestrel discovers spec files, runs their suites and reports the results")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::new("paths")
            .help("Root paths scanned for spec files. Default is taken from kestrel.toml, then \"specs\"")
            .value_parser(value_parser!(PathBuf))
            .action(ArgAction::Append))
        .arg(Arg::new("reporter")
            .short('r')
            .long("reporter")
            .help(format!("Specify the reporter to use. Default is \"dot\". [possible values: {reporter_choices}]")))
        .arg(Arg::new("reporters")
            .long("reporters")
            .help("List the available reporters and exit")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("grep")
            .short('g')
            .long("grep")
            .help("Glob matched against spec file names. Default is \"*.spec.rs\""))
        .arg(Arg::new("focus")
            .short('f')
            .long("focus")
            .help("Only run tests whose full title matches this regular expression"))
        .arg(Arg::new("skip")
            .short('s')
            .long("skip")
            .help("Skip tests whose full title matches this regular expression"))
        .arg(Arg::new("fail-on-empty")
            .long("fail-on-empty")
            .help("Exit with failure when no test was found")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("color")
            .long("color")
            .help("Produce color output. Default is \"auto\" [env: CARGO_TERM_COLOR]")
            .value_parser(["auto", "always", "never"]))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .help("Path of the configuration file [env: KESTREL_CONFIG]")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("log-level")
            .long("log-level")
            .help("kestrel's internal log level filter, written to stderr. RUST_LOG takes precedence")
            .default_value("off"))
}

fn invocation(matches: &ArgMatches) -> Invocation {
    Invocation {
        reporter: matches.get_one::<String>("reporter").cloned(),
        list_reporters: matches.get_flag("reporters"),
        paths: matches
            .get_many::<PathBuf>("paths")
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default(),
        grep: matches.get_one::<String>("grep").cloned(),
        focus: matches.get_one::<String>("focus").cloned(),
        skip: matches.get_one::<String>("skip").cloned(),
        fail_on_empty: matches.get_flag("fail-on-empty"),
    }
}

/// Explicit `--color always|never` wins over `CARGO_TERM_COLOR`, which wins over
/// the configuration file.
fn resolve_color(command: Option<Color>, env: Option<Color>, cfg: Color) -> Color {
    match (command, env) {
        (Some(color @ (Color::Always | Color::Never)), _) => color,
        (_, Some(color)) => color,
        (Some(color), None) => color,
        (None, None) => cfg,
    }
}

fn apply_color(color: Color) {
    match color {
        Color::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        Color::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        Color::Auto => {}
    }
}

fn init_logging(level: &str) -> eyre::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        debug!("global tracing subscriber already set");
    }
    Ok(())
}

/// kestrel CLI.
pub struct App {
    factory: ReporterFactory,
    bus: EventBus,
    loader: Option<SuiteLoader>,
}

impl Default for App {
    fn default() -> App {
        App::new()
    }
}

impl App {
    pub fn new() -> App {
        App {
            factory: ReporterFactory::new(),
            bus: EventBus::new(),
            loader: None,
        }
    }

    /// Install a third-party reporter. `factory` subscribes the reporter to the
    /// bus when it is selected.
    pub fn install_reporter(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        factory: impl Fn(&EventBus, &Output) -> eyre::Result<()> + 'static,
    ) {
        self.factory.register(name, description, factory);
    }

    /// Subscribe an extension handler. Handlers run before reporters attached
    /// later in the invocation.
    pub fn on(
        &mut self,
        name: EventName,
        handler: impl Fn(&Event<'_>) -> eyre::Result<()> + 'static,
    ) {
        self.bus.subscribe(name, handler);
    }

    /// Replace the source of spec definitions. Defaults to the definitions
    /// registered with [`crate::spec!`].
    pub fn with_loader(mut self, loader: SuiteLoader) -> App {
        self.loader = Some(loader);
        self
    }

    /// Parse command-line args and run kestrel.
    pub fn run(self) -> eyre::Result<ExitCode> {
        self.run_from(std::env::args_os())
    }

    /// Same as [`App::run`] with explicit arguments. The first one is the binary
    /// name.
    pub fn run_from<I, T>(self, args: I) -> eyre::Result<ExitCode>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = build_cli(&self.factory).get_matches_from(args);
        if color_eyre::install().is_err() {
            debug!("color_eyre already installed");
        }
        let level = matches
            .get_one::<String>("log-level")
            .map_or("off", String::as_str);
        init_logging(level)?;

        let status = self.execute(&matches, &Output::stdout())?;
        Ok(status.into())
    }

    fn execute(self, matches: &ArgMatches, output: &Output) -> eyre::Result<ExitStatus> {
        let cfg = match matches.get_one::<PathBuf>("config") {
            Some(path) => Config::load_explicit(path)?,
            None => Config::load()?,
        };

        let color_command = matches
            .get_one::<String>("color")
            .and_then(|s| Color::from_str(s).ok());
        let color_env = std::env::var("CARGO_TERM_COLOR")
            .ok()
            .and_then(|s| Color::from_str(&s).ok());
        apply_color(resolve_color(color_command, color_env, cfg.color));

        let input = invocation(matches);
        debug!("invocation: {input:?}");

        let mut command = Command::new(cfg, &self.bus, self.factory);
        if let Some(loader) = self.loader {
            command = command.with_loader(loader);
        }
        Ok(command.run(&input, output))
    }
}
