use kestrel::{
    check_eq, eyre, Command, Config, EventBus, ExitStatus, Invocation, Output, ReporterFactory,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

kestrel::spec!(|s| {
    s.describe("registered spec", |s| {
        s.it("is found on disk", || {
            check_eq!(4, 2 + 2);
            Ok(())
        });
        s.xit("is skipped", || Ok(()));
    });
});

fn config(grep: &str) -> Config {
    Config {
        grep: grep.into(),
        reporter: "silent".into(),
        paths: vec![PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests")],
        ..Default::default()
    }
}

#[test]
fn runs_definitions_registered_for_discovered_file() -> eyre::Result<()> {
    let command = Command::new(config("registered.rs"), &EventBus::new(), ReporterFactory::new());

    let status = command.run(&Invocation::default(), &Output::buffer());

    assert_eq!(status, ExitStatus::Success);
    let result = command.result().ok_or_else(|| eyre::eyre!("no result"))?;
    assert_eq!((result.passed, result.pending), (1, 1));
    Ok(())
}

#[test]
fn ignores_definitions_of_files_not_discovered() -> eyre::Result<()> {
    let command = Command::new(config("*.spec.rs"), &EventBus::new(), ReporterFactory::new());
    let output = Output::buffer();

    let status = command.run(&Invocation::default(), &output);

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(command.result().map(|r| r.total()), Some(0));
    assert!(output.contents().contains("no tests found"));
    Ok(())
}
