use kestrel_core::{
    check, check_eq, Command, Config, Definitions, EventBus, EventName, ExitStatus, Invocation,
    Output, ReporterFactory, SuiteLoader,
};
use pretty_assertions::assert_eq;
use std::{cell::RefCell, fs, path::Path, rc::Rc};

fn write_specs(root: &Path) -> eyre::Result<()> {
    fs::create_dir_all(root.join("stack"))?;
    fs::write(root.join("stack/stack.spec.rs"), "")?;
    fs::write(root.join("queue.spec.rs"), "")?;
    fs::write(root.join("README.md"), "")?;
    Ok(())
}

fn definitions(log: Rc<RefCell<Vec<String>>>) -> Definitions {
    let mut defs = Definitions::new();
    let queue_log = log.clone();
    defs.add("queue.spec.rs", move |s| {
        let log = queue_log.clone();
        s.describe("Queue", move |s| {
            let each = log.clone();
            s.before_each(move || {
                each.borrow_mut().push("queue before_each".into());
                Ok(())
            });
            s.it("is fifo", || {
                check_eq!(vec![1, 2], [1, 2].to_vec());
                Ok(())
            });
            s.xit("is bounded", || Ok(()));
        });
    });
    let stack_log = log;
    defs.add("stack.spec.rs", move |s| {
        let log = stack_log.clone();
        s.describe("Stack", move |s| {
            let all = log.clone();
            s.after_all(move || {
                all.borrow_mut().push("stack after_all".into());
                Ok(())
            });
            s.it("pushes", || {
                check!(!vec![1].is_empty());
                Ok(())
            });
            s.it("pops", || {
                check_eq!(Some(2), vec![1].pop());
                Ok(())
            });
            s.it("peeks", || Err(eyre::eyre!("connection reset")));
        });
    });
    defs
}

#[test]
fn runs_discovered_specs_end_to_end() -> eyre::Result<()> {
    console::set_colors_enabled(false);
    let dir = tempfile::tempdir()?;
    write_specs(dir.path())?;
    let log = Rc::new(RefCell::new(Vec::new()));
    let bus = EventBus::new();
    let ends = Rc::new(RefCell::new(0usize));
    let counter = ends.clone();
    bus.subscribe(EventName::TestEnd, move |_| {
        *counter.borrow_mut() += 1;
        Ok(())
    });
    let config = Config {
        paths: vec![dir.path().to_path_buf()],
        reporter: "spec".into(),
        ..Default::default()
    };
    let command = Command::new(config, &bus, ReporterFactory::new())
        .with_loader(SuiteLoader::new(definitions(log.clone())));
    let output = Output::buffer();

    let status = command.run(&Invocation::default(), &output);

    assert_eq!(status, ExitStatus::Failure);
    let result = command.result().expect("run completed");
    assert_eq!(
        (result.passed, result.failed, result.errored, result.pending),
        (2, 1, 1, 1)
    );
    assert_eq!(*ends.borrow(), result.total());
    assert_eq!(
        *log.borrow(),
        vec!["queue before_each", "stack after_all"],
        "queue.spec.rs sorts before stack/stack.spec.rs"
    );

    let out = output.contents();
    let queue = out.find("Queue").expect("Queue listed");
    let stack = out.find("Stack").expect("Stack listed");
    assert!(queue < stack, "{out}");
    assert!(out.contains("2 passing"), "{out}");
    assert!(out.contains("1 failing"), "{out}");
    assert!(out.contains("1 errored"), "{out}");
    assert!(out.contains("1 pending"), "{out}");
    assert!(out.contains("Stack pops"), "{out}");
    assert!(out.contains("connection reset"), "{out}");
    Ok(())
}

#[test]
fn focus_and_skip_from_invocation() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    write_specs(dir.path())?;
    let config = Config {
        paths: vec![dir.path().to_path_buf()],
        reporter: "silent".into(),
        ..Default::default()
    };
    let command = Command::new(config, &EventBus::new(), ReporterFactory::new()).with_loader(
        SuiteLoader::new(definitions(Rc::new(RefCell::new(Vec::new())))),
    );
    let input = Invocation {
        focus: Some("^Stack".into()),
        skip: Some("peeks$".into()),
        ..Default::default()
    };

    let status = command.run(&input, &Output::buffer());

    assert_eq!(status, ExitStatus::Failure);
    let result = command.result().expect("run completed");
    assert_eq!(
        (result.passed, result.failed, result.errored, result.pending),
        (1, 1, 0, 3)
    );
    Ok(())
}

#[test]
fn invalid_focus_pattern_exits_two() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    write_specs(dir.path())?;
    let config = Config {
        paths: vec![dir.path().to_path_buf()],
        ..Default::default()
    };
    let command = Command::new(config, &EventBus::new(), ReporterFactory::new())
        .with_loader(SuiteLoader::new(Definitions::new()));
    let output = Output::buffer();
    let input = Invocation {
        focus: Some("(".into()),
        ..Default::default()
    };

    let status = command.run(&input, &output);

    assert_eq!(status, ExitStatus::Error);
    assert!(output.contents().contains("invalid pattern"));
    Ok(())
}
