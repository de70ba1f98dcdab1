// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use std::{cell::RefCell, path::Path, time::Duration};

use cucumber_explorer::{
    run::{run_request, Target},
    runner::LoadOptions,
    writer::{Record, RunEvent},
    Cancellation, ConfigToken, Cucumber, EventLog, ItemId, MemoryTree,
    RunRequest, Synchronizer,
};

use self::common::{FakeProcess, Spawned, DISCOVERY};

const HELLO: &str = "features/greeting.feature/Say hello";
const BYE: &str = "features/greeting.feature/Say bye (politely)";
const WAVE: &str = "features/nested/farewell.feature/Wave";

fn discovered() -> RefCell<Synchronizer<MemoryTree>> {
    let log = EventLog::from_ndjson(DISCOVERY).unwrap();
    let mut sync = Synchronizer::new(MemoryTree::new(), "/ws");
    sync.recycle_root("ws");
    for test_case in log.navigator().all_test_cases() {
        _ = sync.ensure_test_case_in_tree(test_case).unwrap();
    }
    RefCell::new(sync)
}

async fn loaded(
    process: &FakeProcess,
) -> (Cucumber<FakeProcess>, ConfigToken) {
    let cucumber = Cucumber::with_process(process.clone());
    let token = cucumber
        .read_config(
            Path::new("/ws"),
            &LoadOptions::default(),
            None,
            &Cancellation::new(),
        )
        .await
        .unwrap();
    (cucumber, token)
}

async fn run(
    sync: &RefCell<Synchronizer<MemoryTree>>,
    (cucumber, token): &(Cucumber<FakeProcess>, ConfigToken),
    request: &RunRequest,
    debug: bool,
    cancellation: &Cancellation,
) -> Record {
    let target = Target { cwd: Path::new("/ws"), token: *token, env: None };
    let mut record = Record::new();
    run_request(
        sync,
        cucumber,
        target,
        request,
        debug,
        &mut record,
        cancellation,
    )
    .await;
    record
}

fn id(id: &str) -> ItemId {
    ItemId::new(id)
}

#[tokio::test]
async fn runs_the_whole_tree_in_one_batch() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    let sync = discovered();

    let record =
        run(&sync, &runner, &RunRequest::all(), false, &Cancellation::new())
            .await;

    assert_eq!(process.spawned(), [Spawned::LoadConfig, Spawned::Run]);
    let script = process.commands()[1].args[1].clone();
    assert!(script.contains(r#""names":[]"#), "{script}");
    assert!(script.contains(r#""stdout":"message""#), "{script}");

    assert_eq!(
        record.outcome(&id(HELLO)),
        Some(&RunEvent::Passed(id(HELLO), Duration::from_millis(6))),
    );
    let Some(RunEvent::Failed(_, messages, duration)) =
        record.outcome(&id(BYE))
    else {
        panic!("expected failure, got {:?}", record.outcome(&id(BYE)));
    };
    assert_eq!(*duration, Duration::from_millis(5));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "expected bye");
    let location = messages[0].location.as_ref().unwrap();
    assert_eq!(location.uri, Path::new("/ws/features/greeting.feature"));
    assert_eq!(location.range.start.line, 7);
    assert_eq!(messages[0].stack_trace.len(), 2);
    assert_eq!(
        record.outcome(&id(WAVE)),
        Some(&RunEvent::Skipped(id(WAVE))),
    );

    assert!(record.output().contains("Say hello"));
    assert!(record.output().contains("      >> reset world"));
    assert!(record.is_ended());
    assert_eq!(record.events().last(), Some(&RunEvent::Ended));
}

#[tokio::test]
async fn restricts_a_scenario_batch_by_its_name() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    let sync = discovered();

    let record = run(
        &sync,
        &runner,
        &RunRequest::of([id(BYE)]),
        false,
        &Cancellation::new(),
    )
    .await;

    let script = process.commands()[1].args[1].clone();
    assert!(
        script.contains(r#""names":["^Say bye \\(politely\\)$"]"#),
        "{script}",
    );
    assert!(
        script.contains(r#""paths":["features/greeting.feature"]"#),
        "{script}",
    );
    assert_eq!(
        record.events().first(),
        Some(&RunEvent::Enqueued(id(BYE))),
    );
    assert!(matches!(record.outcome(&id(BYE)), Some(RunEvent::Failed(..))));
}

#[tokio::test]
async fn excluded_subtrees_are_not_run() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    let sync = discovered();
    let request = RunRequest {
        include: Some(vec![
            id("features/greeting.feature"),
            id("features/nested"),
        ]),
        exclude: vec![id("features/nested")],
    };

    let record =
        run(&sync, &runner, &request, false, &Cancellation::new()).await;

    assert_eq!(process.spawned(), [Spawned::LoadConfig, Spawned::Run]);
    assert!(record
        .of(&id(WAVE))
        .all(|ev| !matches!(ev, RunEvent::Enqueued(_))));
    assert_eq!(
        record
            .events()
            .iter()
            .filter(|ev| matches!(ev, RunEvent::Enqueued(_)))
            .count(),
        3,
    );
}

#[tokio::test]
async fn failed_batch_errors_its_items() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    process.fail_run(true);
    let sync = discovered();

    let record = run(
        &sync,
        &runner,
        &RunRequest::of([id("features/greeting.feature")]),
        false,
        &Cancellation::new(),
    )
    .await;

    for item in ["features/greeting.feature", HELLO, BYE] {
        let Some(RunEvent::Errored(_, message, Some(_))) =
            record.outcome(&id(item))
        else {
            panic!("expected `{item}` errored: {:?}", record.events());
        };
        assert_eq!(message.message, "Error: cannot find module");
    }
    assert!(record.output().contains("X FAILED (error)"));
    assert!(record.is_ended());
}

#[tokio::test]
async fn released_token_errors_everything() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    let sync = discovered();
    let (cucumber, token) = &runner;
    cucumber.store().release(*token);

    let mut record = Record::new();
    run_request(
        &sync,
        cucumber,
        Target { cwd: Path::new("/ws"), token: *token, env: None },
        &RunRequest::of([id(HELLO)]),
        false,
        &mut record,
        &Cancellation::new(),
    )
    .await;

    assert_eq!(process.spawned(), [Spawned::LoadConfig]);
    assert!(matches!(
        record.outcome(&id(HELLO)),
        Some(RunEvent::Errored(_, _, None)),
    ));
    assert!(record.is_ended());
}

#[tokio::test]
async fn cancellation_kills_the_runner() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    process.hang_run(true);
    let sync = discovered();
    let cancellation = Cancellation::new();
    let request = RunRequest::all();

    let (record, ()) = futures::join!(
        run(&sync, &runner, &request, false, &cancellation),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancellation.cancel();
        },
    );

    assert_eq!(process.kills(), 1);
    assert!(matches!(
        record.outcome(&ItemId::root()),
        Some(RunEvent::Errored(..)),
    ));
    assert!(record.is_ended());
}

#[tokio::test]
async fn reports_debugger_address() {
    let process = FakeProcess::new();
    let runner = loaded(&process).await;
    process.push_stderr("Debugger listening on ws://127.0.0.1:9229/1f2e");
    let sync = discovered();

    let record =
        run(&sync, &runner, &RunRequest::all(), true, &Cancellation::new())
            .await;

    let command = &process.commands()[1];
    assert!(command.env["NODE_OPTIONS"].contains("--inspect=0"));
    assert!(record
        .events()
        .contains(&RunEvent::DebuggerListening("127.0.0.1:9229/1f2e".into())));
}
