// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fake runner replaying recorded message streams.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    io,
    path::Path,
    rc::Rc,
};

use cucumber_explorer::{
    config::{FileEvent, FileWatch},
    pubsub::Subscription,
    runner::{Child, Command, Exit, ProcessRunner},
};
use futures::{future, stream, FutureExt as _, StreamExt as _};

pub const DISCOVERY: &str =
    include_str!("../fixtures/greeting/discovery.ndjson");
pub const RUN: &str = include_str!("../fixtures/greeting/run.ndjson");

/// Resolved configuration printed by the fake `loadConfiguration` call.
pub const CONFIG: &str = r#"{"useConfiguration":{},"runConfiguration":{
    "sources":{"paths":["features/**/*.feature"],"names":[]},
    "runtime":{"dryRun":false,"parallel":0},
    "formats":{"stdout":"progress"}}}"#;

/// Kind of a command spawned by the runner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Spawned {
    LoadConfig,
    DryRun,
    Run,
}

impl Spawned {
    pub fn of(command: &Command) -> Self {
        let script = command.args.last().map_or("", String::as_str);
        if script.contains("loadConfiguration") {
            Self::LoadConfig
        } else if script.contains(r#""dryRun":true"#) {
            Self::DryRun
        } else {
            Self::Run
        }
    }
}

#[derive(Debug, Default)]
struct State {
    commands: RefCell<Vec<Command>>,
    fail_config: Cell<bool>,
    fail_run: Cell<bool>,
    hang_run: Cell<bool>,
    stderr: RefCell<Vec<String>>,
    kills: Cell<usize>,
}

/// [`ProcessRunner`] answering with the recorded fixtures.
#[derive(Clone, Debug, Default)]
pub struct FakeProcess(Rc<State>);

impl FakeProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.0.commands.borrow().clone()
    }

    pub fn spawned(&self) -> Vec<Spawned> {
        self.0.commands.borrow().iter().map(Spawned::of).collect()
    }

    pub fn fail_config(&self, fail: bool) {
        self.0.fail_config.set(fail);
    }

    pub fn fail_run(&self, fail: bool) {
        self.0.fail_run.set(fail);
    }

    /// Makes test runs never finish on their own.
    pub fn hang_run(&self, hang: bool) {
        self.0.hang_run.set(hang);
    }

    pub fn push_stderr(&self, line: &str) {
        self.0.stderr.borrow_mut().push(line.to_owned());
    }

    pub fn kills(&self) -> usize {
        self.0.kills.get()
    }
}

/// Splits the given `text` into chunks not aligned with lines.
fn chunks(text: &str) -> Vec<io::Result<Vec<u8>>> {
    text.as_bytes().chunks(61).map(|c| Ok(c.to_vec())).collect()
}

impl ProcessRunner for FakeProcess {
    fn spawn(&self, command: Command) -> io::Result<Child> {
        let kind = Spawned::of(&command);
        self.0.commands.borrow_mut().push(command);

        let (stdout, code) = match kind {
            Spawned::LoadConfig if self.0.fail_config.get() => ("", 1),
            Spawned::LoadConfig => (CONFIG, 0),
            Spawned::DryRun => (DISCOVERY, 0),
            Spawned::Run if self.0.fail_run.get() => ("", 2),
            Spawned::Run => (RUN, 0),
        };
        let mut stderr = self.0.stderr.borrow().join("\n");
        if code != 0 && stderr.is_empty() {
            stderr = "Error: cannot find module\n".to_owned();
        }

        let stdout = if kind == Spawned::Run && self.0.hang_run.get() {
            stream::iter(chunks(stdout))
                .chain(stream::pending())
                .boxed_local()
        } else {
            stream::iter(chunks(stdout)).boxed_local()
        };
        let state = Rc::clone(&self.0);
        Ok(Child::new(
            stdout,
            stream::iter(chunks(&stderr)).boxed_local(),
            future::ready(Ok(Exit { code: Some(code) })).boxed_local(),
            move || state.kills.set(state.kills.get() + 1),
        ))
    }
}

/// [`FileWatch`] recording requested globs, and emitting events on demand.
#[derive(Default)]
pub struct ManualWatch {
    watchers: RefCell<Vec<(String, Rc<dyn Fn(FileEvent)>)>>,
}

impl ManualWatch {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn globs(&self) -> Vec<String> {
        self.watchers.borrow().iter().map(|(g, _)| g.clone()).collect()
    }

    /// Delivers the given `event` to every watcher of the given `glob`.
    pub fn emit(&self, glob: &str, event: FileEvent) {
        let callbacks = self
            .watchers
            .borrow()
            .iter()
            .filter(|(g, _)| g == glob)
            .map(|(_, cb)| Rc::clone(cb))
            .collect::<Vec<_>>();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl FileWatch for ManualWatch {
    fn watch(
        &self,
        _: &Path,
        glob: &str,
        on_event: Rc<dyn Fn(FileEvent)>,
    ) -> Result<Subscription, cucumber_explorer::config::Error> {
        self.watchers.borrow_mut().push((glob.to_owned(), on_event));
        Ok(Subscription::empty())
    }
}
