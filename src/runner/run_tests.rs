// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution of tests, streaming their results.

use std::path::Path;

use lazy_regex::regex_captures;

use crate::{event::Envelope, navigator::Navigator, tree, Cancellation};

use super::{
    config::RunConfiguration,
    discovery::EventLog,
    execute::{execute, Execution, ExecutionObserver},
    process::{Env, ProcessRunner},
    Error,
};

/// Receiver of live run events.
pub trait RunListener {
    /// Receives the latest `envelope` along with a [`Navigator`] over all the
    /// events of the run so far (the `envelope` included).
    ///
    /// # Errors
    ///
    /// If the event log is malformed. Aborts the run.
    fn on_event(
        &mut self,
        nav: Navigator<'_>,
        envelope: &Envelope,
    ) -> Result<(), tree::Error>;

    /// Receives the address of a debugger the run can be attached to.
    fn on_debugger_listening(&mut self, url: &str);
}

/// Options of a test run.
#[derive(Clone, Debug)]
pub struct RunTestsOptions<'a> {
    /// Working directory of the runner.
    pub cwd: &'a Path,

    /// Environment overlay of the runner process.
    pub env: Option<&'a Env>,

    /// Feature files to run, relative to the `cwd`.
    pub paths: Option<Vec<String>>,

    /// Patterns of scenario names to run.
    pub names: Option<Vec<String>>,

    /// Whether to run with an inspector attached.
    pub debug: bool,
}

/// Outcome of a test run.
///
/// Failing tests are not a failure of the run: `success` is `false` only when
/// the runner itself failed (couldn't be spawned, exited unsuccessfully, was
/// cancelled).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunOutcome {
    /// Whether the runner process exited successfully, regardless of the
    /// test results.
    pub success: bool,

    /// Standard error lines, preceded by the failure reason, if any.
    pub errors: Vec<String>,

    /// Standard output lines which are not events.
    pub other_output: Vec<String>,
}

/// Extracts the debugger address out of a Node.js inspector `line`.
#[must_use]
pub fn debugger_url(line: &str) -> Option<&str> {
    regex_captures!(r"^Debugger listening on ws://(.+)$", line)
        .map(|(_, url)| url)
}

struct RunObserver<'l, L: ?Sized> {
    log: EventLog,
    listener: &'l mut L,
    debug: bool,
    errors: Vec<String>,
    other_output: Vec<String>,
}

impl<L: RunListener + ?Sized> ExecutionObserver for RunObserver<'_, L> {
    fn on_message(&mut self, envelope: Envelope) -> Result<(), Error> {
        self.log.push(envelope);
        if let Some(latest) = self.log.last() {
            self.listener
                .on_event(self.log.navigator(), latest)
                .map_err(Error::Projection)?;
        }
        Ok(())
    }

    fn on_output_line(&mut self, line: String) {
        self.other_output.push(line);
    }

    fn on_error_line(&mut self, line: String) {
        if self.debug {
            if let Some(url) = debugger_url(&line) {
                tracing::info!(%url, "debugger listening");
                self.listener.on_debugger_listening(url);
            }
        }
        self.errors.push(line);
    }
}

/// Runs the tests of the given `config`, restricted to the `options` filters,
/// feeding every event to the `listener` as soon as it's emitted.
pub async fn run_tests<P, L>(
    process: &P,
    config: RunConfiguration,
    options: RunTestsOptions<'_>,
    listener: &mut L,
    cancellation: &Cancellation,
) -> RunOutcome
where
    P: ProcessRunner + ?Sized,
    L: RunListener + ?Sized,
{
    let RunTestsOptions { cwd, env, paths, names, debug } = options;
    let is_debug = debug;
    tracing::info!(?paths, ?names, debug = is_debug, "running tests");

    let execution = Execution {
        cwd,
        config: config.with_sources(paths, names),
        env,
        node_options: debug.then(|| "--inspect=0".to_owned()),
    };
    let mut observer = RunObserver {
        log: EventLog::new(),
        listener,
        debug,
        errors: vec![],
        other_output: vec![],
    };

    let success = execute(process, execution, &mut observer, cancellation)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "test run failed");
            observer.errors.insert(0, e.to_string());
            false
        });
    RunOutcome {
        success,
        errors: observer.errors,
        other_output: observer.other_output,
    }
}

#[cfg(test)]
mod tests {
    use super::debugger_url;

    #[test]
    fn extracts_debugger_url() {
        assert_eq!(
            debugger_url(
                "Debugger listening on ws://127.0.0.1:9229/5d8f-4f7a",
            ),
            Some("127.0.0.1:9229/5d8f-4f7a"),
        );
        assert_eq!(debugger_url("Debugger listening on ws://"), None);
        assert_eq!(debugger_url("For help, see: https://nodejs.org"), None);
    }
}
