// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Projection of live run events onto [`TestRun`] callbacks.

pub mod diagnostics;

use crate::{
    event::{self, Envelope, Status},
    navigator::{
        Navigator, TestCaseFinished, TestCaseStarted, TestStepFinished,
        TestStepStarted,
    },
    run::TestRun,
    tree::{self, Synchronizer, TestTree},
};

#[doc(inline)]
pub use self::diagnostics::{Location, StackFrame, TestMessage};

/// Joins the given `text` pieces into run log lines.
///
/// Every piece may span several lines itself. Lines are terminated with
/// `\r\n`.
#[must_use]
pub fn lines<I, S>(text: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for piece in text {
        for line in piece.as_ref().split('\n') {
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push_str("\r\n");
        }
    }
    out
}

/// State machine folding live run events into [`TestRun`] callbacks and
/// [`TestTree`] items.
///
/// Events are expected one by one, in the order they were emitted, each one
/// along with a [`Navigator`] over the log recorded so far.
pub struct Projector<'a, T, R: ?Sized> {
    sync: &'a mut Synchronizer<T>,
    run: &'a mut R,
}

impl<'a, T, R> Projector<'a, T, R>
where
    T: TestTree,
    R: TestRun + ?Sized,
{
    /// Creates a new [`Projector`] mounting items with the given
    /// [`Synchronizer`] and reporting to the given [`TestRun`].
    #[must_use]
    pub fn new(sync: &'a mut Synchronizer<T>, run: &'a mut R) -> Self {
        Self { sync, run }
    }

    /// Handles the given `envelope` received during a run.
    ///
    /// Record kinds other than test case and test step lifecycle ones are
    /// ignored.
    ///
    /// # Errors
    ///
    /// If the event log is malformed.
    pub fn handle(
        &mut self,
        nav: Navigator<'_>,
        envelope: &Envelope,
    ) -> Result<(), tree::Error> {
        match envelope {
            Envelope::TestCaseStarted(raw) => {
                self.test_case_started(TestCaseStarted::new(nav, raw))
            }
            Envelope::TestStepStarted(raw) => {
                self.test_step_started(TestStepStarted::new(nav, raw))
            }
            Envelope::TestStepFinished(raw) => {
                self.test_step_finished(TestStepFinished::new(nav, raw));
                Ok(())
            }
            Envelope::TestCaseFinished(raw) => {
                self.test_case_finished(TestCaseFinished::new(nav, raw))
            }
            _ => Ok(()),
        }
    }

    /// Reports a debugger the run can be attached to.
    pub fn debugger_listening(&mut self, url: &str) {
        self.run.debugger_listening(url);
    }

    fn test_case_started(
        &mut self,
        started: TestCaseStarted<'_>,
    ) -> Result<(), tree::Error> {
        let test_case = started.test_case()?;
        let id = self.sync.ensure_test_case_in_tree(test_case)?;
        let pickle = test_case.pickle()?;

        self.run.append_output(&lines([
            format!("  {}", pickle.raw().uri),
            format!("    {}", pickle.raw().name),
        ]));
        if let Some(item) = self.sync.tree().get(&id) {
            self.run.started(&item);
        }
        Ok(())
    }

    fn test_step_started(
        &mut self,
        started: TestStepStarted<'_>,
    ) -> Result<(), tree::Error> {
        let test_step = started.test_step()?;
        let description = match (test_step.hook()?, test_step.pickle_step()?) {
            (Some(hook), _) => hook.name.clone().unwrap_or_else(|| {
                format!(
                    "Hook from {}",
                    hook.source_reference
                        .uri
                        .as_deref()
                        .unwrap_or("unknown source"),
                )
            }),
            (None, Some(step)) => step.raw().text.clone(),
            (None, None) => "Unknown".to_owned(),
        };

        self.run.append_output(&format!("      >> {description}"));
        Ok(())
    }

    fn test_step_finished(&mut self, finished: TestStepFinished<'_>) {
        let result = finished.test_step_result();

        self.run.append_output(&lines([format!(" {}", result.status)]));
        if result.status == Status::Failed {
            let message = result
                .exception
                .as_ref()
                .and_then(|e| e.message.as_deref())
                .or(result.message.as_deref());
            let stack = result
                .exception
                .as_ref()
                .and_then(|e| e.stack_trace.as_deref())
                .into_iter()
                .flat_map(str::lines);
            let details = message.into_iter().chain(stack).collect::<Vec<_>>();
            if !details.is_empty() {
                self.run.append_output(&lines(details));
            }
        }
    }

    fn test_case_finished(
        &mut self,
        finished: TestCaseFinished<'_>,
    ) -> Result<(), tree::Error> {
        let test_case = finished.test_case_started()?.test_case()?;
        let id = self.sync.ensure_test_case_in_tree(test_case)?;
        let Some(item) = self.sync.tree().get(&id) else {
            return Ok(());
        };

        let event::TestStepResult { status, .. } = test_case.worst_step_result();
        let duration = test_case.total_duration();
        tracing::debug!(
            item = %id,
            %status,
            duration = %humantime::format_duration(duration),
            will_be_retried = finished.raw().will_be_retried,
            "test case finished",
        );

        match status {
            Status::Passed => {
                self.run.passed(&item, duration);
                self.run.append_output(&lines(["", "    ✔️ PASSED"]));
            }
            Status::Failed => {
                let messages = diagnostics::test_messages(
                    test_case,
                    self.sync.base_path(),
                )?;
                self.run.failed(&item, messages, duration);
                self.run.append_output(&lines(["", "    X FAILED"]));
            }
            _ => self.run.skipped(&item),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::lines;

    #[test]
    fn lines_split_and_terminate() {
        assert_eq!(lines(["a", "b\nc"]), "a\r\nb\r\nc\r\n");
        assert_eq!(lines(["", "x"]), "\r\nx\r\n");
        assert_eq!(lines(["y\r\n"]), "y\r\n\r\n");
    }
}
