// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Discovery of test cases with a dry run.

use std::path::Path;

use derive_more::{Deref, From, Into};

use crate::{
    event::{DecodeError, Envelope},
    navigator::Navigator,
    Cancellation,
};

use super::{
    config::RunConfiguration,
    execute::{execute, Execution, ExecutionObserver},
    process::{Env, ProcessRunner},
    Error,
};

/// Ordered, append-only sequence of [`Envelope`]s emitted by a single
/// runner invocation.
#[derive(Clone, Debug, Default, Deref, From, Into)]
pub struct EventLog(Vec<Envelope>);

impl EventLog {
    /// Creates a new empty [`EventLog`].
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Decodes an [`EventLog`] out of newline-delimited JSON records,
    /// skipping blank lines.
    ///
    /// # Errors
    ///
    /// If any line is not a valid record.
    pub fn from_ndjson(text: &str) -> Result<Self, DecodeError> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(Envelope::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Appends the given `envelope`.
    pub fn push(&mut self, envelope: Envelope) {
        self.0.push(envelope);
    }

    /// Returns a [`Navigator`] over the current state of this [`EventLog`].
    #[must_use]
    pub fn navigator(&self) -> Navigator<'_> {
        Navigator::new(&self.0)
    }
}

impl FromIterator<Envelope> for EventLog {
    fn from_iter<I: IntoIterator<Item = Envelope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of a dry run.
#[derive(Clone, Debug)]
pub enum Discovery {
    /// Dry run succeeded, emitting the given events.
    Found(EventLog),

    /// Dry run failed with the given error output.
    Failed(String),
}

#[derive(Debug, Default)]
struct DryRunObserver {
    log: EventLog,
    errors: Vec<String>,
}

impl ExecutionObserver for DryRunObserver {
    fn on_message(&mut self, envelope: Envelope) -> Result<(), Error> {
        self.log.push(envelope);
        Ok(())
    }

    fn on_output_line(&mut self, line: String) {
        tracing::trace!(%line, "dry run output");
    }

    fn on_error_line(&mut self, line: String) {
        tracing::error!(%line, "dry run error output");
        self.errors.push(line);
    }
}

/// Plans all the test cases of the given `config` with a dry run, without
/// executing any step.
///
/// Failures of the runner are reported as [`Discovery::Failed`].
///
/// # Errors
///
/// With [`Error::Cancelled`] only, if the `cancellation` is requested
/// meanwhile.
pub async fn discover_test_cases<P: ProcessRunner + ?Sized>(
    process: &P,
    cwd: &Path,
    config: RunConfiguration,
    env: Option<&Env>,
    cancellation: &Cancellation,
) -> Result<Discovery, Error> {
    let mut observer = DryRunObserver::default();
    let execution = Execution {
        cwd,
        config: config.with_dry_run(),
        env,
        node_options: None,
    };

    match execute(process, execution, &mut observer, cancellation).await {
        Ok(true) => {
            tracing::info!(
                events = observer.log.len(),
                "test cases discovered",
            );
            return Ok(Discovery::Found(observer.log));
        }
        Ok(false) => {}
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => {
            tracing::error!(error = %e, "dry run failed");
            observer.errors.push(e.to_string());
        }
    }
    Ok(Discovery::Failed(observer.errors.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::EventLog;

    #[test]
    fn decodes_ndjson_skipping_blank_lines() {
        let log = EventLog::from_ndjson(
            "{\"meta\":{}}\n\n{\"testRunStarted\":{}}\r\n",
        )
        .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.navigator().log().len(), 2);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(EventLog::from_ndjson("{\"meta\":{}}\nnot json\n").is_err());
    }
}
