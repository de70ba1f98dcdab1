// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution of Cucumber with the `message` formatter.

use std::path::Path;

use either::Either;
use futures::{stream, StreamExt as _};
use itertools::Itertools as _;

use crate::{event::Envelope, Cancellation};

use super::{
    config::RunConfiguration,
    lines::Lines,
    process::{Command, Env, ProcessRunner},
    Error,
};

/// Receiver of everything an execution outputs.
pub trait ExecutionObserver {
    /// Receives a decoded event.
    ///
    /// # Errors
    ///
    /// Aborts the execution, killing the process.
    fn on_message(&mut self, envelope: Envelope) -> Result<(), Error>;

    /// Receives a line of standard output which is not an event.
    fn on_output_line(&mut self, line: String);

    /// Receives a line of standard error.
    fn on_error_line(&mut self, line: String);
}

/// Single execution of Cucumber.
#[derive(Clone, Debug)]
pub struct Execution<'a> {
    /// Working directory of the runner.
    pub cwd: &'a Path,

    /// Configuration to run with.
    pub config: RunConfiguration,

    /// Environment overlay of the runner process.
    pub env: Option<&'a Env>,

    /// Extra `NODE_OPTIONS`.
    pub node_options: Option<String>,
}

/// Composes `NODE_OPTIONS` out of the inherited `host` value, source maps
/// support and the given `extra` options.
#[must_use]
pub fn node_options(host: Option<&str>, extra: Option<&str>) -> String {
    [host, Some("--enable-source-maps"), extra]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .join(" ")
}

impl Execution<'_> {
    /// Builds the `node -e` [`Command`] of this [`Execution`].
    ///
    /// # Errors
    ///
    /// If the configuration cannot be serialized.
    pub fn command(&self) -> Result<Command, Error> {
        let config = serde_json::to_string(
            self.config.clone().with_message_output().raw(),
        )
        .map_err(|e| Error::ConfigParse(e.into()))?;
        let script =
            format!("require('@cucumber/cucumber/api').runCucumber({config});");

        let mut env = self.env.cloned().unwrap_or_default();
        let host = env
            .get("NODE_OPTIONS")
            .cloned()
            .or_else(|| std::env::var("NODE_OPTIONS").ok());
        drop(env.insert(
            "NODE_OPTIONS".into(),
            node_options(host.as_deref(), self.node_options.as_deref()),
        ));

        Ok(Command::new("node", self.cwd).arg("-e").arg(script).envs(env))
    }
}

/// Runs the given [`Execution`], feeding its output to the `observer`.
///
/// Returns whether the process exited successfully.
///
/// # Errors
///
/// - [`Error::Spawn`] if the process cannot be spawned;
/// - [`Error::Cancelled`] if the `cancellation` is requested meanwhile;
/// - whatever [`ExecutionObserver::on_message()`] fails with.
///
/// The process tree is killed in any of these cases.
pub async fn execute<P, O>(
    process: &P,
    execution: Execution<'_>,
    observer: &mut O,
    cancellation: &Cancellation,
) -> Result<bool, Error>
where
    P: ProcessRunner + ?Sized,
    O: ExecutionObserver + ?Sized,
{
    let command = execution.command()?;
    tracing::debug!(cwd = %execution.cwd.display(), "executing cucumber");

    let mut child =
        process.spawn(command).map_err(|e| Error::Spawn(e.into()))?;
    let (stdout, stderr) = child.take_output();
    let mut output = stream::select(
        Lines::new(stdout).map(Either::Left),
        Lines::new(stderr).map(Either::Right),
    );

    let streamed = loop {
        let next = tokio::select! {
            biased;
            () = cancellation.cancelled() => break Err(Error::Cancelled),
            next = output.next() => next,
        };
        match next {
            Some(Either::Left(Ok(line))) => {
                tracing::trace!(%line, "stdout");
                match Envelope::from_json(&line) {
                    Ok(envelope) => {
                        if let Err(e) = observer.on_message(envelope) {
                            break Err(e);
                        }
                    }
                    Err(_) => observer.on_output_line(line),
                }
            }
            Some(Either::Right(Ok(line))) => {
                tracing::trace!(%line, "stderr");
                observer.on_error_line(line);
            }
            Some(Either::Left(Err(e)) | Either::Right(Err(e))) => {
                break Err(Error::Io(e.into()));
            }
            None => break Ok(()),
        }
    };
    if let Err(e) = streamed {
        tracing::debug!(error = %e, "killing cucumber");
        child.kill();
        return Err(e);
    }

    let exit = tokio::select! {
        biased;
        () = cancellation.cancelled() => {
            child.kill();
            return Err(Error::Cancelled);
        }
        exit = &mut child.status => exit.map_err(|e| Error::Io(e.into()))?,
    };
    tracing::debug!(%exit, "cucumber exited");
    Ok(exit.success())
}
