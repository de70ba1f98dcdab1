// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Facade of the external Cucumber runner.
//!
//! The runner is a Node.js process driven through the
//! `@cucumber/cucumber/api` module. Everything it emits on stdout is expected
//! to be [Cucumber messages][1], one JSON record per line.
//!
//! [1]: https://github.com/cucumber/messages

pub mod config;
pub mod discovery;
pub mod execute;
pub mod lines;
pub mod process;
pub mod run_tests;

use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;
use derive_more::{Display, Error};

use crate::{tree, Cancellation};

#[doc(inline)]
pub use self::{
    config::{ConfigStore, ConfigToken, LoadOptions, RunConfiguration},
    discovery::{Discovery, EventLog},
    execute::{Execution, ExecutionObserver},
    lines::{LineBuffer, Lines},
    process::{Child, Command, Env, Exit, ProcessRunner, TokioProcessRunner},
    run_tests::{RunListener, RunOutcome, RunTestsOptions},
};

/// Error of interacting with the external runner.
#[derive(Clone, Debug, Display, Error)]
pub enum Error {
    /// Runner process cannot be spawned.
    #[display("Failed to spawn runner: {_0}")]
    Spawn(Arc<io::Error>),

    /// Reading runner output failed.
    #[display("Failed to read runner output: {_0}")]
    Io(Arc<io::Error>),

    /// Loading configuration exited unsuccessfully.
    #[display(
        "Failed to read cucumber config. Error code {}. {stderr}",
        code.map_or_else(|| "unknown".to_owned(), |c| c.to_string()),
    )]
    ConfigLoad {
        /// Exit code of the process, if any.
        code: Option<i32>,

        /// Standard error of the process.
        stderr: String,
    },

    /// Loaded configuration is malformed.
    #[display("Malformed cucumber config: {_0}")]
    ConfigParse(Arc<serde_json::Error>),

    /// [`ConfigToken`] is unknown to the [`ConfigStore`] it was presented to.
    #[display("Invalid config token")]
    InvalidConfigToken,

    /// Operation was cancelled.
    #[display("Cancelled")]
    Cancelled,

    /// Events emitted by the runner cannot be projected.
    #[display("{_0}")]
    Projection(tree::Error),
}

impl Error {
    /// Indicates whether this is an [`Error::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Loader of run configurations, handing out [`ConfigToken`]s for them.
#[async_trait(?Send)]
pub trait ConfigLoader {
    /// Loads the configuration of the project in the given `cwd`.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be loaded, or the `cancellation` is
    /// requested meanwhile.
    async fn load(
        &self,
        cwd: &Path,
        options: &LoadOptions,
        env: Option<&Env>,
        cancellation: &Cancellation,
    ) -> Result<ConfigToken, Error>;

    /// Releases the given `token`, so it can't be used anymore.
    fn release(&self, token: ConfigToken);
}

/// External Cucumber runner.
#[derive(Clone, Debug, Default)]
pub struct Cucumber<P = TokioProcessRunner> {
    process: P,
    store: ConfigStore,
}

impl Cucumber {
    /// Creates a new [`Cucumber`] spawning real processes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_process(TokioProcessRunner)
    }
}

impl<P: ProcessRunner> Cucumber<P> {
    /// Creates a new [`Cucumber`] spawning processes with the given
    /// [`ProcessRunner`].
    #[must_use]
    pub fn with_process(process: P) -> Self {
        Self { process, store: ConfigStore::new() }
    }

    /// Returns the [`ProcessRunner`] of this [`Cucumber`].
    #[must_use]
    pub const fn process(&self) -> &P {
        &self.process
    }

    /// Returns the [`ConfigStore`] the [`ConfigToken`]s are issued by.
    #[must_use]
    pub const fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Loads the configuration of the project in the given `cwd`.
    ///
    /// # Errors
    ///
    /// See [`config::read_config()`].
    pub async fn read_config(
        &self,
        cwd: &Path,
        options: &LoadOptions,
        env: Option<&Env>,
        cancellation: &Cancellation,
    ) -> Result<ConfigToken, Error> {
        let config =
            config::read_config(&self.process, cwd, options, env, cancellation)
                .await?;
        Ok(self.store.insert(config))
    }

    /// Returns the [`RunConfiguration`] of the given `token`.
    ///
    /// # Errors
    ///
    /// If the `token` is invalid.
    pub fn config_for_token(
        &self,
        token: ConfigToken,
    ) -> Result<RunConfiguration, Error> {
        self.store.get(token)
    }

    /// Plans all the test cases of the configuration behind the given
    /// `token`.
    ///
    /// # Errors
    ///
    /// If the `token` is invalid, or the `cancellation` is requested
    /// meanwhile.
    pub async fn discover_test_cases(
        &self,
        cwd: &Path,
        token: ConfigToken,
        env: Option<&Env>,
        cancellation: &Cancellation,
    ) -> Result<Discovery, Error> {
        let config = self.store.get(token)?;
        discovery::discover_test_cases(
            &self.process,
            cwd,
            config,
            env,
            cancellation,
        )
        .await
    }

    /// Runs tests of the configuration behind the given `token`.
    ///
    /// # Errors
    ///
    /// If the `token` is invalid. Any other failure is reported in the
    /// [`RunOutcome`].
    pub async fn run_tests<L: RunListener + ?Sized>(
        &self,
        token: ConfigToken,
        options: RunTestsOptions<'_>,
        listener: &mut L,
        cancellation: &Cancellation,
    ) -> Result<RunOutcome, Error> {
        let config = self.store.get(token)?;
        Ok(run_tests::run_tests(
            &self.process,
            config,
            options,
            listener,
            cancellation,
        )
        .await)
    }
}

#[async_trait(?Send)]
impl<P: ProcessRunner> ConfigLoader for Cucumber<P> {
    async fn load(
        &self,
        cwd: &Path,
        options: &LoadOptions,
        env: Option<&Env>,
        cancellation: &Cancellation,
    ) -> Result<ConfigToken, Error> {
        self.read_config(cwd, options, env, cancellation).await
    }

    fn release(&self, token: ConfigToken) {
        self.store.release(token);
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn config_load_error_mentions_code_and_stderr() {
        let err = Error::ConfigLoad {
            code: Some(2),
            stderr: "Cannot find module".into(),
        };

        assert_eq!(
            err.to_string(),
            "Failed to read cucumber config. Error code 2. Cannot find module",
        );
    }
}
