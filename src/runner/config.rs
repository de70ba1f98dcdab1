// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Loading of resolved Cucumber run configurations.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::Path,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use derive_more::From;
use futures::{StreamExt as _, TryStreamExt as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::Cancellation;

use super::{
    process::{Command, Env, ProcessRunner},
    Error,
};

/// Opaque handle to a [`RunConfiguration`] kept in a [`ConfigStore`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ConfigToken {
    store: u64,
    id: u64,
}

/// Resolved Cucumber run configuration.
///
/// Passed back to the runner as is, apart from the few fields overridden
/// before each execution.
#[derive(Clone, Debug, Default, From, PartialEq)]
pub struct RunConfiguration(Map<String, Value>);

impl RunConfiguration {
    /// Wraps the given raw configuration object.
    #[must_use]
    pub const fn new(raw: Map<String, Value>) -> Self {
        Self(raw)
    }

    /// Returns the raw configuration object.
    #[must_use]
    pub const fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Forces the `message` formatter on stdout, disabling any other
    /// output.
    #[must_use]
    pub fn with_message_output(mut self) -> Self {
        drop(self.0.insert(
            "formats".into(),
            json!({
                "files": {},
                "publish": false,
                "options": {},
                "stdout": "message",
            }),
        ));
        self
    }

    /// Switches the runtime into dry run mode.
    #[must_use]
    pub fn with_dry_run(mut self) -> Self {
        self.update_section("runtime", |runtime| {
            drop(runtime.insert("dryRun".into(), true.into()));
        });
        self
    }

    /// Restricts sources to the given feature `paths` and scenario `names`
    /// patterns.
    #[must_use]
    pub fn with_sources(
        mut self,
        paths: Option<Vec<String>>,
        names: Option<Vec<String>>,
    ) -> Self {
        self.update_section("sources", |sources| {
            if let Some(paths) = paths {
                drop(sources.insert("paths".into(), paths.into()));
            }
            if let Some(names) = names {
                drop(sources.insert("names".into(), names.into()));
            }
        });
        self
    }

    fn update_section(
        &mut self,
        key: &str,
        update: impl FnOnce(&mut Map<String, Value>),
    ) {
        let mut section = match self.0.remove(key) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        update(&mut section);
        drop(self.0.insert(key.into(), Value::Object(section)));
    }
}

/// Storage of loaded [`RunConfiguration`]s, handing out [`ConfigToken`]s for
/// them.
///
/// Tokens are bound to the store issued them: presenting a token to another
/// store, or a released one, fails with [`Error::InvalidConfigToken`].
#[derive(Clone, Debug)]
pub struct ConfigStore {
    id: u64,
    next: Rc<Cell<u64>>,
    configs: Rc<RefCell<HashMap<u64, RunConfiguration>>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

        Self {
            id: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
            next: Rc::default(),
            configs: Rc::default(),
        }
    }
}

impl ConfigStore {
    /// Creates a new empty [`ConfigStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the given `config`, returning a [`ConfigToken`] for it.
    pub fn insert(&self, config: RunConfiguration) -> ConfigToken {
        let id = self.next.get();
        self.next.set(id + 1);
        drop(self.configs.borrow_mut().insert(id, config));
        ConfigToken { store: self.id, id }
    }

    /// Returns the [`RunConfiguration`] of the given `token`.
    ///
    /// # Errors
    ///
    /// If the `token` wasn't issued by this store or has been released.
    pub fn get(&self, token: ConfigToken) -> Result<RunConfiguration, Error> {
        if token.store != self.id {
            return Err(Error::InvalidConfigToken);
        }
        self.configs
            .borrow()
            .get(&token.id)
            .cloned()
            .ok_or(Error::InvalidConfigToken)
    }

    /// Releases the given `token`, so it can't be used anymore.
    pub fn release(&self, token: ConfigToken) {
        if token.store == self.id {
            drop(self.configs.borrow_mut().remove(&token.id));
        }
    }

    /// Returns the number of currently stored configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.borrow().len()
    }

    /// Indicates whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.borrow().is_empty()
    }
}

/// Output of the `loadConfiguration` API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedConfiguration {
    run_configuration: Map<String, Value>,
}

/// Options of loading a [`RunConfiguration`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LoadOptions {
    /// Path to the configuration file, relative to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Profiles to apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<String>>,
}

/// Builds the `node -e` [`Command`] loading a configuration with the given
/// `options`.
///
/// # Errors
///
/// If the `options` cannot be serialized.
pub fn load_command(
    cwd: &Path,
    options: &LoadOptions,
    env: Option<&Env>,
) -> Result<Command, Error> {
    let options = serde_json::to_string(options)
        .map_err(|e| Error::ConfigParse(e.into()))?;
    let script = format!(
        "require(\"@cucumber/cucumber/api\")\
         .loadConfiguration({options})\
         .then(config => console.log(JSON.stringify(config)))",
    );
    Ok(Command::new("node", cwd)
        .arg("-e")
        .arg(script)
        .envs(env.cloned().unwrap_or_default()))
}

/// Loads a resolved [`RunConfiguration`] by running the `loadConfiguration`
/// API of Cucumber in the given `cwd`.
///
/// # Errors
///
/// - [`Error::Spawn`] if the process cannot be spawned;
/// - [`Error::ConfigLoad`] if it exits unsuccessfully;
/// - [`Error::ConfigParse`] if its output is not a resolved configuration;
/// - [`Error::Cancelled`] if the `cancellation` is requested meanwhile.
pub async fn read_config<P: ProcessRunner + ?Sized>(
    process: &P,
    cwd: &Path,
    options: &LoadOptions,
    env: Option<&Env>,
    cancellation: &Cancellation,
) -> Result<RunConfiguration, Error> {
    tracing::debug!(cwd = %cwd.display(), ?options, "reading cucumber configuration");

    let command = load_command(cwd, options, env)?;
    let mut child = process.spawn(command).map_err(|e| Error::Spawn(e.into()))?;

    let stdout = child.stdout.by_ref().try_concat();
    let stderr = child
        .stderr
        .by_ref()
        .filter_map(|chunk| async move { chunk.ok() })
        .concat();
    let output = async {
        let (stdout, stderr) = futures::join!(stdout, stderr);
        Ok::<_, Error>((stdout.map_err(|e| Error::Io(e.into()))?, stderr))
    };

    let (stdout, stderr) = tokio::select! {
        biased;
        () = cancellation.cancelled() => {
            child.kill();
            return Err(Error::Cancelled);
        }
        output = output => output?,
    };
    let exit = tokio::select! {
        biased;
        () = cancellation.cancelled() => {
            child.kill();
            return Err(Error::Cancelled);
        }
        exit = &mut child.status => exit.map_err(|e| Error::Io(e.into()))?,
    };

    if !exit.success() {
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        tracing::error!(%exit, %stderr, "failed to read cucumber config");
        return Err(Error::ConfigLoad { code: exit.code, stderr });
    }

    let resolved = serde_json::from_slice::<ResolvedConfiguration>(&stdout)
        .map_err(|e| Error::ConfigParse(e.into()))?;
    tracing::info!(cwd = %cwd.display(), "cucumber configuration read");
    Ok(RunConfiguration::new(resolved.run_configuration))
}
