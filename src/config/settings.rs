// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Raw settings of workspace roots.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use derive_more::Deref;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::runner::Env;

use super::Error;

/// Key the settings are stored under.
pub const SETTINGS_KEY: &str = "cucumberJsTestExplorer";

/// Settings shared by a workspace root and its virtual folders.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedConfig {
    /// Cucumber configuration file, relative to the project directory.
    #[serde(default)]
    pub config_file: Option<String>,

    /// Project directory, relative to the workspace root.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Environment variables of the runner.
    #[serde(default)]
    pub env: Option<Env>,

    /// Env files, relative to the project directory.
    #[serde(default)]
    pub env_files: Option<Vec<String>>,

    /// Cucumber profiles to use.
    #[serde(default)]
    pub profiles: Option<Vec<String>>,
}

/// Sub-project of a workspace root.
#[derive(Clone, Debug, Default, Deref, Deserialize, Eq, PartialEq)]
pub struct VirtualFolder {
    /// Name of the sub-project.
    pub name: String,

    #[deref]
    #[serde(flatten)]
    pub config: SharedConfig,
}

/// Settings of a workspace root.
#[derive(Clone, Debug, Default, Deref, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MainConfig {
    #[deref]
    #[serde(flatten)]
    pub config: SharedConfig,

    /// Sub-projects, each one getting its own configuration.
    #[serde(default)]
    pub virtual_folders: Option<Vec<VirtualFolder>>,
}

/// Merges the `main` settings of a workspace root into the ones of its
/// virtual `folder`.
///
/// Scalar fields of the `folder` win. Lists are concatenated, `main` ones
/// first. Env maps are merged, `folder` values winning.
#[must_use]
pub fn merge_into_virtual_folder(
    main: &SharedConfig,
    folder: &SharedConfig,
) -> SharedConfig {
    fn concat(
        a: Option<&Vec<String>>,
        b: Option<&Vec<String>>,
    ) -> Option<Vec<String>> {
        (a.is_some() || b.is_some())
            .then(|| a.into_iter().chain(b).flatten().cloned().collect())
    }

    SharedConfig {
        config_file: folder
            .config_file
            .clone()
            .or_else(|| main.config_file.clone()),
        cwd: folder.cwd.clone().or_else(|| main.cwd.clone()),
        env: (main.env.is_some() || folder.env.is_some()).then(|| {
            main.env
                .iter()
                .chain(&folder.env)
                .flatten()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }),
        env_files: concat(main.env_files.as_ref(), folder.env_files.as_ref()),
        profiles: concat(main.profiles.as_ref(), folder.profiles.as_ref()),
    }
}

/// Source of [`MainConfig`]s of workspace roots.
pub trait SettingsSource {
    /// Reads the settings of the given `workspace` root.
    ///
    /// # Errors
    ///
    /// If the settings cannot be read, or are malformed.
    fn read(&self, workspace: &Path) -> Result<MainConfig, Error>;

    /// Returns a glob (relative to a workspace root) of the files the
    /// settings are read from, if any.
    fn watched_glob(&self) -> Option<String> {
        None
    }
}

/// [`SettingsSource`] reading a JSON file relative to a workspace root, like
/// `.vscode/settings.json`.
///
/// Settings are looked up both as a [`SETTINGS_KEY`] object and as
/// `<SETTINGS_KEY>.<field>` keys, the latter winning. A missing file means
/// default settings.
#[derive(Clone, Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Default settings file, relative to a workspace root.
    pub const DEFAULT_PATH: &'static str = ".vscode/settings.json";

    /// Creates a new [`JsonFileSettings`] reading the given `path` relative
    /// to a workspace root.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Extracts [`MainConfig`] out of the given raw settings object.
    ///
    /// # Errors
    ///
    /// If the settings are malformed.
    pub fn parse(
        raw: &Map<String, Value>,
    ) -> Result<MainConfig, serde_json::Error> {
        let mut merged = match raw.get(SETTINGS_KEY) {
            Some(Value::Object(nested)) => nested.clone(),
            _ => Map::new(),
        };
        let prefix = format!("{SETTINGS_KEY}.");
        for (key, value) in raw {
            if let Some(field) = key.strip_prefix(&prefix) {
                drop(merged.insert(field.to_owned(), value.clone()));
            }
        }
        serde_json::from_value(Value::Object(merged))
    }
}

impl Default for JsonFileSettings {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

impl SettingsSource for JsonFileSettings {
    fn read(&self, workspace: &Path) -> Result<MainConfig, Error> {
        let path = workspace.join(&self.path);
        tracing::debug!(path = %path.display(), "reading settings");

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file");
                return Ok(MainConfig::default());
            }
            Err(e) => return Err(Error::Io { path, source: Arc::new(e) }),
        };
        let settings = serde_json::from_str::<Map<String, Value>>(&text)
            .and_then(|raw| Self::parse(&raw))
            .map_err(|e| Error::Settings {
                path: path.clone(),
                source: Arc::new(e),
            })?;
        tracing::info!(path = %path.display(), ?settings, "settings read");
        Ok(settings)
    }

    fn watched_glob(&self) -> Option<String> {
        Some(self.path.to_string_lossy().replace('\\', "/"))
    }
}

/// [`SettingsSource`] with fixed settings per workspace root.
#[derive(Clone, Debug, Default)]
pub struct StaticSettings {
    fallback: MainConfig,
    per_workspace: HashMap<PathBuf, MainConfig>,
}

impl StaticSettings {
    /// Creates new [`StaticSettings`] returning the given `settings` for any
    /// workspace root.
    #[must_use]
    pub fn new(settings: MainConfig) -> Self {
        Self { fallback: settings, per_workspace: HashMap::new() }
    }

    /// Overrides the settings of the given `workspace` root.
    #[must_use]
    pub fn with_workspace(
        mut self,
        workspace: impl Into<PathBuf>,
        settings: MainConfig,
    ) -> Self {
        drop(self.per_workspace.insert(workspace.into(), settings));
        self
    }
}

impl SettingsSource for StaticSettings {
    fn read(&self, workspace: &Path) -> Result<MainConfig, Error> {
        Ok(self
            .per_workspace
            .get(workspace)
            .unwrap_or(&self.fallback)
            .clone())
    }
}
