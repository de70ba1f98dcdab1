// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Resolution of runner configuration per project root or virtual folder.
//!
//! A [`ConfigPipeline`] reads raw settings of every workspace root and
//! publishes a [`ConfigInstance`] per project. Each [`ConfigInstance`]
//! resolves (and caches) the environment and the Cucumber configuration of
//! its project, resolving them again whenever the files they're read from
//! change.

pub mod environment;
pub mod instance;
pub mod pipeline;
pub mod settings;
pub mod watch;

use std::{io, path::PathBuf, sync::Arc};

use derive_more::{Display, Error, From};

use crate::runner;

#[doc(inline)]
pub use self::{
    environment::read_env,
    instance::{ConfigInstance, Resolution, Resolved},
    pipeline::ConfigPipeline,
    settings::{
        merge_into_virtual_folder, JsonFileSettings, MainConfig, SettingsSource,
        SharedConfig, StaticSettings, VirtualFolder, SETTINGS_KEY,
    },
    watch::{FileEvent, FileEventKind, FileWatch, NotifyWatch},
};

/// Error of resolving a configuration.
///
/// Resolution errors are cached and published to many subscribers, so this
/// type is cheaply [`Clone`].
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// File cannot be read.
    #[display("Failed to read \"{}\": {source}", path.display())]
    #[from(ignore)]
    Io {
        /// Path of the file.
        #[error(not(source))]
        path: PathBuf,

        /// Cause of the failure.
        source: Arc<io::Error>,
    },

    /// Env file is malformed.
    #[display("Malformed env file \"{}\": {source}", path.display())]
    #[from(ignore)]
    EnvFile {
        /// Path of the env file.
        #[error(not(source))]
        path: PathBuf,

        /// Cause of the failure.
        source: Arc<dotenvy::Error>,
    },

    /// Settings are malformed.
    #[display("Malformed settings \"{}\": {source}", path.display())]
    #[from(ignore)]
    Settings {
        /// Path of the settings file.
        #[error(not(source))]
        path: PathBuf,

        /// Cause of the failure.
        source: Arc<serde_json::Error>,
    },

    /// Files cannot be watched.
    #[display("Failed to watch files: {_0}")]
    #[from(ignore)]
    Watch(Arc<notify::Error>),

    /// Invalid glob pattern of watched files.
    #[display("Invalid glob pattern: {_0}")]
    Glob(globset::Error),

    /// Cucumber configuration cannot be loaded.
    #[display("{_0}")]
    Runner(runner::Error),

    /// Resolution was cancelled.
    #[display("Cancelled")]
    #[from(ignore)]
    Cancelled,
}

impl Error {
    /// Indicates whether this error means cancellation, rather than a real
    /// failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Runner(runner::Error::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use crate::runner;

    use super::Error;

    #[test]
    fn recognizes_cancellation() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Runner(runner::Error::Cancelled).is_cancelled());
        let invalid = Error::Runner(runner::Error::InvalidConfigToken);
        assert!(!invalid.is_cancelled());
    }

    #[test]
    fn runner_errors_display_transparently() {
        let err = Error::from(runner::Error::ConfigLoad {
            code: Some(1),
            stderr: "boom".into(),
        });

        assert_eq!(
            err.to_string(),
            "Failed to read cucumber config. Error code 1. boom",
        );
    }
}
