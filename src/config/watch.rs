// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Watching files matching a glob pattern.

use std::{
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use futures::{channel::mpsc, StreamExt as _};
use globset::{GlobBuilder, GlobMatcher};
use notify::{EventKind, RecursiveMode, Watcher as _};

use crate::pubsub::Subscription;

use super::Error;

/// Kind of a [`FileEvent`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileEventKind {
    /// File has been created.
    Created,

    /// File has been changed.
    Changed,

    /// File has been deleted.
    Deleted,
}

/// Change of a watched file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEvent {
    /// Kind of the change.
    pub kind: FileEventKind,

    /// Path of the changed file.
    pub path: PathBuf,
}

/// Watcher of files.
pub trait FileWatch {
    /// Starts watching the files under the `base` directory which paths
    /// (relative to the `base`) match the given `glob`, calling `on_event`
    /// for every change, until the returned [`Subscription`] is disposed.
    ///
    /// # Errors
    ///
    /// If the `glob` is invalid, or the `base` cannot be watched.
    fn watch(
        &self,
        base: &Path,
        glob: &str,
        on_event: Rc<dyn Fn(FileEvent)>,
    ) -> Result<Subscription, Error>;
}

/// Compiles the given `glob`, so `*` doesn't cross directory boundaries.
///
/// # Errors
///
/// If the `glob` is invalid.
pub fn compile_glob(glob: &str) -> Result<GlobMatcher, Error> {
    Ok(GlobBuilder::new(glob)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// [`FileWatch`] backed by the native file system notifications.
///
/// Must be used inside a [`tokio::task::LocalSet`], as events are delivered
/// by a local task.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotifyWatch;

impl FileWatch for NotifyWatch {
    fn watch(
        &self,
        base: &Path,
        glob: &str,
        on_event: Rc<dyn Fn(FileEvent)>,
    ) -> Result<Subscription, Error> {
        let matcher = compile_glob(glob)?;

        let (tx, mut rx) = mpsc::unbounded();
        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                _ = tx.unbounded_send(res);
            },
        )
        .map_err(|e| Error::Watch(Arc::new(e)))?;
        watcher
            .watch(base, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(Arc::new(e)))?;
        tracing::debug!(base = %base.display(), glob, "watching files");

        let base = base.to_path_buf();
        let task = tokio::task::spawn_local(async move {
            while let Some(res) = rx.next().await {
                let event = match res {
                    Ok(ev) => ev,
                    Err(e) => {
                        tracing::warn!(base = %base.display(), "{e}");
                        continue;
                    }
                };
                let kind = match event.kind {
                    EventKind::Create(_) => FileEventKind::Created,
                    EventKind::Modify(_) => FileEventKind::Changed,
                    EventKind::Remove(_) => FileEventKind::Deleted,
                    EventKind::Access(_)
                    | EventKind::Any
                    | EventKind::Other => continue,
                };
                for path in event.paths {
                    let matches = path
                        .strip_prefix(&base)
                        .is_ok_and(|rel| matcher.is_match(rel));
                    if matches {
                        tracing::trace!(?kind, path = %path.display(), "file");
                        on_event(FileEvent { kind, path });
                    }
                }
            }
        });

        Ok(Subscription::new(move || {
            drop(watcher);
            task.abort();
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::compile_glob;

    #[test]
    fn glob_star_stays_within_directory() {
        let matcher = compile_glob("*.feature").unwrap();

        assert!(matcher.is_match(Path::new("a.feature")));
        assert!(!matcher.is_match(Path::new("dir/a.feature")));
    }

    #[test]
    fn glob_alternatives_and_recursion() {
        let config = compile_glob("{cucumber.js,cfg/.env}").unwrap();
        let features = compile_glob("**/*.feature").unwrap();

        assert!(config.is_match(Path::new("cucumber.js")));
        assert!(config.is_match(Path::new("cfg/.env")));
        assert!(!config.is_match(Path::new("cucumber.yaml")));
        assert!(features.is_match(Path::new("a/b/c.feature")));
        assert!(features.is_match(Path::new("c.feature")));
    }
}
