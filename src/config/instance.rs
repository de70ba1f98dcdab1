// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Resolution state machine of a single project configuration.

use std::{
    cell::RefCell,
    fmt,
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use futures::{
    future::{LocalBoxFuture, Shared},
    FutureExt as _,
};
use itertools::Itertools as _;

use crate::{
    pubsub::{Publisher, Replay, Subscription},
    runner::{ConfigLoader, ConfigToken, Env, LoadOptions},
    Cancellation,
};

use super::{environment::read_env, Error, FileWatch, SharedConfig};

/// Configuration files of Cucumber looked up by default.
const DEFAULT_CONFIG_FILES: [&str; 6] = [
    "cucumber.json",
    "cucumber.yaml",
    "cucumber.yml",
    "cucumber.js",
    "cucumber.cjs",
    "cucumber.mjs",
];

/// Successfully resolved configuration.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// Environment overlay of the runner.
    pub env: Option<Env>,

    /// Cucumber profiles in use.
    pub profiles: Option<Vec<String>>,

    /// Token of the loaded run configuration.
    pub token: ConfigToken,
}

/// Outcome of a resolution.
pub type Resolution = Result<Resolved, Error>;

type SharedResolution = Shared<LocalBoxFuture<'static, Resolution>>;

#[derive(Default)]
struct State {
    generation: u64,
    current: Option<SharedResolution>,
    watched_glob: Option<String>,
    watcher: Option<Subscription>,
    token: Option<ConfigToken>,
    disposed: bool,
}

struct Inner {
    name: String,
    base_path: PathBuf,
    config: SharedConfig,
    loader: Rc<dyn ConfigLoader>,
    watch: Rc<dyn FileWatch>,
    results: Publisher<Resolution>,
    state: RefCell<State>,
}

/// Lazily resolved configuration of a single project.
///
/// Resolution reads the env files, then loads the Cucumber configuration.
/// At most one resolution is in flight: [`ConfigInstance::cache_or_resolve()`]
/// joins it (or returns the cached outcome), while
/// [`ConfigInstance::refresh()`] starts a new one superseding it. Every
/// completed, not superseded and not cancelled, resolution is published to
/// the subscribers.
///
/// Once resolved, the configuration files are watched, and any change of
/// them refreshes the instance. This requires a [`tokio::task::LocalSet`].
///
/// Clones refer to the same instance.
#[derive(Clone)]
pub struct ConfigInstance(Rc<Inner>);

impl ConfigInstance {
    /// Creates a new unresolved [`ConfigInstance`] of the project described
    /// by the given `config`, relative to the `workspace` root.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        workspace: &Path,
        config: SharedConfig,
        loader: Rc<dyn ConfigLoader>,
        watch: Rc<dyn FileWatch>,
    ) -> Self {
        let base_path = config
            .cwd
            .as_deref()
            .map_or_else(|| workspace.to_path_buf(), |cwd| workspace.join(cwd));
        Self(Rc::new(Inner {
            name: name.into(),
            base_path,
            config,
            loader,
            watch,
            results: Publisher::new(),
            state: RefCell::new(State::default()),
        }))
    }

    /// Returns the name of this [`ConfigInstance`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the project directory of this [`ConfigInstance`].
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.0.base_path
    }

    /// Returns the settings this [`ConfigInstance`] resolves.
    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.0.config
    }

    /// Returns the last published [`Resolution`], if any.
    #[must_use]
    pub fn read(&self) -> Option<Resolution> {
        self.0.results.read()
    }

    /// Subscribes to the published [`Resolution`]s.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Resolution) + 'static,
        replay: Replay,
    ) -> Subscription {
        self.0.results.subscribe(callback, replay)
    }

    /// Indicates whether this [`ConfigInstance`] has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.0.state.borrow().disposed
    }

    /// Returns the in-flight or the cached [`Resolution`], starting a new one
    /// only if there is neither.
    ///
    /// Cached errors are returned too, until the next
    /// [`ConfigInstance::refresh()`].
    pub async fn cache_or_resolve(&self) -> Resolution {
        let current = self.0.state.borrow().current.clone();
        match current {
            Some(current) => current.await,
            None => self.start(Cancellation::new()).await,
        }
    }

    /// Starts a new resolution, superseding the in-flight one (if any).
    ///
    /// Resolves into [`Error::Cancelled`] if the `cancellation` is requested
    /// meanwhile, or this resolution gets superseded.
    pub async fn refresh(&self, cancellation: Cancellation) -> Resolution {
        self.start(cancellation).await
    }

    /// Disposes this [`ConfigInstance`], releasing its watcher, subscribers
    /// and configuration token. Calling it again does nothing.
    pub fn dispose(&self) {
        let (watcher, token) = {
            let mut state = self.0.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.current = None;
            state.watched_glob = None;
            (state.watcher.take(), state.token.take())
        };
        drop(watcher);
        if let Some(token) = token {
            self.0.loader.release(token);
        }
        self.0.results.clear_subscribers();
        tracing::debug!(name = %self.0.name, "config instance disposed");
    }

    fn start(&self, cancellation: Cancellation) -> SharedResolution {
        let generation = {
            let mut state = self.0.state.borrow_mut();
            state.generation += 1;
            state.generation
        };

        let weak = Rc::downgrade(&self.0);
        let loader = Rc::clone(&self.0.loader);
        let base = self.0.base_path.clone();
        let config = self.0.config.clone();
        let name = self.0.name.clone();
        let resolution = async move {
            tracing::debug!(%name, generation, "resolving config");
            let result = resolve(&*loader, &base, &config, &cancellation).await;
            match weak.upgrade() {
                Some(inner) => Inner::complete(&inner, generation, result),
                None => {
                    if let Ok(resolved) = &result {
                        loader.release(resolved.token);
                    }
                    Err(Error::Cancelled)
                }
            }
        }
        .boxed_local()
        .shared();

        self.0.state.borrow_mut().current = Some(resolution.clone());
        resolution
    }
}

impl Inner {
    /// Settles the `result` of the resolution of the given `generation`.
    fn complete(
        this: &Rc<Self>,
        generation: u64,
        result: Resolution,
    ) -> Resolution {
        let released = {
            let mut state = this.state.borrow_mut();
            if state.disposed || state.generation != generation {
                tracing::debug!(name = %this.name, generation, "superseded");
                if let Ok(resolved) = &result {
                    this.loader.release(resolved.token);
                }
                return Err(Error::Cancelled);
            }
            match &result {
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(name = %this.name, "resolution cancelled");
                    state.current = None;
                    return result;
                }
                Ok(resolved) => state.token.replace(resolved.token),
                Err(_) => None,
            }
        };
        if let Some(token) = released {
            this.loader.release(token);
        }

        match &result {
            Ok(_) => tracing::info!(name = %this.name, "config resolved"),
            Err(e) => tracing::warn!(name = %this.name, "{e}"),
        }
        this.results.next(result.clone());
        Self::rewatch(this);
        result
    }

    /// Returns the glob of the files the configuration is read from.
    fn watched_glob(&self) -> String {
        let files = self
            .config
            .config_file
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_CONFIG_FILES)
            .chain(self.config.env_files.iter().flatten().map(String::as_str))
            .map(|f| globset::escape(&f.replace('\\', "/")))
            .join(",");
        format!("{{{files}}}")
    }

    /// Watches the configuration files, replacing the previous watcher if
    /// they've changed.
    fn rewatch(this: &Rc<Self>) {
        let glob = this.watched_glob();
        let old = {
            let mut state = this.state.borrow_mut();
            if state.disposed || state.watched_glob.as_ref() == Some(&glob) {
                return;
            }
            state.watched_glob = Some(glob.clone());
            state.watcher.take()
        };
        drop(old);

        let weak = Rc::downgrade(this);
        let on_event = Rc::new(move |event: super::FileEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::info!(
                name = %inner.name,
                path = %event.path.display(),
                "config file changed",
            );
            let instance = ConfigInstance(inner);
            drop(tokio::task::spawn_local(async move {
                _ = instance.refresh(Cancellation::new()).await;
            }));
        });
        match this.watch.watch(&this.base_path, &glob, on_event) {
            Ok(watcher) => this.state.borrow_mut().watcher = Some(watcher),
            Err(e) => tracing::warn!(name = %this.name, "{e}"),
        }
    }
}

/// Reads the environment, then loads the configuration with it.
async fn resolve(
    loader: &dyn ConfigLoader,
    base: &Path,
    config: &SharedConfig,
    cancellation: &Cancellation,
) -> Resolution {
    let env = read_env(
        config.env.as_ref(),
        base,
        config.env_files.as_deref(),
        cancellation,
    )
    .await?;
    let options = LoadOptions {
        file: config.config_file.clone(),
        profiles: config.profiles.clone(),
    };
    let token = loader
        .load(base, &options, env.as_ref(), cancellation)
        .await?;
    if cancellation.is_cancelled() {
        loader.release(token);
        return Err(Error::Cancelled);
    }
    Ok(Resolved { env, profiles: config.profiles.clone(), token })
}

impl fmt::Debug for ConfigInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("ConfigInstance")
            .field("name", &self.0.name)
            .field("base_path", &self.0.base_path)
            .field("generation", &state.generation)
            .field("resolving", &state.current.is_some())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ConfigInstance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ConfigInstance {}

/// Weak reference to a [`ConfigInstance`].
#[derive(Clone, Debug)]
pub struct WeakConfigInstance(Weak<Inner>);

impl ConfigInstance {
    /// Returns a [`WeakConfigInstance`] not keeping this one alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakConfigInstance {
        WeakConfigInstance(Rc::downgrade(&self.0))
    }
}

impl WeakConfigInstance {
    /// Returns the [`ConfigInstance`], if it's still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ConfigInstance> {
        self.0.upgrade().map(ConfigInstance)
    }
}
