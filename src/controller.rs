// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lifecycle of a single project: discovery on every resolved
//! configuration, and runs.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use futures::{
    future::{LocalBoxFuture, Shared},
    FutureExt as _,
};

use crate::{
    config::{
        ConfigInstance, FileEvent, FileEventKind, FileWatch, Resolution,
    },
    projector::TestMessage,
    pubsub::{Replay, Subscription},
    run::{self, included_items, RunRequest, Target, TestRun},
    runner::{Cucumber, Discovery, ProcessRunner, TokioProcessRunner},
    tree::{ItemId, Synchronizer, TestTree},
    Cancellation,
};

/// Glob of the feature files watched after the first successful discovery.
pub const FEATURES_GLOB: &str = "**/*.feature";

type SharedDiscovery = Shared<LocalBoxFuture<'static, ()>>;

#[derive(Default)]
struct State {
    generation: u64,
    cancellation: Option<Cancellation>,
    current: Option<SharedDiscovery>,
    resolutions: Option<Subscription>,
    features: Option<Subscription>,
    disposed: bool,
}

struct Inner<T, P> {
    instance: ConfigInstance,
    sync: Rc<RefCell<Synchronizer<T>>>,
    cucumber: Rc<Cucumber<P>>,
    watch: Rc<dyn FileWatch>,
    state: RefCell<State>,
}

/// Binding of a [`ConfigInstance`] to a [`TestTree`].
///
/// Every published [`Resolution`] clears the tree and discovers the test
/// cases again (a newer discovery supersedes an in-flight one). Errors of
/// resolution or discovery are shown on the root item.
///
/// Discoveries are driven by local tasks, so a [`tokio::task::LocalSet`] is
/// required.
pub struct Controller<T, P = TokioProcessRunner>(Rc<Inner<T, P>>);

impl<T, P> Clone for Controller<T, P> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T, P> Controller<T, P>
where
    T: TestTree + 'static,
    P: ProcessRunner + 'static,
{
    /// Creates a new [`Controller`] mounting the test cases of the given
    /// `instance` into the given `tree`.
    ///
    /// The root item of the `tree` is recreated right away.
    pub fn new(
        instance: ConfigInstance,
        tree: T,
        cucumber: Rc<Cucumber<P>>,
        watch: Rc<dyn FileWatch>,
    ) -> Self {
        let base = instance.base_path().to_path_buf();
        let mut sync = Synchronizer::new(tree, &base);
        sync.recycle_root(base.file_name().map_or_else(
            || base.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        ));

        let this = Self(Rc::new(Inner {
            instance,
            sync: Rc::new(RefCell::new(sync)),
            cucumber,
            watch,
            state: RefCell::new(State::default()),
        }));

        let weak = Rc::downgrade(&this.0);
        let subscription = this.0.instance.subscribe(
            move |resolution| {
                if let Some(inner) = weak.upgrade() {
                    Inner::rediscover(&inner, resolution.clone());
                }
            },
            Replay::Immediately,
        );
        this.0.state.borrow_mut().resolutions = Some(subscription);
        this
    }

    /// Returns the [`ConfigInstance`] of this [`Controller`].
    #[must_use]
    pub fn instance(&self) -> &ConfigInstance {
        &self.0.instance
    }

    /// Returns the [`Synchronizer`] of the tree of this [`Controller`].
    #[must_use]
    pub fn sync(&self) -> &RefCell<Synchronizer<T>> {
        &self.0.sync
    }

    /// Resolves the configuration, unless it's resolved already.
    ///
    /// A fresh resolution triggers a discovery.
    pub async fn resolve(&self) -> Resolution {
        self.0.instance.cache_or_resolve().await
    }

    /// Resolves the configuration again, triggering a discovery.
    pub async fn refresh(&self, cancellation: Cancellation) -> Resolution {
        self.0.instance.refresh(cancellation).await
    }

    /// Waits until the latest discovery (if any) finishes.
    pub async fn discovered(&self) {
        loop {
            let Some(current) = self.0.state.borrow().current.clone() else {
                return;
            };
            current.clone().await;

            let latest = self.0.state.borrow().current.clone();
            if latest.map_or(true, |l| l.ptr_eq(&current)) {
                return;
            }
        }
    }

    /// Runs the items of the given `request` with the resolved
    /// configuration, reporting to the given `run`.
    ///
    /// If the configuration cannot be resolved, every included item is
    /// reported errored.
    pub async fn run<R: TestRun + ?Sized>(
        &self,
        request: &RunRequest,
        debug: bool,
        run: &mut R,
        cancellation: &Cancellation,
    ) {
        let resolved = match self.resolve().await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(instance = %self.0.instance.name(), "{e}");
                let message = TestMessage::new(e.to_string());
                let sync = self.0.sync.borrow();
                for id in included_items(sync.tree(), request) {
                    if let Some(item) = sync.tree().get(&id) {
                        run.enqueued(&item);
                        run.errored(&item, message.clone(), None);
                    }
                }
                run.end();
                return;
            }
        };

        let target = Target {
            cwd: self.0.instance.base_path(),
            token: resolved.token,
            env: resolved.env.as_ref(),
        };
        run::run_request(
            &self.0.sync,
            &self.0.cucumber,
            target,
            request,
            debug,
            run,
            cancellation,
        )
        .await;
    }

    /// Stops reacting to resolutions and feature file changes, cancelling
    /// the in-flight discovery. Calling it again does nothing.
    pub fn dispose(&self) {
        let (resolutions, features) = {
            let mut state = self.0.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            if let Some(c) = state.cancellation.take() {
                c.cancel();
            }
            state.current = None;
            (state.resolutions.take(), state.features.take())
        };
        drop(resolutions);
        drop(features);
    }
}

impl<T, P> Inner<T, P>
where
    T: TestTree + 'static,
    P: ProcessRunner + 'static,
{
    /// Starts a discovery with the given `resolution`, superseding the
    /// in-flight one.
    fn rediscover(this: &Rc<Self>, resolution: Resolution) {
        let (generation, cancellation) = {
            let mut state = this.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.generation += 1;
            let cancellation = Cancellation::new();
            if let Some(previous) =
                state.cancellation.replace(cancellation.clone())
            {
                previous.cancel();
            }
            (state.generation, cancellation)
        };

        let weak = Rc::downgrade(this);
        let discovery =
            Self::discover(weak, generation, resolution, cancellation)
                .boxed_local()
                .shared();
        this.state.borrow_mut().current = Some(discovery.clone());
        drop(tokio::task::spawn_local(discovery));
    }

    async fn discover(
        weak: Weak<Self>,
        generation: u64,
        resolution: Resolution,
        cancellation: Cancellation,
    ) {
        let Some(this) = weak.upgrade() else {
            return;
        };
        let root = ItemId::root();
        {
            let mut sync = this.sync.borrow_mut();
            sync.clear();
            sync.tree_mut().set_error(&root, None);
        }

        let resolved = match resolution {
            Ok(resolved) => resolved,
            Err(e) => {
                let mut sync = this.sync.borrow_mut();
                sync.tree_mut().set_error(&root, Some(e.to_string()));
                return;
            }
        };

        this.sync.borrow_mut().tree_mut().set_busy(&root, true);
        let name = this.instance.name().to_owned();
        tracing::info!(instance = %name, "discovering test cases");
        let result = this
            .cucumber
            .discover_test_cases(
                this.instance.base_path(),
                resolved.token,
                resolved.env.as_ref(),
                &cancellation,
            )
            .await;
        if this.state.borrow().generation != generation {
            tracing::debug!(instance = %name, "discovery superseded");
            return;
        }

        let mut sync = this.sync.borrow_mut();
        sync.tree_mut().set_busy(&root, false);
        match result {
            Err(e) if e.is_cancelled() => {
                tracing::debug!(instance = %name, "discovery cancelled");
            }
            Err(e) => sync.tree_mut().set_error(&root, Some(e.to_string())),
            Ok(Discovery::Failed(text)) => {
                tracing::warn!(instance = %name, "discovery failed");
                sync.tree_mut().set_error(&root, Some(text));
            }
            Ok(Discovery::Found(log)) => {
                let mut count = 0_usize;
                for test_case in log.navigator().all_test_cases() {
                    match sync.ensure_test_case_in_tree(test_case) {
                        Ok(_) => count += 1,
                        Err(e) => tracing::warn!(instance = %name, "{e}"),
                    }
                }
                tracing::info!(instance = %name, count, "discovered");
                drop(sync);
                Self::watch_features(&this);
            }
        }
    }

    /// Watches the feature files, unless watched already.
    fn watch_features(this: &Rc<Self>) {
        {
            let state = this.state.borrow();
            if state.disposed || state.features.is_some() {
                return;
            }
        }

        let weak = Rc::downgrade(this);
        let on_event = Rc::new(move |event: FileEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::debug!(
                kind = ?event.kind,
                path = %event.path.display(),
                "feature file changed",
            );
            match event.kind {
                FileEventKind::Deleted => {
                    _ = inner
                        .sync
                        .borrow_mut()
                        .remove_document_from_tree(&event.path);
                }
                FileEventKind::Created | FileEventKind::Changed => {
                    if let Some(resolution) = inner.instance.read() {
                        Self::rediscover(&inner, resolution);
                    }
                }
            }
        });
        let base = this.instance.base_path();
        match this.watch.watch(base, FEATURES_GLOB, on_event) {
            Ok(watcher) => this.state.borrow_mut().features = Some(watcher),
            Err(e) => tracing::warn!(instance = %this.instance.name(), "{e}"),
        }
    }
}

impl<T, P> fmt::Debug for Controller<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Controller")
            .field("instance", &self.0.instance)
            .field("generation", &state.generation)
            .field("watching_features", &state.features.is_some())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}
