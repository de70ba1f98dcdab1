// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running requested [`TestItem`]s in batches, one runner invocation per
//! batch.

use std::{
    cell::RefCell,
    collections::{HashSet, VecDeque},
    path::Path,
    time::{Duration, Instant},
};

use itertools::Itertools as _;

use crate::{
    event::Envelope,
    navigator::Navigator,
    projector::{lines, Projector, TestMessage},
    runner::{
        run_tests::run_tests, ConfigToken, Cucumber, Env, ProcessRunner,
        RunListener, RunTestsOptions,
    },
    tree::{self, ItemId, ItemMeta, Synchronizer, TestItem, TestTree},
    Cancellation,
};

/// Host-owned sink of a single test run.
///
/// Every [`TestItem`] is reported as enqueued first, then started, then
/// with exactly one terminal state.
pub trait TestRun {
    /// Reports the `item` as waiting to be run.
    fn enqueued(&mut self, item: &TestItem);

    /// Reports the `item` as running.
    fn started(&mut self, item: &TestItem);

    /// Reports the `item` as passed.
    fn passed(&mut self, item: &TestItem, duration: Duration);

    /// Reports the `item` as failed with the given diagnostic `messages`.
    fn failed(
        &mut self,
        item: &TestItem,
        messages: Vec<TestMessage>,
        duration: Duration,
    );

    /// Reports the `item` as skipped.
    fn skipped(&mut self, item: &TestItem);

    /// Reports the `item` as not run properly, because the runner itself
    /// failed.
    fn errored(
        &mut self,
        item: &TestItem,
        message: TestMessage,
        duration: Option<Duration>,
    );

    /// Appends the given `text` to the run log.
    fn append_output(&mut self, text: &str);

    /// Reports a debugger listening at the given `url`, so it can be
    /// attached to.
    fn debugger_listening(&mut self, url: &str) {
        _ = url;
    }

    /// Reports the run as finished.
    fn end(&mut self);
}

/// Request to run some [`TestItem`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunRequest {
    /// Items to run along with their descendants. [`None`] means the root.
    pub include: Option<Vec<ItemId>>,

    /// Items not to run, along with their descendants.
    pub exclude: Vec<ItemId>,
}

impl RunRequest {
    /// Creates a [`RunRequest`] of all the items.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a [`RunRequest`] of the given items only.
    #[must_use]
    pub fn of(include: impl IntoIterator<Item = ItemId>) -> Self {
        Self { include: Some(include.into_iter().collect()), exclude: vec![] }
    }

    /// Returns a label describing this [`RunRequest`] with the item labels
    /// of the given `tree`.
    #[must_use]
    pub fn label(&self, tree: &impl TestTree) -> String {
        self.include.as_ref().map_or_else(
            || "All".to_owned(),
            |ids| {
                ids.iter()
                    .filter_map(|id| tree.get(id))
                    .map(|item| item.label)
                    .join(", ")
            },
        )
    }
}

/// Returns the given `id` followed by all of its descendants in breadth-first
/// order, skipping the `exclude`d subtrees.
pub fn flatten(
    tree: &impl TestTree,
    id: &ItemId,
    exclude: &[ItemId],
) -> Vec<ItemId> {
    let mut out = vec![];
    let mut pending = VecDeque::from([id.clone()]);
    while let Some(next) = pending.pop_front() {
        if exclude.contains(&next) || tree.get(&next).is_none() {
            continue;
        }
        pending.extend(tree.children(&next));
        out.push(next);
    }
    out
}

/// Returns all the items included into the given `request`.
pub fn included_items(
    tree: &impl TestTree,
    request: &RunRequest,
) -> Vec<ItemId> {
    let roots = request
        .include
        .clone()
        .unwrap_or_else(|| vec![ItemId::root()]);
    roots
        .iter()
        .flat_map(|id| flatten(tree, id, &request.exclude))
        .collect()
}

/// Resolved configuration a run is performed with.
#[derive(Clone, Copy, Debug)]
pub struct Target<'a> {
    /// Working directory of the runner.
    pub cwd: &'a Path,

    /// Configuration of the runner.
    pub token: ConfigToken,

    /// Environment overlay of the runner process.
    pub env: Option<&'a Env>,
}

/// [`RunListener`] projecting events of a run onto a shared
/// [`Synchronizer`].
struct SharedProjector<'a, T, R: ?Sized> {
    sync: &'a RefCell<Synchronizer<T>>,
    run: &'a mut R,
}

impl<T, R> RunListener for SharedProjector<'_, T, R>
where
    T: TestTree,
    R: TestRun + ?Sized,
{
    fn on_event(
        &mut self,
        nav: Navigator<'_>,
        envelope: &Envelope,
    ) -> Result<(), tree::Error> {
        let mut sync = self.sync.borrow_mut();
        Projector::new(&mut sync, &mut *self.run).handle(nav, envelope)
    }

    fn on_debugger_listening(&mut self, url: &str) {
        let mut sync = self.sync.borrow_mut();
        Projector::new(&mut sync, &mut *self.run).debugger_listening(url);
    }
}

/// Runs all the items of the given `request`.
///
/// Items are run in batches: every not yet processed item having a URI is
/// run along with its descendants by a single runner invocation. A batch
/// which runner fails marks all of its items errored, and the rest of the
/// batches still run. [`TestRun::end()`] is always called, even when the
/// `cancellation` stops the run before the next batch.
pub async fn run_request<T, P, R>(
    sync: &RefCell<Synchronizer<T>>,
    cucumber: &Cucumber<P>,
    target: Target<'_>,
    request: &RunRequest,
    debug: bool,
    run: &mut R,
    cancellation: &Cancellation,
) where
    T: TestTree,
    P: ProcessRunner,
    R: TestRun + ?Sized,
{
    let queue = included_items(sync.borrow().tree(), request);
    for id in &queue {
        if let Some(item) = sync.borrow().tree().get(id) {
            run.enqueued(&item);
        }
    }
    let is_debug = debug;
    tracing::info!(
        items = queue.len(),
        label = %request.label(sync.borrow().tree()),
        debug = is_debug,
        "run started",
    );

    // Fixed for the whole run, even if the token is released meanwhile.
    let config = match cucumber.config_for_token(target.token) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            let message = TestMessage::new(e.to_string());
            for id in &queue {
                if let Some(item) = sync.borrow().tree().get(id) {
                    run.errored(&item, message.clone(), None);
                }
            }
            run.end();
            return;
        }
    };

    let mut done = HashSet::new();
    for id in queue {
        if cancellation.is_cancelled() {
            tracing::info!("run cancelled");
            break;
        }
        if done.contains(&id) {
            continue;
        }

        let (item, affected, options) = {
            let sync = sync.borrow();
            let Some(item) = sync.tree().get(&id) else {
                continue;
            };
            if item.uri.as_os_str().is_empty() {
                continue;
            }
            let affected = flatten(sync.tree(), &id, &request.exclude)
                .into_iter()
                .filter_map(|id| sync.tree().get(&id))
                .collect::<Vec<_>>();
            let options = batch_options(&sync, &item, target, debug);
            (item, affected, options)
        };

        for test in &affected {
            run.started(test);
        }
        run.append_output(&lines([
            format!(
                "Running {} item(s) from \"{}\"",
                affected.len(),
                item.uri.display(),
            ),
            String::new(),
        ]));

        let start = Instant::now();
        let mut listener = SharedProjector { sync, run: &mut *run };
        let outcome = run_tests(
            cucumber.process(),
            config.clone(),
            options,
            &mut listener,
            cancellation,
        )
        .await;

        if !outcome.success {
            tracing::warn!(
                item = %id,
                errors = ?outcome.errors,
                "batch failed",
            );
            run.append_output(&lines(
                ["", "X FAILED (error)", ""]
                    .into_iter()
                    .map(str::to_owned)
                    .chain(outcome.errors.iter().cloned()),
            ));
            let message = TestMessage::new(outcome.errors.join("\n"));
            let duration = start.elapsed();
            for test in &affected {
                run.errored(test, message.clone(), Some(duration));
            }
        }

        done.extend(affected.into_iter().map(|test| test.id));
    }

    run.end();
    tracing::info!("run ended");
}

/// Builds [`RunTestsOptions`] restricting a run to the given `item`.
fn batch_options<'a, T: TestTree>(
    sync: &Synchronizer<T>,
    item: &TestItem,
    target: Target<'a>,
    debug: bool,
) -> RunTestsOptions<'a> {
    let relative = item
        .uri
        .strip_prefix(target.cwd)
        .unwrap_or(&item.uri)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/");
    let names = match sync.metadata(&item.id) {
        Some(ItemMeta::TestCase { scenario_name, .. }) => {
            vec![format!("^{}$", regex::escape(scenario_name))]
        }
        Some(ItemMeta::Document { .. }) | None => vec![],
    };
    RunTestsOptions {
        cwd: target.cwd,
        env: target.env,
        paths: (!relative.is_empty()).then(|| vec![relative]),
        names: Some(names),
        debug,
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{ItemId, MemoryTree, TestItem, TestTree as _};

    use super::{included_items, RunRequest};

    fn tree() -> MemoryTree {
        let mut tree = MemoryTree::new();
        tree.replace_root(TestItem::new(ItemId::root(), "ws", "/ws"));
        for (parent, id) in [
            ("", "a"),
            ("a", "a/x.feature"),
            ("a/x.feature", "a/x.feature/One"),
            ("a/x.feature", "a/x.feature/Two"),
            ("", "y.feature"),
        ] {
            tree.add_child(&parent.into(), TestItem::new(id, id, "/ws"));
        }
        tree
    }

    fn ids(items: Vec<ItemId>) -> Vec<String> {
        items.into_iter().map(|id| id.as_str().to_owned()).collect()
    }

    #[test]
    fn includes_everything_by_default() {
        let items = included_items(&tree(), &RunRequest::all());

        assert_eq!(
            ids(items),
            [
                "",
                "a",
                "y.feature",
                "a/x.feature",
                "a/x.feature/One",
                "a/x.feature/Two",
            ],
        );
    }

    #[test]
    fn skips_excluded_subtrees() {
        let request = RunRequest {
            include: Some(vec!["a".into()]),
            exclude: vec!["a/x.feature/One".into()],
        };

        let items = included_items(&tree(), &request);

        assert_eq!(ids(items), ["a", "a/x.feature", "a/x.feature/Two"]);
    }

    #[test]
    fn labels_requests() {
        let tree = tree();

        assert_eq!(RunRequest::all().label(&tree), "All");
        assert_eq!(
            RunRequest::of(["a".into(), "y.feature".into()]).label(&tree),
            "a, y.feature",
        );
    }
}
