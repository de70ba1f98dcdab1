// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Mounting discovered test cases into a [`TestTree`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use itertools::Itertools as _;

use crate::navigator::{Document, TestCase};

use super::{Error, ItemId, Range, TestItem, TestTree};

/// Domain entity a [`TestItem`] has been created for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemMeta {
    /// Item represents a `.feature` file.
    Document {
        /// URI of the document, relative to the base path.
        uri: String,
    },

    /// Item represents a scenario.
    TestCase {
        /// ID of the first [`TestCase`] mounted into the item.
        test_case_id: String,

        /// ID of the pickle executed by that [`TestCase`].
        pickle_id: String,

        /// Name of the scenario.
        scenario_name: String,

        /// URI of the containing document, relative to the base path.
        document_uri: String,
    },
}

/// Keeper of a [`TestTree`] mirroring discovered test cases.
///
/// Item IDs are derived from relative paths: `a`, `a/b` for directories,
/// `a/b/c.feature` for documents and `a/b/c.feature/<scenario name>` for
/// scenarios. Existing items are reused as is, so mounting the same entity
/// twice never duplicates anything.
///
/// Every item created here is tagged with an [`ItemMeta`] in a side table,
/// which entries are dropped along with their items.
#[derive(Debug)]
pub struct Synchronizer<T> {
    tree: T,
    base_path: PathBuf,
    metadata: HashMap<ItemId, ItemMeta>,
}

impl<T: TestTree> Synchronizer<T> {
    /// Creates a new [`Synchronizer`] of the given `tree`, with documents
    /// resolved relatively to the given `base_path`.
    #[must_use]
    pub fn new(tree: T, base_path: impl Into<PathBuf>) -> Self {
        Self { tree, base_path: base_path.into(), metadata: HashMap::new() }
    }

    /// Returns the synchronized [`TestTree`].
    #[must_use]
    pub const fn tree(&self) -> &T {
        &self.tree
    }

    /// Returns the synchronized [`TestTree`] for a direct mutation.
    ///
    /// Items removed this way keep their [`ItemMeta`] until the root is
    /// recycled.
    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    /// Returns the path documents are resolved relatively to.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the [`ItemMeta`] of the item with the given `id`.
    #[must_use]
    pub fn metadata(&self, id: &ItemId) -> Option<&ItemMeta> {
        self.metadata.get(id)
    }

    /// Recreates the root item with the given `label`, discarding everything
    /// else.
    pub fn recycle_root(&mut self, label: impl Into<String>) {
        self.metadata.clear();
        self.tree.replace_root(TestItem::new(
            ItemId::root(),
            label,
            self.base_path.clone(),
        ));
    }

    /// Removes all the children of the root item.
    pub fn clear(&mut self) {
        for child in self.tree.children(&ItemId::root()) {
            self.remove_subtree(&child);
        }
    }

    /// Returns the absolute path of the given `document`.
    ///
    /// # Errors
    ///
    /// If the `document` has no URI.
    pub fn uri_for_document(
        &self,
        document: Document<'_>,
    ) -> Result<PathBuf, Error> {
        document
            .uri()
            .map(|uri| self.base_path.join(uri))
            .ok_or(Error::MissingUri)
    }

    /// Ensures an item exists for the given `document`, along with items for
    /// each directory of its path.
    ///
    /// # Errors
    ///
    /// If the `document` has no URI, or the URI has no file name.
    pub fn ensure_document_in_tree(
        &mut self,
        document: Document<'_>,
    ) -> Result<ItemId, Error> {
        let uri = document.uri().ok_or(Error::MissingUri)?;
        let segments =
            uri.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        let Some((file_name, dirs)) =
            segments.split_last().filter(|_| !uri.ends_with('/'))
        else {
            return Err(Error::MissingFileName(uri.to_owned()));
        };

        let parent = self.ensure_path_in_tree(dirs);
        let id = ItemId::new(segments.join("/"));
        if self.tree.get(&id).is_none() {
            let mut item = TestItem::new(
                id.clone(),
                *file_name,
                self.base_path.join(uri),
            );
            if let Some(feature) = document.feature() {
                item.description = Some(feature.raw().name.clone());
                item.range = Some(Range::of_header(
                    feature.raw().location,
                    &feature.raw().keyword,
                    &feature.raw().name,
                ));
            }
            self.tree.add_child(&parent, item);
            let meta = ItemMeta::Document { uri: uri.to_owned() };
            drop(self.metadata.insert(id.clone(), meta));
            tracing::debug!(item = %id, "document mounted");
        }
        Ok(id)
    }

    /// Ensures an item exists for the scenario executed by the given
    /// `test_case`, along with items for its document and directories.
    ///
    /// # Errors
    ///
    /// If the pickle, document or scenario of the `test_case` can't be
    /// resolved, or the document can't be mounted.
    pub fn ensure_test_case_in_tree(
        &mut self,
        test_case: TestCase<'_>,
    ) -> Result<ItemId, Error> {
        let pickle = test_case.pickle()?;
        let document = pickle.document()?;
        let scenario = pickle.scenario()?;

        let parent = self.ensure_document_in_tree(document)?;
        let name = &scenario.raw().name;
        let id = ItemId::new(format!("{parent}/{name}"));
        if self.tree.get(&id).is_none() {
            let mut item = TestItem::new(
                id.clone(),
                name.clone(),
                self.uri_for_document(document)?,
            );
            item.range = Some(Range::of_header(
                scenario.raw().location,
                &scenario.raw().keyword,
                name,
            ));
            self.tree.add_child(&parent, item);
            drop(self.metadata.insert(
                id.clone(),
                ItemMeta::TestCase {
                    test_case_id: test_case.raw().id.clone(),
                    pickle_id: pickle.raw().id.clone(),
                    scenario_name: name.clone(),
                    document_uri: parent.to_string(),
                },
            ));
            tracing::debug!(item = %id, "scenario mounted");
        }
        Ok(id)
    }

    /// Removes the item of the document with the given `uri`, along with its
    /// ancestors left without children (the root excluded).
    ///
    /// The `uri` is either an absolute path under the base path, or a
    /// relative one.
    ///
    /// Returns whether anything has been removed.
    pub fn remove_document_from_tree(&mut self, uri: impl AsRef<Path>) -> bool {
        let uri = uri.as_ref();
        let relative = uri.strip_prefix(&self.base_path).unwrap_or(uri);
        let id = ItemId::new(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .join("/"),
        );
        if id.is_root() || self.tree.get(&id).is_none() {
            return false;
        }

        let mut current = id;
        loop {
            let parent = self.tree.parent(&current);
            self.remove_subtree(&current);
            tracing::debug!(item = %current, "item removed");

            let Some(p) = parent.filter(|p| {
                !p.is_root() && self.tree.children(p).is_empty()
            }) else {
                break;
            };
            current = p;
        }
        true
    }

    /// Consumes this [`Synchronizer`] returning the synchronized
    /// [`TestTree`].
    pub fn into_inner(self) -> T {
        self.tree
    }

    fn ensure_path_in_tree(&mut self, dirs: &[&str]) -> ItemId {
        let mut current = ItemId::root();
        let mut path = PathBuf::new();
        for (n, dir) in dirs.iter().enumerate() {
            path.push(dir);
            let id = ItemId::new(dirs[..=n].join("/"));
            if self.tree.get(&id).is_none() {
                let item = TestItem::new(
                    id.clone(),
                    *dir,
                    self.base_path.join(&path),
                );
                self.tree.add_child(&current, item);
            }
            current = id;
        }
        current
    }

    fn remove_subtree(&mut self, id: &ItemId) {
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            pending.extend(self.tree.children(&next));
            drop(self.metadata.remove(&next));
        }
        self.tree.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{ItemId, MemoryTree, TestItem, TestTree as _};

    use super::Synchronizer;

    fn synchronizer() -> Synchronizer<MemoryTree> {
        let mut sync = Synchronizer::new(MemoryTree::new(), "/ws");
        sync.recycle_root("ws");
        sync
    }

    fn mount(sync: &mut Synchronizer<MemoryTree>, path: &[&str]) {
        let mut parent = ItemId::root();
        for n in 0..path.len() {
            let id = ItemId::new(path[..=n].join("/"));
            sync.tree_mut()
                .add_child(&parent, TestItem::new(id.clone(), path[n], "/ws"));
            parent = id;
        }
    }

    #[test]
    fn removal_collapses_empty_ancestors_only() {
        let mut sync = synchronizer();
        mount(&mut sync, &["a", "b", "c.feature", "Scenario1"]);
        mount(&mut sync, &["a", "d.feature"]);

        assert!(sync.remove_document_from_tree("/ws/a/b/c.feature"));

        let tree = sync.tree();
        assert!(tree.get(&"a/b/c.feature".into()).is_none());
        assert!(tree.get(&"a/b".into()).is_none());
        assert_eq!(tree.children(&"a".into()), [ItemId::from("a/d.feature")]);
    }

    #[test]
    fn removal_never_removes_root() {
        let mut sync = synchronizer();
        mount(&mut sync, &["a", "b.feature"]);

        assert!(sync.remove_document_from_tree("a/b.feature"));

        assert!(sync.tree().get(&ItemId::root()).is_some());
        assert!(sync.tree().children(&ItemId::root()).is_empty());
        assert!(!sync.remove_document_from_tree("a/b.feature"));
    }
}
