// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! In-process [`TestTree`] implementation.

use linked_hash_map::LinkedHashMap;

use super::{ItemId, TestItem, TestTree};

#[derive(Clone, Debug)]
struct Node {
    item: TestItem,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
    error: Option<String>,
    busy: bool,
}

/// [`TestTree`] kept in memory, preserving insertion order of items.
#[derive(Clone, Debug, Default)]
pub struct MemoryTree {
    nodes: LinkedHashMap<ItemId, Node>,
    root: Option<ItemId>,
}

impl MemoryTree {
    /// Creates a new empty [`MemoryTree`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the root item, if any.
    #[must_use]
    pub fn root(&self) -> Option<&TestItem> {
        self.root
            .as_ref()
            .and_then(|id| self.nodes.get(id))
            .map(|n| &n.item)
    }

    /// Returns the error shown on the item with the given `id`.
    #[must_use]
    pub fn error(&self, id: &ItemId) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.error.as_deref())
    }

    /// Indicates whether the item with the given `id` is marked busy.
    #[must_use]
    pub fn is_busy(&self, id: &ItemId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.busy)
    }

    /// Returns the total number of items, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Indicates whether there are no items at all, not even the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all the items in depth-first order, along with their depth
    /// (zero for the root).
    #[must_use]
    pub fn walk(&self) -> Vec<(usize, &TestItem)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = self.root.iter().map(|id| (0, id)).collect::<Vec<_>>();
        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            out.push((depth, &node.item));
            stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        }
        out
    }
}

impl TestTree for MemoryTree {
    fn get(&self, id: &ItemId) -> Option<TestItem> {
        self.nodes.get(id).map(|n| n.item.clone())
    }

    fn parent(&self, id: &ItemId) -> Option<ItemId> {
        self.nodes.get(id).and_then(|n| n.parent.clone())
    }

    fn children(&self, id: &ItemId) -> Vec<ItemId> {
        self.nodes.get(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn add_child(&mut self, parent: &ItemId, item: TestItem) {
        let Some(p) = self.nodes.get_mut(parent) else {
            return;
        };
        if p.children.contains(&item.id) {
            return;
        }
        p.children.push(item.id.clone());
        drop(self.nodes.insert(
            item.id.clone(),
            Node {
                item,
                parent: Some(parent.clone()),
                children: Vec::new(),
                error: None,
                busy: false,
            },
        ));
    }

    fn remove(&mut self, id: &ItemId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(parent) = node.parent.as_ref() {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| c != id);
            }
        }
        if self.root.as_ref() == Some(id) {
            self.root = None;
        }

        let mut orphans = node.children;
        while let Some(orphan) = orphans.pop() {
            if let Some(n) = self.nodes.remove(&orphan) {
                orphans.extend(n.children);
            }
        }
    }

    fn set_error(&mut self, id: &ItemId, error: Option<String>) {
        if let Some(n) = self.nodes.get_mut(id) {
            n.error = error;
        }
    }

    fn set_busy(&mut self, id: &ItemId, busy: bool) {
        if let Some(n) = self.nodes.get_mut(id) {
            n.busy = busy;
        }
    }

    fn replace_root(&mut self, item: TestItem) {
        self.nodes.clear();
        self.root = Some(item.id.clone());
        drop(self.nodes.insert(
            item.id.clone(),
            Node {
                item,
                parent: None,
                children: Vec::new(),
                error: None,
                busy: false,
            },
        ));
    }
}
