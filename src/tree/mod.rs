// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Hierarchical tree of test items, and keeping it in sync with discovered
//! test cases.
//!
//! The tree itself belongs to a host and is only reached through the
//! [`TestTree`] trait. [`MemoryTree`] is an in-process implementation of it.

mod memory;
mod sync;

use std::path::PathBuf;

use derive_more::{Display, Error, From};

use crate::{event::Location, navigator};

#[doc(inline)]
pub use self::{
    memory::MemoryTree,
    sync::{ItemMeta, Synchronizer},
};

/// Identifier of a [`TestItem`].
///
/// Derived deterministically from the entity the item represents, so
/// repeated discovery resolves to the same item.
#[derive(
    Clone, Debug, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd,
)]
pub struct ItemId(String);

impl ItemId {
    /// [`ItemId`] of the root item.
    ///
    /// Empty, so it never clashes with the relative path of a discovered
    /// directory or document.
    pub const ROOT: &'static str = "";

    /// Creates a new [`ItemId`] out of the given string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the [`ItemId`] of the root item.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Self::ROOT)
    }

    /// Indicates whether this is the [`ItemId`] of the root item.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Returns this [`ItemId`] as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Zero-based position in a text document.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Position {
    /// Zero-based line.
    pub line: u32,

    /// Zero-based character offset within the [`Position::line`].
    pub character: u32,
}

/// Range between two [`Position`]s in a text document.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Range {
    /// Inclusive start.
    pub start: Position,

    /// Exclusive end.
    pub end: Position,
}

impl Range {
    /// Creates a [`Range`] on a single line.
    #[must_use]
    pub const fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self {
            start: Position { line, character: start },
            end: Position { line, character: end },
        }
    }

    /// Creates a [`Range`] spanning a header line `<keyword>: <name>` (or a
    /// step line `<keyword><text>`) at the given [`Location`].
    ///
    /// A missing column is treated as the first one.
    #[must_use]
    pub fn of_header(location: Location, keyword: &str, name: &str) -> Self {
        let line = location.line.saturating_sub(1);
        let column = location.column.unwrap_or(1);
        let width =
            u32::try_from(keyword.chars().count() + name.chars().count())
                .unwrap_or(u32::MAX);
        Self::on_line(
            line,
            column.saturating_sub(1),
            column.saturating_add(width).saturating_add(1),
        )
    }
}

/// Item of a [`TestTree`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestItem {
    /// Unique ID of this item within its tree.
    pub id: ItemId,

    /// Human-readable name of this item.
    pub label: String,

    /// Absolute path of the file (or directory) this item represents.
    pub uri: PathBuf,

    /// Range of the header line in the [`TestItem::uri`] file.
    pub range: Option<Range>,

    /// Secondary text shown next to the [`TestItem::label`].
    pub description: Option<String>,
}

impl TestItem {
    /// Creates a new [`TestItem`] without a range and a description.
    #[must_use]
    pub fn new(
        id: impl Into<ItemId>,
        label: impl Into<String>,
        uri: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            uri: uri.into(),
            range: None,
            description: None,
        }
    }
}

/// Host-owned tree of [`TestItem`]s.
///
/// Removing an item removes its whole subtree. Operations on absent items
/// are no-ops.
pub trait TestTree {
    /// Returns the item with the given `id`.
    fn get(&self, id: &ItemId) -> Option<TestItem>;

    /// Returns the parent of the item with the given `id`.
    fn parent(&self, id: &ItemId) -> Option<ItemId>;

    /// Returns the children of the item with the given `id`, in insertion
    /// order.
    fn children(&self, id: &ItemId) -> Vec<ItemId>;

    /// Adds the given `item` as the last child of the `parent` one.
    fn add_child(&mut self, parent: &ItemId, item: TestItem);

    /// Removes the item with the given `id` along with its subtree.
    fn remove(&mut self, id: &ItemId);

    /// Shows (or clears) an error on the item with the given `id`.
    fn set_error(&mut self, id: &ItemId, error: Option<String>);

    /// Marks the item with the given `id` as being busy (or not).
    fn set_busy(&mut self, id: &ItemId, busy: bool);

    /// Replaces the whole tree with a sole root `item`.
    fn replace_root(&mut self, item: TestItem);
}

/// Error of mounting discovered entities into a [`TestTree`].
#[derive(Clone, Debug, Display, Error, From)]
pub enum Error {
    /// Event log is malformed.
    #[display("Malformed event log: {_0}")]
    Navigation(navigator::Error),

    /// Document has no URI, so can't be mounted.
    #[display("Document URI is required")]
    #[from(ignore)]
    MissingUri,

    /// Document URI has no file name.
    #[display("Can't add document \"{_0}\" without a file name")]
    #[from(ignore)]
    MissingFileName(#[error(not(source))] String),
}
