// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`TestRun`] recording everything reported to it.

use std::time::Duration;

use crate::{projector::TestMessage, run::TestRun, tree::{ItemId, TestItem}};

/// Single call of a [`TestRun`].
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    Enqueued(ItemId),
    Started(ItemId),
    Passed(ItemId, Duration),
    Failed(ItemId, Vec<TestMessage>, Duration),
    Skipped(ItemId),
    Errored(ItemId, TestMessage, Option<Duration>),
    Output(String),
    DebuggerListening(String),
    Ended,
}

impl RunEvent {
    /// Returns the [`ItemId`] this [`RunEvent`] is about, if any.
    #[must_use]
    pub const fn item(&self) -> Option<&ItemId> {
        match self {
            Self::Enqueued(id)
            | Self::Started(id)
            | Self::Passed(id, _)
            | Self::Failed(id, ..)
            | Self::Skipped(id)
            | Self::Errored(id, ..) => Some(id),
            Self::Output(_) | Self::DebuggerListening(_) | Self::Ended => None,
        }
    }

    /// Indicates whether this [`RunEvent`] is a terminal state of an item.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passed(..)
                | Self::Failed(..)
                | Self::Skipped(_)
                | Self::Errored(..),
        )
    }
}

/// [`TestRun`] keeping every call as a [`RunEvent`].
#[derive(Clone, Debug, Default)]
pub struct Record {
    events: Vec<RunEvent>,
}

impl Record {
    /// Creates a new empty [`Record`].
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Returns all the recorded [`RunEvent`]s.
    #[must_use]
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Returns the [`RunEvent`]s of the item with the given `id`.
    pub fn of<'a>(
        &'a self,
        id: &'a ItemId,
    ) -> impl Iterator<Item = &'a RunEvent> + 'a {
        self.events.iter().filter(move |ev| ev.item() == Some(id))
    }

    /// Returns the terminal state of the item with the given `id`, if any.
    #[must_use]
    pub fn outcome(&self, id: &ItemId) -> Option<&RunEvent> {
        self.events
            .iter()
            .find(|ev| ev.item() == Some(id) && ev.is_terminal())
    }

    /// Returns the whole run log.
    #[must_use]
    pub fn output(&self) -> String {
        self.events
            .iter()
            .filter_map(|ev| match ev {
                RunEvent::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Indicates whether [`TestRun::end()`] has been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.events.contains(&RunEvent::Ended)
    }
}

impl TestRun for Record {
    fn enqueued(&mut self, item: &TestItem) {
        self.events.push(RunEvent::Enqueued(item.id.clone()));
    }

    fn started(&mut self, item: &TestItem) {
        self.events.push(RunEvent::Started(item.id.clone()));
    }

    fn passed(&mut self, item: &TestItem, duration: Duration) {
        self.events.push(RunEvent::Passed(item.id.clone(), duration));
    }

    fn failed(
        &mut self,
        item: &TestItem,
        messages: Vec<TestMessage>,
        duration: Duration,
    ) {
        self.events
            .push(RunEvent::Failed(item.id.clone(), messages, duration));
    }

    fn skipped(&mut self, item: &TestItem) {
        self.events.push(RunEvent::Skipped(item.id.clone()));
    }

    fn errored(
        &mut self,
        item: &TestItem,
        message: TestMessage,
        duration: Option<Duration>,
    ) {
        self.events
            .push(RunEvent::Errored(item.id.clone(), message, duration));
    }

    fn append_output(&mut self, text: &str) {
        self.events.push(RunEvent::Output(text.to_owned()));
    }

    fn debugger_listening(&mut self, url: &str) {
        self.events.push(RunEvent::DebuggerListening(url.to_owned()));
    }

    fn end(&mut self) {
        self.events.push(RunEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{run::TestRun as _, tree::TestItem};

    use super::{Record, RunEvent};

    #[test]
    fn tracks_outcomes_per_item() {
        let mut record = Record::new();
        let item = TestItem::new("a", "a", "/ws/a");

        record.enqueued(&item);
        record.started(&item);
        record.append_output("log\r\n");
        record.passed(&item, Duration::from_millis(3));
        record.end();

        assert_eq!(record.of(&item.id).count(), 3);
        assert_eq!(
            record.outcome(&item.id),
            Some(&RunEvent::Passed(item.id.clone(), Duration::from_millis(3))),
        );
        assert_eq!(record.output(), "log\r\n");
        assert!(record.is_ended());
    }
}
