// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Test explorer integration for [Cucumber].
//!
//! Scenarios are discovered and executed by an external Cucumber runner
//! subprocess emitting [Cucumber messages][1], one JSON record per line. This
//! crate turns that stream into a tree of test items and per-item results:
//!
//! - [`event`] decodes the records into an [`Envelope`] sum type;
//! - [`navigator`] is a read-only, cross-referencing view over a recorded
//!   sequence of [`Envelope`]s;
//! - [`projector`] folds live run events into [`TestRun`] callbacks;
//! - [`tree`] keeps a persistent [`TestTree`] in sync with discovered test
//!   cases;
//! - [`config`] resolves runner configuration per project root or virtual
//!   folder, caching and invalidating it as files change;
//! - [`runner`] spawns the external runner (configuration loading, dry-run
//!   discovery and test execution);
//! - [`run`] and [`controller`] glue all of the above to a host.
//!
//! All the state is single-threaded: types are `!Send` and local tasks are
//! expected to be driven by a [`tokio::task::LocalSet`].
//!
//! [Cucumber]: https://cucumber.io
//! [1]: https://github.com/cucumber/messages

pub mod cancellation;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod navigator;
pub mod projector;
pub mod pubsub;
pub mod run;
pub mod runner;
pub mod tree;
pub mod writer;

#[doc(inline)]
pub use self::{
    cancellation::Cancellation,
    config::{ConfigInstance, ConfigPipeline},
    controller::Controller,
    error::{Error, Result},
    event::Envelope,
    navigator::Navigator,
    projector::Projector,
    pubsub::{Publisher, Replay, Subscription},
    run::{RunRequest, TestRun},
    runner::{ConfigToken, Cucumber, EventLog},
    tree::{ItemId, MemoryTree, Synchronizer, TestItem, TestTree},
};
