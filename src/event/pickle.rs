// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Concrete scenario instances, after `Examples:` expansion.

use serde::Deserialize;

/// Concrete executable instance of a [`Scenario`].
///
/// A `Scenario Outline:` yields one [`Pickle`] per `Examples:` row.
///
/// [`Scenario`]: super::Scenario
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pickle {
    /// Unique ID of this pickle.
    pub id: String,

    /// URI of the [`GherkinDocument`] this [`Pickle`] comes from.
    ///
    /// [`GherkinDocument`]: super::GherkinDocument
    pub uri: String,

    /// Name of the scenario, with outline parameters substituted.
    pub name: String,

    /// Concrete steps, background steps first.
    #[serde(default)]
    pub steps: Vec<PickleStep>,

    /// IDs of the [`Scenario`] and `Examples:` row this [`Pickle`] is made
    /// of.
    ///
    /// [`Scenario`]: super::Scenario
    #[serde(default)]
    pub ast_node_ids: Vec<String>,
}

/// Concrete step instance of a [`Pickle`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PickleStep {
    /// Unique ID of this step.
    pub id: String,

    /// Step text, with outline parameters substituted.
    pub text: String,

    /// IDs of the [`Step`] (and `Examples:` row) this step is made of.
    ///
    /// [`Step`]: super::Step
    #[serde(default)]
    pub ast_node_ids: Vec<String>,
}
