// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Records of a parsed `.feature` file, as reported by the runner.

use serde::Deserialize;

/// Parsed `.feature` file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GherkinDocument {
    /// URI of the file, relative to the runner's working directory.
    #[serde(default)]
    pub uri: Option<String>,

    /// [`Feature`] of this document, absent for empty files.
    #[serde(default)]
    pub feature: Option<Feature>,
}

/// Position in a source file.
///
/// Both numbers are 1-based.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Location {
    /// Line number.
    pub line: u32,

    /// Column number, absent when the runner doesn't track it.
    #[serde(default)]
    pub column: Option<u32>,
}

/// `Feature:` block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Position of the `Feature:` line.
    pub location: Location,

    /// Language of the Gherkin keywords.
    #[serde(default)]
    pub language: String,

    /// Keyword as written, e.g. `Feature`.
    pub keyword: String,

    /// Name of this feature.
    pub name: String,

    /// Free-form text below the header.
    #[serde(default)]
    pub description: String,

    /// Rules, backgrounds and scenarios of this feature.
    #[serde(default)]
    pub children: Vec<FeatureChild>,
}

/// Direct child of a [`Feature`]: exactly one of the fields is present.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureChild {
    /// Nested `Rule:` block.
    #[serde(default)]
    pub rule: Option<Rule>,

    /// `Background:` block.
    #[serde(default)]
    pub background: Option<Background>,

    /// `Scenario:` block.
    #[serde(default)]
    pub scenario: Option<Scenario>,
}

/// `Rule:` block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique ID of this rule.
    pub id: String,

    /// Position of the `Rule:` line.
    pub location: Location,

    /// Keyword as written, e.g. `Rule`.
    pub keyword: String,

    /// Name of this rule.
    pub name: String,

    /// Free-form text below the header.
    #[serde(default)]
    pub description: String,

    /// Backgrounds and scenarios of this rule.
    #[serde(default)]
    pub children: Vec<RuleChild>,
}

/// Direct child of a [`Rule`]: exactly one of the fields is present.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleChild {
    /// `Background:` block.
    #[serde(default)]
    pub background: Option<Background>,

    /// `Scenario:` block.
    #[serde(default)]
    pub scenario: Option<Scenario>,
}

/// `Background:` block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    /// Unique ID of this background.
    pub id: String,

    /// Position of the `Background:` line.
    pub location: Location,

    /// Keyword as written, e.g. `Background`.
    pub keyword: String,

    /// Name of this background, usually empty.
    #[serde(default)]
    pub name: String,

    /// Steps run before every scenario.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// `Scenario:` or `Scenario Outline:` block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Unique ID of this scenario.
    pub id: String,

    /// Position of the `Scenario:` line.
    pub location: Location,

    /// Keyword as written, e.g. `Scenario Outline`.
    pub keyword: String,

    /// Name of this scenario.
    pub name: String,

    /// Free-form text below the header.
    #[serde(default)]
    pub description: String,

    /// Step templates of this scenario.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Step line of a [`Scenario`] or [`Background`] template.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique ID of this step.
    pub id: String,

    /// Position of the step line.
    pub location: Location,

    /// Keyword including its trailing space, e.g. `"Given "`.
    pub keyword: String,

    /// Text following the keyword.
    pub text: String,
}
