// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Views over the records of parsed `.feature` files.

use derive_more::Deref;

use crate::event;

use super::{Navigator, Pickle};

/// View of a parsed `.feature` file.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Document<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::GherkinDocument,
}

impl<'log> Document<'log> {
    pub(super) const fn new(
        nav: Navigator<'log>,
        raw: &'log event::GherkinDocument,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::GherkinDocument {
        self.raw
    }

    /// Returns the URI of this [`Document`], if the runner reported any.
    #[must_use]
    pub fn uri(self) -> Option<&'log str> {
        self.raw.uri.as_deref()
    }

    /// Returns the [`Feature`] of this [`Document`], if it has any.
    #[must_use]
    pub fn feature(self) -> Option<Feature<'log>> {
        self.raw
            .feature
            .as_ref()
            .map(|raw| Feature { document: self, raw })
    }

    /// Returns all the [`Pickle`]s made of this [`Document`].
    pub fn pickles(self) -> impl Iterator<Item = Pickle<'log>> + 'log {
        let nav = self.nav;
        self.uri().into_iter().flat_map(move |uri| {
            nav.records::<event::Pickle>()
                .filter(move |p| p.uri == uri)
                .map(move |raw| Pickle::new(nav, raw))
        })
    }

    /// Returns all the [`Scenario`]s of this [`Document`], including the ones
    /// nested into `Rule:` blocks.
    pub fn scenarios(self) -> impl Iterator<Item = Scenario<'log>> + 'log {
        self.feature()
            .into_iter()
            .flat_map(Feature::children)
            .flat_map(|child| {
                child.scenario().into_iter().chain(
                    child
                        .rule()
                        .into_iter()
                        .flat_map(Rule::children)
                        .filter_map(RuleChild::scenario),
                )
            })
    }

    /// Returns all the [`Step`]s of this [`Document`]: the ones of its
    /// [`Scenario`]s and its `Background:` blocks.
    pub fn steps(self) -> impl Iterator<Item = Step<'log>> + 'log {
        let backgrounds = self
            .feature()
            .into_iter()
            .flat_map(Feature::children)
            .flat_map(|child| {
                child.raw.background.iter().chain(
                    child
                        .raw
                        .rule
                        .iter()
                        .flat_map(|r| &r.children)
                        .filter_map(|c| c.background.as_ref()),
                )
            })
            .flat_map(|b| &b.steps);

        self.scenarios()
            .flat_map(|s| &s.raw.steps)
            .chain(backgrounds)
            .map(move |raw| Step { document: self, raw })
    }
}

/// View of a `Feature:` block.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Feature<'log> {
    document: Document<'log>,
    #[deref(forward)]
    raw: &'log event::Feature,
}

impl<'log> Feature<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::Feature {
        self.raw
    }

    /// Returns the [`Document`] containing this [`Feature`].
    #[must_use]
    pub const fn document(self) -> Document<'log> {
        self.document
    }

    /// Returns the direct children of this [`Feature`].
    pub fn children(self) -> impl Iterator<Item = FeatureChild<'log>> + 'log {
        self.raw
            .children
            .iter()
            .map(move |raw| FeatureChild { feature: self, raw })
    }
}

/// View of a direct child of a [`Feature`].
#[derive(Clone, Copy, Debug, Deref)]
pub struct FeatureChild<'log> {
    feature: Feature<'log>,
    #[deref(forward)]
    raw: &'log event::FeatureChild,
}

impl<'log> FeatureChild<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::FeatureChild {
        self.raw
    }

    /// Returns the [`Feature`] containing this child.
    #[must_use]
    pub const fn feature(self) -> Feature<'log> {
        self.feature
    }

    /// Returns the [`Scenario`] this child is, if it is one.
    #[must_use]
    pub fn scenario(self) -> Option<Scenario<'log>> {
        self.raw.scenario.as_ref().map(|raw| Scenario {
            document: self.feature.document,
            rule: None,
            raw,
        })
    }

    /// Returns the [`Rule`] this child is, if it is one.
    #[must_use]
    pub fn rule(self) -> Option<Rule<'log>> {
        self.raw
            .rule
            .as_ref()
            .map(|raw| Rule { feature: self.feature, raw })
    }
}

/// View of a `Rule:` block.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Rule<'log> {
    feature: Feature<'log>,
    #[deref(forward)]
    raw: &'log event::Rule,
}

impl<'log> Rule<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::Rule {
        self.raw
    }

    /// Returns the [`Feature`] containing this [`Rule`].
    #[must_use]
    pub const fn feature(self) -> Feature<'log> {
        self.feature
    }

    /// Returns the direct children of this [`Rule`].
    pub fn children(self) -> impl Iterator<Item = RuleChild<'log>> + 'log {
        self.raw
            .children
            .iter()
            .map(move |raw| RuleChild { rule: self, raw })
    }
}

/// View of a direct child of a [`Rule`].
#[derive(Clone, Copy, Debug, Deref)]
pub struct RuleChild<'log> {
    rule: Rule<'log>,
    #[deref(forward)]
    raw: &'log event::RuleChild,
}

impl<'log> RuleChild<'log> {
    /// Returns the [`Rule`] containing this child.
    #[must_use]
    pub const fn rule(self) -> Rule<'log> {
        self.rule
    }

    /// Returns the [`Scenario`] this child is, if it is one.
    #[must_use]
    pub fn scenario(self) -> Option<Scenario<'log>> {
        self.raw.scenario.as_ref().map(|raw| Scenario {
            document: self.rule.feature.document,
            rule: Some(self.rule),
            raw,
        })
    }
}

/// View of a `Scenario:` block.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Scenario<'log> {
    document: Document<'log>,
    rule: Option<Rule<'log>>,
    #[deref(forward)]
    raw: &'log event::Scenario,
}

impl<'log> Scenario<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::Scenario {
        self.raw
    }

    /// Returns the [`Document`] containing this [`Scenario`].
    #[must_use]
    pub const fn document(self) -> Document<'log> {
        self.document
    }

    /// Returns the [`Rule`] this [`Scenario`] is nested into, if any.
    #[must_use]
    pub const fn rule(self) -> Option<Rule<'log>> {
        self.rule
    }

    /// Returns the [`Step`]s of this [`Scenario`].
    pub fn steps(self) -> impl Iterator<Item = Step<'log>> + 'log {
        self.raw
            .steps
            .iter()
            .map(move |raw| Step { document: self.document, raw })
    }
}

/// View of a template step line.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Step<'log> {
    document: Document<'log>,
    #[deref(forward)]
    raw: &'log event::Step,
}

impl<'log> Step<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::Step {
        self.raw
    }

    /// Returns the [`Document`] containing this [`Step`].
    #[must_use]
    pub const fn document(self) -> Document<'log> {
        self.document
    }
}
