// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Read-only, cross-referencing view over a recorded [`Envelope`] sequence.
//!
//! Records of a Cucumber messages stream reference each other by opaque IDs
//! instead of nesting. A [`Navigator`] borrows the recorded sequence and
//! resolves those references on demand: every relationship accessor of its
//! views re-scans the borrowed log at call time, so no derived state is ever
//! stored.
//!
//! A reference that can't be resolved means the log is malformed, and is
//! reported as an [`Error`]. Lookups where absence is a normal outcome (a step
//! that hasn't finished yet) return an [`Option`] instead.

mod execution;
mod gherkin;

use std::fmt;

use derive_more::{Display, Error};

use crate::event::{self, Envelope, Identified, Record};

#[doc(inline)]
pub use self::{
    execution::{
        Pickle, PickleStep, TestCase, TestCaseFinished, TestCaseStarted,
        TestStep, TestStepFinished, TestStepStarted,
    },
    gherkin::{Document, Feature, FeatureChild, Rule, RuleChild, Scenario, Step},
};

/// Error of resolving a reference inside a recorded [`Envelope`] sequence.
///
/// Any of these means the event log is malformed.
#[derive(Clone, Debug, Display, Eq, Error, PartialEq)]
pub enum Error {
    /// Record of the given kind with the given key is absent.
    #[display("{kind} with key \"{key}\" not found")]
    NotFound {
        /// Kind of the absent record.
        kind: &'static str,

        /// Key the record was looked up by.
        key: String,
    },

    /// [`Pickle`] doesn't originate from any known [`Scenario`].
    #[display("Pickle \"{pickle_id}\" doesn't resolve to any scenario")]
    UnresolvedScenario {
        /// ID of the [`Pickle`].
        pickle_id: String,
    },

    /// [`PickleStep`] doesn't originate from any known [`Step`].
    #[display("Pickle step \"{step_id}\" doesn't resolve to any step")]
    UnresolvedStep {
        /// ID of the [`PickleStep`].
        step_id: String,
    },

    /// [`Pickle`] has no step with the referenced ID.
    #[display("Pickle \"{pickle_id}\" has no step \"{step_id}\"")]
    UnknownPickleStep {
        /// ID of the [`Pickle`].
        pickle_id: String,

        /// Referenced step ID.
        step_id: String,
    },

    /// [`TestCase`] has no step with the referenced ID.
    #[display("Test case \"{test_case_id}\" has no step \"{step_id}\"")]
    UnknownTestStep {
        /// ID of the [`TestCase`].
        test_case_id: String,

        /// Referenced step ID.
        step_id: String,
    },
}

impl Error {
    fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { kind, key: key.into() }
    }
}

/// Alias of a [`Result`](std::result::Result) with a navigation [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Cross-referencing view over a borrowed [`Envelope`] sequence.
///
/// It's cheap to copy, and never outlives the sequence it borrows.
#[derive(Clone, Copy)]
pub struct Navigator<'log> {
    log: &'log [Envelope],
}

impl fmt::Debug for Navigator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator").field("len", &self.log.len()).finish()
    }
}

impl<'log> Navigator<'log> {
    /// Creates a new [`Navigator`] over the given `log`.
    #[must_use]
    pub const fn new(log: &'log [Envelope]) -> Self {
        Self { log }
    }

    /// Returns the borrowed [`Envelope`] sequence.
    #[must_use]
    pub const fn log(self) -> &'log [Envelope] {
        self.log
    }

    fn records<R: Record + 'log>(self) -> impl Iterator<Item = &'log R> + 'log {
        self.log.iter().filter_map(R::from_envelope)
    }

    fn find_by_id<R: Identified + 'log>(self, id: &str) -> Result<&'log R> {
        self.records::<R>()
            .find(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(R::KIND, id))
    }

    /// Returns all the recorded [`Document`]s, in the log order.
    pub fn all_documents(self) -> impl Iterator<Item = Document<'log>> + 'log {
        self.records().map(move |raw| Document::new(self, raw))
    }

    /// Returns all the recorded [`TestCase`]s, in the log order.
    ///
    /// Returned [`TestCase`]s aren't scoped to any execution attempt.
    pub fn all_test_cases(self) -> impl Iterator<Item = TestCase<'log>> + 'log {
        self.records().map(move |raw| TestCase::new(self, raw, None))
    }

    /// Returns all the recorded [`TestCaseStarted`] records, in the log order.
    pub fn all_test_cases_started(
        self,
    ) -> impl Iterator<Item = TestCaseStarted<'log>> + 'log {
        self.records().map(move |raw| TestCaseStarted::new(self, raw))
    }

    /// Finds a [`Document`] by its URI.
    ///
    /// # Errors
    ///
    /// If there is no such [`Document`].
    pub fn find_document_by_uri(self, uri: &str) -> Result<Document<'log>> {
        self.records::<event::GherkinDocument>()
            .find(|d| d.uri.as_deref() == Some(uri))
            .map(|raw| Document::new(self, raw))
            .ok_or_else(|| Error::not_found(event::GherkinDocument::KIND, uri))
    }

    /// Finds a [`Pickle`] by its ID.
    ///
    /// # Errors
    ///
    /// If there is no such [`Pickle`].
    pub fn find_pickle(self, id: &str) -> Result<Pickle<'log>> {
        self.find_by_id(id).map(|raw| Pickle::new(self, raw))
    }

    /// Finds an [`event::Hook`] by its ID.
    ///
    /// # Errors
    ///
    /// If there is no such [`event::Hook`].
    pub fn find_hook(self, id: &str) -> Result<&'log event::Hook> {
        self.find_by_id(id)
    }

    /// Finds an [`event::StepDefinition`] by its ID.
    ///
    /// # Errors
    ///
    /// If there is no such [`event::StepDefinition`].
    pub fn find_step_definition(
        self,
        id: &str,
    ) -> Result<&'log event::StepDefinition> {
        self.find_by_id(id)
    }

    /// Finds an unscoped [`TestCase`] by its ID.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCase`].
    pub fn find_test_case(self, id: &str) -> Result<TestCase<'log>> {
        self.find_by_id(id).map(|raw| TestCase::new(self, raw, None))
    }

    /// Finds a [`TestCaseStarted`] by its ID.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCaseStarted`].
    pub fn find_test_case_started(
        self,
        id: &str,
    ) -> Result<TestCaseStarted<'log>> {
        self.find_by_id(id).map(|raw| TestCaseStarted::new(self, raw))
    }

    /// Finds a [`TestCaseFinished`] by the ID of its [`TestCaseStarted`].
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCaseFinished`].
    pub fn find_test_case_finished(
        self,
        test_case_started_id: &str,
    ) -> Result<TestCaseFinished<'log>> {
        self.query_test_case_finished(test_case_started_id).ok_or_else(|| {
            Error::not_found(
                event::TestCaseFinished::KIND,
                test_case_started_id,
            )
        })
    }

    /// Looks up a [`TestCaseFinished`] by the ID of its [`TestCaseStarted`].
    #[must_use]
    pub fn query_test_case_finished(
        self,
        test_case_started_id: &str,
    ) -> Option<TestCaseFinished<'log>> {
        self.records::<event::TestCaseFinished>()
            .find(|f| f.test_case_started_id == test_case_started_id)
            .map(|raw| TestCaseFinished::new(self, raw))
    }

    /// Looks up a [`TestStepFinished`] by the ID of its [`TestStep`].
    ///
    /// With `test_case_started_id` specified, only the given execution attempt
    /// is considered, otherwise the first finished record wins.
    #[must_use]
    pub fn query_test_step_finished(
        self,
        test_step_id: &str,
        test_case_started_id: Option<&str>,
    ) -> Option<TestStepFinished<'log>> {
        self.records::<event::TestStepFinished>()
            .find(|f| {
                f.test_step_id == test_step_id
                    && test_case_started_id
                        .map_or(true, |id| f.test_case_started_id == id)
            })
            .map(|raw| TestStepFinished::new(self, raw))
    }
}
