// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Views over pickles and the records of their execution.

use std::time::Duration;

use derive_more::Deref;

use crate::event::{self, Status};

use super::{Document, Error, Navigator, Result, Scenario, Step};

/// View of a concrete scenario instance.
#[derive(Clone, Copy, Debug, Deref)]
pub struct Pickle<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::Pickle,
}

impl<'log> Pickle<'log> {
    pub(super) const fn new(
        nav: Navigator<'log>,
        raw: &'log event::Pickle,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::Pickle {
        self.raw
    }

    /// Returns the [`Document`] this [`Pickle`] comes from.
    ///
    /// # Errors
    ///
    /// If there is no [`Document`] with the URI of this [`Pickle`].
    pub fn document(self) -> Result<Document<'log>> {
        self.nav.find_document_by_uri(&self.raw.uri)
    }

    /// Returns the [`Scenario`] this [`Pickle`] is made of.
    ///
    /// # Errors
    ///
    /// If no [`Document`] contains such a [`Scenario`].
    pub fn scenario(self) -> Result<Scenario<'log>> {
        self.nav
            .all_documents()
            .flat_map(Document::scenarios)
            .find(|s| self.raw.ast_node_ids.contains(&s.raw().id))
            .ok_or_else(|| Error::UnresolvedScenario {
                pickle_id: self.raw.id.clone(),
            })
    }

    /// Returns all the steps of this [`Pickle`].
    pub fn steps(self) -> impl Iterator<Item = PickleStep<'log>> + 'log {
        self.raw
            .steps
            .iter()
            .map(move |raw| PickleStep { pickle: self, raw })
    }

    /// Returns the step of this [`Pickle`] with the given ID.
    ///
    /// # Errors
    ///
    /// If this [`Pickle`] has no such step.
    pub fn step(self, id: &str) -> Result<PickleStep<'log>> {
        self.steps().find(|s| s.raw.id == id).ok_or_else(|| {
            Error::UnknownPickleStep {
                pickle_id: self.raw.id.clone(),
                step_id: id.to_owned(),
            }
        })
    }
}

/// View of a concrete step instance of a [`Pickle`].
#[derive(Clone, Copy, Debug, Deref)]
pub struct PickleStep<'log> {
    pickle: Pickle<'log>,
    #[deref(forward)]
    raw: &'log event::PickleStep,
}

impl<'log> PickleStep<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::PickleStep {
        self.raw
    }

    /// Returns the [`Pickle`] containing this step.
    #[must_use]
    pub const fn pickle(self) -> Pickle<'log> {
        self.pickle
    }

    /// Returns the template [`Step`] this step is made of.
    ///
    /// # Errors
    ///
    /// If no [`Document`] contains such a [`Step`].
    pub fn step(self) -> Result<Step<'log>> {
        self.pickle
            .nav
            .all_documents()
            .flat_map(Document::steps)
            .find(|s| self.raw.ast_node_ids.contains(&s.raw().id))
            .ok_or_else(|| Error::UnresolvedStep {
                step_id: self.raw.id.clone(),
            })
    }
}

/// View of a planned execution of a [`Pickle`].
///
/// May be scoped to a single execution attempt, so step results of other
/// attempts are never observed.
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestCase<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::TestCase,
    attempt: Option<&'log str>,
}

impl<'log> TestCase<'log> {
    pub(super) const fn new(
        nav: Navigator<'log>,
        raw: &'log event::TestCase,
        attempt: Option<&'log str>,
    ) -> Self {
        Self { nav, raw, attempt }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestCase {
        self.raw
    }

    /// Returns ID of the [`TestCaseStarted`] this [`TestCase`] is scoped to,
    /// if any.
    #[must_use]
    pub const fn attempt(self) -> Option<&'log str> {
        self.attempt
    }

    /// Returns the [`Pickle`] this [`TestCase`] executes.
    ///
    /// # Errors
    ///
    /// If there is no such [`Pickle`].
    pub fn pickle(self) -> Result<Pickle<'log>> {
        self.nav.find_pickle(&self.raw.pickle_id)
    }

    /// Returns all the [`TestStep`]s of this [`TestCase`], in execution order.
    pub fn steps(self) -> impl Iterator<Item = TestStep<'log>> + 'log {
        self.raw
            .test_steps
            .iter()
            .map(move |raw| TestStep { test_case: self, raw })
    }

    /// Returns the [`TestStep`] of this [`TestCase`] with the given ID.
    ///
    /// # Errors
    ///
    /// If this [`TestCase`] has no such step.
    pub fn step(self, id: &str) -> Result<TestStep<'log>> {
        self.steps().find(|s| s.raw.id == id).ok_or_else(|| {
            Error::UnknownTestStep {
                test_case_id: self.raw.id.clone(),
                step_id: id.to_owned(),
            }
        })
    }

    /// Returns the worst result among the finished [`TestStep`]s.
    ///
    /// When nothing has finished yet, it's [`Status::Unknown`] with zero
    /// duration. On ties, the earliest step wins.
    #[must_use]
    pub fn worst_step_result(self) -> event::TestStepResult {
        self.steps()
            .filter_map(TestStep::test_step_finished)
            .map(TestStepFinished::test_step_result)
            .fold(None::<&event::TestStepResult>, |worst, r| match worst {
                Some(w) if w.status >= r.status => Some(w),
                _ => Some(r),
            })
            .cloned()
            .unwrap_or_else(|| event::TestStepResult {
                status: Status::Unknown,
                ..event::TestStepResult::default()
            })
    }

    /// Returns the sum of durations of the finished [`TestStep`]s.
    #[must_use]
    pub fn total_duration(self) -> Duration {
        self.steps()
            .filter_map(TestStep::test_step_finished)
            .map(|f| f.raw.test_step_result.duration.to_std())
            .sum()
    }
}

/// View of a planned invocation of a [`PickleStep`] or a hook.
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestStep<'log> {
    test_case: TestCase<'log>,
    #[deref(forward)]
    raw: &'log event::TestStep,
}

impl<'log> TestStep<'log> {
    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestStep {
        self.raw
    }

    /// Returns the [`TestCase`] containing this [`TestStep`].
    #[must_use]
    pub const fn test_case(self) -> TestCase<'log> {
        self.test_case
    }

    /// Returns the hook this [`TestStep`] invokes, if it's a hook step.
    ///
    /// # Errors
    ///
    /// If the referenced hook is absent.
    pub fn hook(self) -> Result<Option<&'log event::Hook>> {
        self.raw
            .hook_id
            .as_deref()
            .map(|id| self.test_case.nav.find_hook(id))
            .transpose()
    }

    /// Returns the [`PickleStep`] this [`TestStep`] invokes, if it's not a
    /// hook step.
    ///
    /// # Errors
    ///
    /// If the referenced [`Pickle`] or its step is absent.
    pub fn pickle_step(self) -> Result<Option<PickleStep<'log>>> {
        self.raw
            .pickle_step_id
            .as_deref()
            .map(|id| self.test_case.pickle()?.step(id))
            .transpose()
    }

    /// Looks up the result of this [`TestStep`] in the execution attempt the
    /// [`TestCase`] is scoped to.
    #[must_use]
    pub fn test_step_finished(self) -> Option<TestStepFinished<'log>> {
        self.test_case
            .nav
            .query_test_step_finished(&self.raw.id, self.test_case.attempt)
    }
}

/// View of an execution attempt start of a [`TestCase`].
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestCaseStarted<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::TestCaseStarted,
}

impl<'log> TestCaseStarted<'log> {
    /// Creates a new view of the given `raw` record.
    #[must_use]
    pub const fn new(
        nav: Navigator<'log>,
        raw: &'log event::TestCaseStarted,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestCaseStarted {
        self.raw
    }

    /// Returns the [`TestCase`] being executed, scoped to this attempt.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCase`].
    pub fn test_case(self) -> Result<TestCase<'log>> {
        self.nav.find_by_id(&self.raw.test_case_id).map(|raw| {
            TestCase::new(self.nav, raw, Some(self.raw.id.as_str()))
        })
    }

    /// Looks up the finish of this attempt.
    #[must_use]
    pub fn test_case_finished(self) -> Option<TestCaseFinished<'log>> {
        self.nav.query_test_case_finished(&self.raw.id)
    }
}

/// View of an execution attempt finish of a [`TestCase`].
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestCaseFinished<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::TestCaseFinished,
}

impl<'log> TestCaseFinished<'log> {
    /// Creates a new view of the given `raw` record.
    #[must_use]
    pub const fn new(
        nav: Navigator<'log>,
        raw: &'log event::TestCaseFinished,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestCaseFinished {
        self.raw
    }

    /// Returns the start of this attempt.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCaseStarted`].
    pub fn test_case_started(self) -> Result<TestCaseStarted<'log>> {
        self.nav.find_test_case_started(&self.raw.test_case_started_id)
    }
}

/// View of a [`TestStep`] start inside an execution attempt.
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestStepStarted<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::TestStepStarted,
}

impl<'log> TestStepStarted<'log> {
    /// Creates a new view of the given `raw` record.
    #[must_use]
    pub const fn new(
        nav: Navigator<'log>,
        raw: &'log event::TestStepStarted,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestStepStarted {
        self.raw
    }

    /// Returns the attempt this step belongs to.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCaseStarted`].
    pub fn test_case_started(self) -> Result<TestCaseStarted<'log>> {
        self.nav.find_test_case_started(&self.raw.test_case_started_id)
    }

    /// Returns the [`TestStep`] being executed.
    ///
    /// # Errors
    ///
    /// If the attempt, its [`TestCase`] or the step itself is absent.
    pub fn test_step(self) -> Result<TestStep<'log>> {
        self.test_case_started()?
            .test_case()?
            .step(&self.raw.test_step_id)
    }
}

/// View of a [`TestStep`] finish inside an execution attempt.
#[derive(Clone, Copy, Debug, Deref)]
pub struct TestStepFinished<'log> {
    nav: Navigator<'log>,
    #[deref(forward)]
    raw: &'log event::TestStepFinished,
}

impl<'log> TestStepFinished<'log> {
    /// Creates a new view of the given `raw` record.
    #[must_use]
    pub const fn new(
        nav: Navigator<'log>,
        raw: &'log event::TestStepFinished,
    ) -> Self {
        Self { nav, raw }
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn raw(self) -> &'log event::TestStepFinished {
        self.raw
    }

    /// Returns the outcome of the step.
    #[must_use]
    pub const fn test_step_result(self) -> &'log event::TestStepResult {
        &self.raw.test_step_result
    }

    /// Returns the attempt this step belongs to.
    ///
    /// # Errors
    ///
    /// If there is no such [`TestCaseStarted`].
    pub fn test_case_started(self) -> Result<TestCaseStarted<'log>> {
        self.nav.find_test_case_started(&self.raw.test_case_started_id)
    }

    /// Returns the [`TestStep`] that has finished.
    ///
    /// # Errors
    ///
    /// If the attempt, its [`TestCase`] or the step itself is absent.
    pub fn test_step(self) -> Result<TestStep<'log>> {
        self.test_case_started()?
            .test_case()?
            .step(&self.raw.test_step_id)
    }
}
