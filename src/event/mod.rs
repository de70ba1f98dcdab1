// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Structured event records emitted by an external Cucumber runner.
//!
//! The top-level enum here is [`Envelope`]. Every line written by the runner
//! with the `message` formatter is a JSON object with exactly one key naming
//! the record kind. It's decoded once into an [`Envelope`] variant, so no code
//! downstream has to probe which field happens to be present.
//!
//! Only the record kinds this crate navigates are modeled, everything else
//! is decoded into [`Envelope::Other`].

mod execution;
mod gherkin;
mod pickle;

use std::sync::Arc;

use derive_more::{Display, Error};
use sealed::sealed;
use serde::Deserialize;

#[doc(inline)]
pub use self::{
    execution::{
        Duration, Exception, Hook, SourceReference, Status, StepDefinition,
        TestCase, TestCaseFinished, TestCaseStarted, TestStep,
        TestStepFinished, TestStepResult, TestStepStarted, Timestamp,
    },
    gherkin::{
        Background, Feature, FeatureChild, GherkinDocument, Location, Rule,
        RuleChild, Scenario, Step,
    },
    pickle::{Pickle, PickleStep},
};

/// Single record of a Cucumber messages stream.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(try_from = "wire::Envelope")]
pub enum Envelope {
    /// Parsed `.feature` file.
    GherkinDocument(GherkinDocument),

    /// Concrete scenario instance, after examples expansion.
    Pickle(Pickle),

    /// Registered before/after hook.
    Hook(Hook),

    /// Registered step definition.
    StepDefinition(StepDefinition),

    /// Planned execution of a [`Pickle`].
    TestCase(TestCase),

    /// Execution attempt of a [`TestCase`] has started.
    TestCaseStarted(TestCaseStarted),

    /// [`TestStep`] of an execution attempt has started.
    TestStepStarted(TestStepStarted),

    /// [`TestStep`] of an execution attempt has finished.
    TestStepFinished(TestStepFinished),

    /// Execution attempt of a [`TestCase`] has finished.
    TestCaseFinished(TestCaseFinished),

    /// Any other record kind, irrelevant for navigation.
    Other,
}

impl Envelope {
    /// Decodes a single line of runner output.
    ///
    /// # Errors
    ///
    /// If the line isn't a well-formed Cucumber message.
    pub fn from_json(line: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(line).map_err(|e| DecodeError(Arc::new(e)))
    }

    /// Returns the name of this record kind, as used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GherkinDocument(_) => GherkinDocument::KIND,
            Self::Pickle(_) => Pickle::KIND,
            Self::Hook(_) => Hook::KIND,
            Self::StepDefinition(_) => StepDefinition::KIND,
            Self::TestCase(_) => TestCase::KIND,
            Self::TestCaseStarted(_) => TestCaseStarted::KIND,
            Self::TestStepStarted(_) => TestStepStarted::KIND,
            Self::TestStepFinished(_) => TestStepFinished::KIND,
            Self::TestCaseFinished(_) => TestCaseFinished::KIND,
            Self::Other => "other",
        }
    }
}

/// Error of decoding an [`Envelope`] from its JSON representation.
#[derive(Clone, Debug, Display, Error)]
#[display("Malformed Cucumber message: {_0}")]
pub struct DecodeError(Arc<serde_json::Error>);

/// Record kind carried by an [`Envelope`] variant.
#[sealed]
pub trait Record: Sized {
    /// Name of this record kind, as used on the wire.
    const KIND: &'static str;

    /// Extracts this record out of the given [`Envelope`], if it carries one.
    fn from_envelope(envelope: &Envelope) -> Option<&Self>;
}

/// Record kind which has its own unique identifier.
pub trait Identified: Record {
    /// Returns the identifier of this record.
    fn id(&self) -> &str;
}

macro_rules! record {
    ($ty:ident, $kind:literal $(, $id:ident)?) => {
        #[sealed]
        impl Record for $ty {
            const KIND: &'static str = $kind;

            fn from_envelope(envelope: &Envelope) -> Option<&Self> {
                match envelope {
                    Envelope::$ty(record) => Some(record),
                    _ => None,
                }
            }
        }

        $(
            impl Identified for $ty {
                fn id(&self) -> &str {
                    &self.$id
                }
            }
        )?
    };
}

record!(GherkinDocument, "gherkinDocument");
record!(Pickle, "pickle", id);
record!(Hook, "hook", id);
record!(StepDefinition, "stepDefinition", id);
record!(TestCase, "testCase", id);
record!(TestCaseStarted, "testCaseStarted", id);
record!(TestStepStarted, "testStepStarted");
record!(TestStepFinished, "testStepFinished");
record!(TestCaseFinished, "testCaseFinished");

/// Raw wire representation, converted into an [`Envelope`] right away.
mod wire {
    use serde::Deserialize;

    use super::{
        GherkinDocument, Hook, Pickle, StepDefinition, TestCase,
        TestCaseFinished, TestCaseStarted, TestStepFinished, TestStepStarted,
    };

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Envelope {
        pub(super) gherkin_document: Option<GherkinDocument>,
        pub(super) pickle: Option<Pickle>,
        pub(super) hook: Option<Hook>,
        pub(super) step_definition: Option<StepDefinition>,
        pub(super) test_case: Option<TestCase>,
        pub(super) test_case_started: Option<TestCaseStarted>,
        pub(super) test_step_started: Option<TestStepStarted>,
        pub(super) test_step_finished: Option<TestStepFinished>,
        pub(super) test_case_finished: Option<TestCaseFinished>,
    }
}

impl TryFrom<wire::Envelope> for Envelope {
    type Error = String;

    fn try_from(raw: wire::Envelope) -> Result<Self, Self::Error> {
        let wire::Envelope {
            gherkin_document,
            pickle,
            hook,
            step_definition,
            test_case,
            test_case_started,
            test_step_started,
            test_step_finished,
            test_case_finished,
        } = raw;

        if let Some(test_case) = &test_case {
            if let Some(step) = test_case
                .test_steps
                .iter()
                .find(|s| s.hook_id.is_some() && s.pickle_step_id.is_some())
            {
                return Err(format!(
                    "test step \"{}\" references both a hook and a pickle step",
                    step.id,
                ));
            }
        }

        Ok(gherkin_document
            .map(Self::GherkinDocument)
            .or_else(|| pickle.map(Self::Pickle))
            .or_else(|| hook.map(Self::Hook))
            .or_else(|| step_definition.map(Self::StepDefinition))
            .or_else(|| test_case.map(Self::TestCase))
            .or_else(|| test_case_started.map(Self::TestCaseStarted))
            .or_else(|| test_step_started.map(Self::TestStepStarted))
            .or_else(|| test_step_finished.map(Self::TestStepFinished))
            .or_else(|| test_case_finished.map(Self::TestCaseFinished))
            .unwrap_or(Self::Other))
    }
}

#[cfg(test)]
mod tests {
    use super::{Envelope, Status};

    #[test]
    fn decodes_test_step_finished() {
        let envelope = Envelope::from_json(
            r#"{"testStepFinished":{"testCaseStartedId":"tcs-1",
                "testStepId":"ts-1","testStepResult":{"status":"FAILED",
                "duration":{"seconds":1,"nanos":500000000},
                "exception":{"type":"Error","message":"boom"}},
                "timestamp":{"seconds":0,"nanos":0}}}"#,
        )
        .unwrap();

        let Envelope::TestStepFinished(finished) = envelope else {
            panic!("expected `TestStepFinished`, got: {envelope:?}");
        };
        assert_eq!(finished.test_case_started_id, "tcs-1");
        assert_eq!(finished.test_step_result.status, Status::Failed);
        assert_eq!(
            finished.test_step_result.duration.to_std().as_millis(),
            1500,
        );
        assert_eq!(
            finished
                .test_step_result
                .exception
                .as_ref()
                .and_then(|e| e.message.as_deref()),
            Some("boom"),
        );
    }

    #[test]
    fn unknown_kinds_are_other() {
        let envelope =
            Envelope::from_json(r#"{"meta":{"protocolVersion":"24.0.0"}}"#)
                .unwrap();

        assert_eq!(envelope, Envelope::Other);
        assert_eq!(envelope.kind(), "other");
    }

    #[test]
    fn rejects_non_json() {
        assert!(Envelope::from_json("Loading step definitions...").is_err());
    }

    #[test]
    fn rejects_step_with_hook_and_pickle_step() {
        let result = Envelope::from_json(
            r#"{"testCase":{"id":"tc-1","pickleId":"p-1","testSteps":[
                {"id":"ts-1","hookId":"h-1","pickleStepId":"ps-1"}]}}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn accepts_synthetic_step_without_references() {
        let envelope = Envelope::from_json(
            r#"{"testCase":{"id":"tc-1","pickleId":"p-1","testSteps":[
                {"id":"ts-1"}]}}"#,
        )
        .unwrap();

        let Envelope::TestCase(test_case) = envelope else {
            panic!("expected `TestCase`");
        };
        assert!(test_case.test_steps[0].hook_id.is_none());
        assert!(test_case.test_steps[0].pickle_step_id.is_none());
    }
}
