// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Records of test case planning and execution.

use std::time;

use derive_more::Display;
use serde::Deserialize;

/// Registered before/after hook.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    /// Unique ID of this hook.
    pub id: String,

    /// Name given to this hook, if any.
    #[serde(default)]
    pub name: Option<String>,

    /// Where this hook is defined.
    #[serde(default)]
    pub source_reference: SourceReference,
}

/// Registered step definition.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique ID of this step definition.
    pub id: String,

    /// Where this step definition is defined.
    #[serde(default)]
    pub source_reference: SourceReference,
}

/// Place in the support code where a [`Hook`] or [`StepDefinition`] is
/// defined.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SourceReference {
    /// URI of the support code file.
    #[serde(default)]
    pub uri: Option<String>,

    /// Position in the support code file.
    #[serde(default)]
    pub location: Option<super::Location>,
}

/// Planned execution of a [`Pickle`].
///
/// [`Pickle`]: super::Pickle
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Unique ID of this test case.
    pub id: String,

    /// ID of the executed `Pickle`.
    pub pickle_id: String,

    /// Steps to execute, hooks included, in order.
    #[serde(default)]
    pub test_steps: Vec<TestStep>,
}

/// Planned invocation of a [`PickleStep`] or a [`Hook`].
///
/// Carries at most one of [`TestStep::hook_id`] and
/// [`TestStep::pickle_step_id`], none for synthetic steps.
///
/// [`PickleStep`]: super::PickleStep
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// Unique ID of this step.
    pub id: String,

    /// ID of the invoked [`Hook`].
    #[serde(default)]
    pub hook_id: Option<String>,

    /// ID of the invoked `PickleStep`.
    #[serde(default)]
    pub pickle_step_id: Option<String>,
}

/// Point in time, relative to the Unix epoch.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Timestamp {
    /// Whole seconds.
    pub seconds: i64,

    /// Fraction of a second, in nanoseconds.
    pub nanos: u32,
}

/// Execution attempt of a [`TestCase`] has started.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStarted {
    /// Unique ID of this attempt.
    pub id: String,

    /// ID of the executed [`TestCase`].
    pub test_case_id: String,

    /// Zero-based number of this attempt, greater than zero for retries.
    #[serde(default)]
    pub attempt: u32,

    /// Time this attempt started at.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// Execution attempt of a [`TestCase`] has finished.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseFinished {
    /// ID of the finished [`TestCaseStarted`] attempt.
    pub test_case_started_id: String,

    /// Whether another attempt follows this one.
    #[serde(default)]
    pub will_be_retried: bool,

    /// Time this attempt finished at.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// [`TestStep`] of an execution attempt has started.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStepStarted {
    /// ID of the [`TestCaseStarted`] attempt.
    pub test_case_started_id: String,

    /// ID of the started [`TestStep`].
    pub test_step_id: String,

    /// Time this step started at.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// [`TestStep`] of an execution attempt has finished.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStepFinished {
    /// ID of the [`TestCaseStarted`] attempt.
    pub test_case_started_id: String,

    /// ID of the finished [`TestStep`].
    pub test_step_id: String,

    /// Outcome of this step.
    pub test_step_result: TestStepResult,

    /// Time this step finished at.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// Outcome of a single [`TestStep`] execution.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TestStepResult {
    /// Outcome kind.
    pub status: Status,

    /// Time the step took.
    #[serde(default)]
    pub duration: Duration,

    /// Failure message, if any.
    #[serde(default)]
    pub message: Option<String>,

    /// Error raised by the step, if any.
    #[serde(default)]
    pub exception: Option<Exception>,
}

/// Error raised by a failed step.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    /// Type name of the error.
    #[serde(rename = "type")]
    pub kind: String,

    /// Error message.
    #[serde(default)]
    pub message: Option<String>,

    /// Stack trace, with frames on separate lines.
    #[serde(default)]
    pub stack_trace: Option<String>,
}

/// Elapsed time, as reported by the runner.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Duration {
    /// Whole seconds.
    pub seconds: u64,

    /// Fraction of a second, in nanoseconds.
    pub nanos: u32,
}

impl Duration {
    /// Converts this [`Duration`] into a [`std::time::Duration`].
    #[must_use]
    pub const fn to_std(self) -> time::Duration {
        time::Duration::new(self.seconds, self.nanos)
    }
}

impl From<Duration> for time::Duration {
    fn from(d: Duration) -> Self {
        d.to_std()
    }
}

/// Status of a [`TestStepResult`].
///
/// Ordered by severity, so the worst of several statuses is their maximum.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// No result reported.
    #[default]
    #[display("UNKNOWN")]
    Unknown,
    /// Step passed.
    #[display("PASSED")]
    Passed,
    /// Step was skipped.
    #[display("SKIPPED")]
    Skipped,
    /// Step is not implemented yet.
    #[display("PENDING")]
    Pending,
    /// No step definition matches.
    #[display("UNDEFINED")]
    Undefined,
    /// Several step definitions match.
    #[display("AMBIGUOUS")]
    Ambiguous,
    /// Step failed.
    #[display("FAILED")]
    Failed,
}
