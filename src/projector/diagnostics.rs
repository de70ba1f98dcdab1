// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Diagnostics attached to failed test items.

use std::path::{Path, PathBuf};

use lazy_regex::{regex, Lazy, Regex};

use crate::{
    event::{Status, TestStepResult},
    navigator::{self, TestCase},
    tree::{Position, Range},
};

/// Place in a source file a [`TestMessage`] points to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// Absolute path of the file.
    pub uri: PathBuf,

    /// Range of the failed step line.
    pub range: Range,
}

/// Single frame of a parsed stack trace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackFrame {
    /// Raw line of the stack trace.
    pub label: String,

    /// Called function, if the line is a recognized frame.
    pub method: Option<String>,

    /// Source file of the frame, if the line is a recognized frame.
    pub file: Option<PathBuf>,

    /// Zero-based position in the [`StackFrame::file`].
    pub position: Option<Position>,
}

impl StackFrame {
    /// Parses a single stack trace line of the
    /// `at <method> (<file>:<line>:<column>)` form.
    ///
    /// Lines of any other form produce a [`StackFrame`] without a location.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        static STACK_LINE: &Lazy<Regex> = regex!(
            r"^\s*at (?P<method>.+)\s\((?P<file>.*):(?P<line>\d+):(?P<column>\d+)\)$"
        );

        let mut frame = Self {
            label: line.to_owned(),
            method: None,
            file: None,
            position: None,
        };
        if let Some(caps) = STACK_LINE.captures(line) {
            frame.method = Some(caps["method"].to_owned());
            frame.file = Some(PathBuf::from(&caps["file"]));
            frame.position = caps["line"]
                .parse::<u32>()
                .ok()
                .zip(caps["column"].parse::<u32>().ok())
                .map(|(line, column)| Position {
                    line: line.saturating_sub(1),
                    character: column.saturating_sub(1),
                });
        }
        frame
    }
}

/// Parses the given stack trace text, one [`StackFrame`] per line.
#[must_use]
pub fn parse_stack_trace(text: &str) -> Vec<StackFrame> {
    text.lines().map(StackFrame::parse).collect()
}

/// Diagnostic message of a failed step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestMessage {
    /// Text of the message.
    pub message: String,

    /// Failed step, if known.
    pub location: Option<Location>,

    /// Parsed stack trace of the error, innermost frame first.
    pub stack_trace: Vec<StackFrame>,
}

impl TestMessage {
    /// Creates a new [`TestMessage`] with the given text only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), location: None, stack_trace: vec![] }
    }
}

/// Returns the text describing the given failed `result`.
///
/// Prefers the exception message, then the result message, then the status.
#[must_use]
pub fn failure_text(result: &TestStepResult) -> String {
    result
        .exception
        .as_ref()
        .and_then(|e| e.message.clone())
        .or_else(|| result.message.clone())
        .unwrap_or_else(|| result.status.to_string())
}

/// Builds one [`TestMessage`] per failed step of the given `test_case`.
///
/// Documents are resolved relatively to the given `base_path`.
///
/// # Errors
///
/// If the event log is malformed.
pub fn test_messages(
    test_case: TestCase<'_>,
    base_path: &Path,
) -> navigator::Result<Vec<TestMessage>> {
    let mut messages = vec![];
    for test_step in test_case.steps() {
        let Some(finished) = test_step.test_step_finished() else {
            continue;
        };
        let result = finished.test_step_result();
        if result.status != Status::Failed {
            continue;
        }

        let mut message = TestMessage::new(failure_text(result));
        if let Some(pickle_step) = test_step.pickle_step()? {
            let step = pickle_step.step()?;
            let document = pickle_step.pickle().document()?;
            message.location = document.uri().map(|uri| Location {
                uri: base_path.join(uri),
                range: Range::of_header(
                    step.raw().location,
                    &step.raw().keyword,
                    &step.raw().text,
                ),
            });
        }
        if let Some(trace) = result
            .exception
            .as_ref()
            .and_then(|e| e.stack_trace.as_deref())
        {
            message.stack_trace = parse_stack_trace(trace);
        }
        messages.push(message);
    }
    Ok(messages)
}
