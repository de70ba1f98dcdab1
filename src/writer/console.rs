// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`TestRun`] printing to a terminal.

use std::{borrow::Cow, io, str::FromStr, time::Duration};

use itertools::Itertools as _;
use smart_default::SmartDefault;

use crate::{projector::TestMessage, run::TestRun, tree::TestItem};

use super::out::{Styles, WriteStrExt as _};

/// CLI options of a [`Console`].
#[derive(Clone, Copy, Debug, SmartDefault, clap::Args)]
#[group(skip)]
pub struct Cli {
    /// Verbosity of an output.
    ///
    /// `-v` additionally outputs the log of the runner, `-vv` additionally
    /// outputs every started item.
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Coloring policy for a console output.
    #[arg(
        long,
        value_name = "auto|always|never",
        default_value = "auto",
        global = true
    )]
    #[default(Coloring::Auto)]
    pub color: Coloring,
}

/// Possible policies of a [`console`] output coloring.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Coloring {
    /// Letting [`console::colors_enabled()`] to decide, whether output should
    /// be colored.
    Auto,

    /// Forcing of a colored output.
    Always,

    /// Forcing of a non-colored output.
    Never,
}

impl FromStr for Coloring {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            _ => Err("possible options: auto, always, never"),
        }
    }
}

/// Numbers of items per terminal state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Number of passed items.
    pub passed: usize,

    /// Number of failed items.
    pub failed: usize,

    /// Number of skipped items.
    pub skipped: usize,

    /// Number of items errored by a runner failure.
    pub errored: usize,
}

impl Stats {
    /// Returns the total number of items finished.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errored
    }

    /// Indicates whether any item failed or errored.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }
}

/// [`TestRun`] printing the outcome of every item, followed by a summary.
#[derive(Debug)]
pub struct Console<Out = io::Stdout> {
    output: Out,
    styles: Styles,
    verbose: u8,
    stats: Stats,
}

impl Console {
    /// Creates a new [`Console`] printing to the stdout.
    #[must_use]
    pub fn stdout(cli: Cli) -> Self {
        Self::new(io::stdout(), cli)
    }
}

impl<Out: io::Write> Console<Out> {
    /// Creates a new [`Console`] printing to the given `output`.
    #[must_use]
    pub fn new(output: Out, cli: Cli) -> Self {
        let mut styles = Styles::new();
        match cli.color {
            Coloring::Always => styles.is_present = true,
            Coloring::Never => styles.is_present = false,
            Coloring::Auto => {}
        }
        Self { output, styles, verbose: cli.verbose, stats: Stats::default() }
    }

    /// Returns the [`Stats`] collected so far.
    #[must_use]
    pub const fn stats(&self) -> Stats {
        self.stats
    }

    /// Returns the output of this [`Console`].
    pub fn into_inner(self) -> Out {
        self.output
    }

    /// Formats the [`Stats`] collected so far.
    #[must_use]
    pub fn summary(&self) -> String {
        let s = &self.styles;
        let stats = [
            (self.stats.passed, "passed", &s.ok),
            (self.stats.failed, "failed", &s.err),
            (self.stats.skipped, "skipped", &s.skipped),
            (self.stats.errored, "errored", &s.err),
        ]
        .into_iter()
        .filter(|(n, ..)| *n > 0)
        .map(|(n, what, style)| {
            let text = format!("{n} {what}");
            if s.is_present {
                style.apply_to(text).bold().to_string()
            } else {
                text
            }
        })
        .join(", ");

        let total = self.stats.total();
        let items = s.bold(format!(
            "{total} item{}",
            if total == 1 { "" } else { "s" },
        ));
        let stats = if stats.is_empty() {
            String::new()
        } else {
            format!(" ({stats})")
        };
        format!("{}\n{items}{stats}", s.bold(s.header("[Summary]")))
    }

    fn write(&mut self, text: impl AsRef<str>) {
        if let Err(e) = self.output.write_str(text) {
            tracing::error!("Failed to write: {e}");
        }
    }

    fn write_line(&mut self, text: impl AsRef<str>) {
        if let Err(e) = self.output.write_line(text) {
            tracing::error!("Failed to write: {e}");
        }
    }

    fn finished(
        &mut self,
        mark: Cow<'_, str>,
        item: &TestItem,
        duration: Option<Duration>,
    ) {
        let duration = duration
            .map(|d| {
                let d = Duration::from_millis(
                    u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
                );
                format!(" ({})", humantime::format_duration(d))
            })
            .unwrap_or_default();
        let line = format!("{mark} {}{duration}", item.label);
        self.write_line(line);
    }

    fn message(&mut self, message: &TestMessage) {
        let text = message
            .message
            .lines()
            .map(|l| format!("    {l}"))
            .join("\n");
        let text = self.styles.err(text).into_owned();
        self.write_line(text);
        if let Some(location) = &message.location {
            let line = format!(
                "    at {}:{}:{}",
                location.uri.display(),
                location.range.start.line + 1,
                location.range.start.character + 1,
            );
            self.write_line(line);
        }
    }
}

impl<Out: io::Write> TestRun for Console<Out> {
    fn enqueued(&mut self, _: &TestItem) {}

    fn started(&mut self, item: &TestItem) {
        if self.verbose > 1 {
            let line = self.styles.header(format!("> {}", item.label));
            let line = line.into_owned();
            self.write_line(line);
        }
    }

    fn passed(&mut self, item: &TestItem, duration: Duration) {
        self.stats.passed += 1;
        let mark = self.styles.ok("✔").into_owned();
        self.finished(mark.into(), item, Some(duration));
    }

    fn failed(
        &mut self,
        item: &TestItem,
        messages: Vec<TestMessage>,
        duration: Duration,
    ) {
        self.stats.failed += 1;
        let mark = self.styles.err("✘").into_owned();
        self.finished(mark.into(), item, Some(duration));
        for message in &messages {
            self.message(message);
        }
    }

    fn skipped(&mut self, item: &TestItem) {
        self.stats.skipped += 1;
        let mark = self.styles.skipped("-").into_owned();
        self.finished(mark.into(), item, None);
    }

    fn errored(
        &mut self,
        item: &TestItem,
        message: TestMessage,
        duration: Option<Duration>,
    ) {
        self.stats.errored += 1;
        let mark = self.styles.err("!").into_owned();
        self.finished(mark.into(), item, duration);
        self.message(&message);
    }

    fn append_output(&mut self, text: &str) {
        if self.verbose > 0 {
            self.write(text.replace("\r\n", "\n"));
        }
    }

    fn debugger_listening(&mut self, url: &str) {
        let line = self.styles.header(format!("Debugger listening on {url}"));
        let line = line.into_owned();
        self.write_line(line);
    }

    fn end(&mut self) {
        let summary = self.summary();
        self.write_line("");
        self.write_line(summary);
        _ = self.output.flush();
    }
}
