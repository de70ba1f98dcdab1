// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI (command line interface) of the `cucumber-explorer` binary.

use std::{
    io::{self, Write as _},
    path::PathBuf,
    rc::Rc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{
    filter::LevelFilter,
    layer::{Layer as _, SubscriberExt as _},
    util::SubscriberInitExt as _,
};

use crate::{
    config::{FileWatch, JsonFileSettings, NotifyWatch},
    run::RunRequest,
    runner::ConfigLoader,
    tree::{ItemId, MemoryTree, TestTree as _},
    writer::{console, Console, Styles},
    Cancellation, ConfigPipeline, Controller, Cucumber,
};

/// Root CLI of the `cucumber-explorer` binary.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "cucumber-explorer",
    about = "Discover and run Cucumber scenarios of JavaScript projects."
)]
pub struct Opts {
    /// Workspace root to explore. May be repeated.
    ///
    /// Defaults to the current directory.
    #[arg(
        id = "workspace",
        long = "workspace",
        short = 'w',
        value_name = "dir",
        global = true
    )]
    pub workspaces: Vec<PathBuf>,

    /// Settings file, relative to every workspace root.
    #[arg(
        long,
        value_name = "path",
        default_value = JsonFileSettings::DEFAULT_PATH,
        global = true
    )]
    pub settings: PathBuf,

    /// Console output options.
    #[command(flatten)]
    pub writer: console::Cli,

    /// Action to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// Action of the `cucumber-explorer` binary.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Discover test cases and print their tree.
    List,

    /// Run test cases, printing their outcomes.
    Run(RunOpts),
}

/// Options of the [`Command::Run`].
#[derive(Clone, Debug, Default, Args)]
pub struct RunOpts {
    /// Start the runner with an inspector attached.
    #[arg(long)]
    pub debug: bool,

    /// Item to exclude, along with its descendants. May be repeated.
    #[arg(long, short = 'x', value_name = "item")]
    pub exclude: Vec<String>,

    /// Time after which the run is cancelled.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration
    )]
    pub timeout: Option<Duration>,

    /// Items to run, as printed by `list`. Everything by default.
    #[arg(value_name = "item")]
    pub items: Vec<String>,
}

impl Opts {
    /// Shortcut for [`clap::Parser::parse()`], which doesn't require the trait
    /// being imported.
    #[must_use]
    pub fn parsed() -> Self {
        <Self as Parser>::parse()
    }

    /// Returns the [`LevelFilter`] of diagnostic logs for the verbosity of
    /// these [`Opts`].
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        match self.writer.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Returns the [`RunRequest`] of the [`Command::Run`], if it is one.
    #[must_use]
    pub fn run_request(&self) -> Option<RunRequest> {
        let Command::Run(run) = &self.command else {
            return None;
        };
        let ids = |items: &[String]| {
            items.iter().map(|id| ItemId::new(id.as_str())).collect::<Vec<_>>()
        };
        Some(RunRequest {
            include: (!run.items.is_empty()).then(|| ids(run.items.as_slice())),
            exclude: ids(run.exclude.as_slice()),
        })
    }
}

/// Initializes a global [`tracing::Subscriber`] writing to the stderr with
/// the given `level`.
pub fn init_tracing(level: LevelFilter) {
    tracing_subscriber::registry()
        .with(
            level.and_then(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            ),
        )
        .init();
}

/// Executes the given [`Opts`].
///
/// Returns whether everything passed.
///
/// # Errors
///
/// If the current directory cannot be determined.
pub async fn execute(opts: Opts) -> crate::Result<bool> {
    let cwd = std::env::current_dir()?;
    let workspaces = if opts.workspaces.is_empty() {
        vec![cwd]
    } else {
        opts.workspaces.iter().map(|ws| cwd.join(ws)).collect()
    };

    let cucumber = Rc::new(Cucumber::new());
    let watch: Rc<dyn FileWatch> = Rc::new(NotifyWatch);
    let pipeline = ConfigPipeline::new(
        workspaces,
        Rc::new(JsonFileSettings::new(&opts.settings)),
        Rc::clone(&cucumber) as Rc<dyn ConfigLoader>,
        Rc::clone(&watch),
    );

    let mut controllers = vec![];
    for instance in pipeline.instances().read().unwrap_or_default() {
        let controller = Controller::new(
            instance,
            MemoryTree::new(),
            Rc::clone(&cucumber),
            Rc::clone(&watch),
        );
        if let Err(e) = controller.resolve().await {
            tracing::debug!(instance = %controller.instance().name(), "{e}");
        }
        controller.discovered().await;
        controllers.push(controller);
    }

    let mut success = true;
    match &opts.command {
        Command::List => {
            let styles = Styles::new();
            let mut stdout = io::stdout().lock();
            for controller in &controllers {
                let sync = controller.sync().borrow();
                let tree = sync.tree();
                for (depth, item) in tree.walk() {
                    let indent = "  ".repeat(depth);
                    let mut line = format!("{indent}{}", item.label);
                    if depth > 0 {
                        line.push_str(&format!(" [{}]", item.id));
                    }
                    if let Some(err) = tree.error(&item.id) {
                        success = false;
                        line.push_str(&format!(" {}", styles.err(err)));
                    }
                    writeln!(stdout, "{line}")?;
                }
            }
        }
        Command::Run(run) => {
            let request = opts.run_request().unwrap_or_default();
            let cancellation = Cancellation::new();
            if let Some(timeout) = run.timeout {
                let cancellation = cancellation.clone();
                drop(tokio::task::spawn_local(async move {
                    tokio::time::sleep(timeout).await;
                    tracing::warn!("run timed out");
                    cancellation.cancel();
                }));
            }
            for controller in &controllers {
                let mut console = Console::stdout(opts.writer);
                let label = {
                    let sync = controller.sync().borrow();
                    request.label(sync.tree())
                };
                tracing::info!(
                    instance = %controller.instance().name(),
                    %label,
                    "running",
                );
                controller
                    .run(&request, run.debug, &mut console, &cancellation)
                    .await;
                success &= !console.stats().has_failures();
            }
        }
    }

    for controller in &controllers {
        controller.dispose();
    }
    pipeline.dispose();
    Ok(success)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser as _;
    use tracing_subscriber::filter::LevelFilter;

    use crate::tree::ItemId;

    use super::{Command, Opts};

    #[test]
    fn parses_run_command() {
        let opts = Opts::try_parse_from([
            "cucumber-explorer",
            "-vv",
            "--workspace",
            "app",
            "run",
            "--debug",
            "--timeout",
            "2m",
            "-x",
            "features/slow.feature",
            "features",
        ])
        .unwrap();

        assert_eq!(opts.log_level(), LevelFilter::DEBUG);
        assert_eq!(opts.workspaces.len(), 1);
        let Command::Run(run) = &opts.command else {
            panic!("expected `run`, got {:?}", opts.command);
        };
        assert!(run.debug);
        assert_eq!(run.timeout, Some(Duration::from_secs(120)));

        let request = opts.run_request().unwrap();
        assert_eq!(request.include, Some(vec![ItemId::new("features")]));
        assert_eq!(request.exclude, [ItemId::new("features/slow.feature")]);
    }

    #[test]
    fn run_without_items_runs_everything() {
        let opts =
            Opts::try_parse_from(["cucumber-explorer", "run"]).unwrap();

        assert_eq!(opts.run_request().unwrap().include, None);
        assert_eq!(opts.log_level(), LevelFilter::WARN);
    }

    #[test]
    fn list_has_no_run_request() {
        let opts =
            Opts::try_parse_from(["cucumber-explorer", "list"]).unwrap();

        assert!(matches!(opts.command, Command::List));
        assert!(opts.run_request().is_none());
    }
}
