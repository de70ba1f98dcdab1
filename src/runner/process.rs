// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Spawning of external processes.

use std::{
    collections::BTreeMap,
    fmt, io, mem,
    path::PathBuf,
    process::Stdio,
};

use futures::{
    future::LocalBoxFuture,
    stream::{self, LocalBoxStream},
    FutureExt as _, StreamExt as _,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt as _},
    sync::oneshot,
};

/// Environment variables overlay.
pub type Env = BTreeMap<String, String>;

/// Raw chunks of a process output.
pub type ChunkStream = LocalBoxStream<'static, io::Result<Vec<u8>>>;

/// Description of a process to spawn.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Command {
    /// Executable to run, looked up in `PATH`.
    pub program: String,

    /// Arguments passed to the [`Command::program`].
    pub args: Vec<String>,

    /// Working directory of the process.
    pub cwd: PathBuf,

    /// Variables set on top of the host environment.
    pub env: Env,
}

impl Command {
    /// Creates a new [`Command`] running the given `program` in the given
    /// `cwd`.
    #[must_use]
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            cwd: cwd.into(),
            env: Env::new(),
        }
    }

    /// Appends the given argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the environment overlay.
    #[must_use]
    pub fn envs(mut self, env: Env) -> Self {
        self.env = env;
        self
    }
}

/// Exit status of a finished process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Exit {
    /// Exit code, if the process wasn't terminated by a signal.
    pub code: Option<i32>,
}

impl Exit {
    /// Indicates whether the process exited successfully.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Handle to a spawned process.
pub struct Child {
    /// Raw chunks written by the process to its standard output.
    pub stdout: ChunkStream,

    /// Raw chunks written by the process to its standard error.
    pub stderr: ChunkStream,

    /// Resolves once the process exits.
    pub status: LocalBoxFuture<'static, io::Result<Exit>>,

    killer: Option<Box<dyn FnOnce()>>,
}

impl Child {
    /// Creates a new [`Child`] out of its parts.
    ///
    /// The `killer` is called at most once.
    #[must_use]
    pub fn new(
        stdout: ChunkStream,
        stderr: ChunkStream,
        status: LocalBoxFuture<'static, io::Result<Exit>>,
        killer: impl FnOnce() + 'static,
    ) -> Self {
        Self { stdout, stderr, status, killer: Some(Box::new(killer)) }
    }

    /// Takes the output streams out of this [`Child`], leaving empty ones in
    /// their place.
    pub fn take_output(&mut self) -> (ChunkStream, ChunkStream) {
        (
            mem::replace(&mut self.stdout, stream::empty().boxed_local()),
            mem::replace(&mut self.stderr, stream::empty().boxed_local()),
        )
    }

    /// Terminates the process along with its whole process tree.
    ///
    /// Subsequent calls are no-ops.
    pub fn kill(&mut self) {
        if let Some(kill) = self.killer.take() {
            kill();
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Child")
            .field("killed", &self.killer.is_none())
            .finish_non_exhaustive()
    }
}

/// Spawner of external processes.
pub trait ProcessRunner {
    /// Spawns the given `command`.
    ///
    /// # Errors
    ///
    /// If the process cannot be spawned.
    fn spawn(&self, command: Command) -> io::Result<Child>;
}

impl<P: ProcessRunner + ?Sized> ProcessRunner for &P {
    fn spawn(&self, command: Command) -> io::Result<Child> {
        (**self).spawn(command)
    }
}

/// [`ProcessRunner`] spawning real processes with [`tokio::process`].
///
/// Every process is put into its own process group on Unix, so killing it
/// terminates all of its descendants too. The process inherits the host
/// environment as is, with the [`Command::env`] overlay on top of it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn spawn(&self, command: Command) -> io::Result<Child> {
        let mut cmd = tokio::process::Command::new(&command.program);
        _ = cmd
            .args(&command.args)
            .current_dir(&command.cwd)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        let _ = cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "stdout is not piped")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "stderr is not piped")
        })?;
        let pid = child.id();
        tracing::debug!(
            program = %command.program,
            cwd = %command.cwd.display(),
            pid,
            "process spawned",
        );

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let status = async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = kill_rx => None,
            };
            let status = match exited {
                Some(status) => status?,
                None => {
                    _ = child.start_kill();
                    child.wait().await?
                }
            };
            Ok(Exit { code: status.code() })
        };

        let killer = move || {
            #[cfg(unix)]
            if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
                use nix::{
                    sys::signal::{killpg, Signal},
                    unistd::Pid,
                };

                if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                    tracing::warn!(pid, error = %e, "failed to kill process group");
                }
            }
            _ = kill_tx.send(());
        };

        Ok(Child::new(
            read_chunks(stdout),
            read_chunks(stderr),
            status.boxed_local(),
            killer,
        ))
    }
}

/// Turns the given `reader` into a stream of raw chunks, ending after the
/// first error.
fn read_chunks<R>(reader: R) -> ChunkStream
where
    R: AsyncRead + Unpin + 'static,
{
    stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        let mut buf = vec![0; 8 * 1024];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::Exit;

    #[test]
    fn exit_success() {
        assert!(Exit { code: Some(0) }.success());
        assert!(!Exit { code: Some(1) }.success());
        assert!(!Exit { code: None }.success());
    }

    #[cfg(unix)]
    mod unix {
        use std::{
            ffi::OsStr, fs, os::unix::ffi::OsStrExt as _, time::Duration,
        };

        use futures::{StreamExt as _, TryStreamExt as _};
        use nix::{sys::signal::kill, unistd::Pid};

        use crate::runner::{
            lines::Lines,
            process::{
                Command, Env, Exit, ProcessRunner as _, TokioProcessRunner,
            },
        };

        fn sh(script: &str) -> Command {
            Command::new("sh", std::env::temp_dir()).arg("-c").arg(script)
        }

        /// Zombies count as dead.
        fn is_alive(pid: i32) -> bool {
            let zombie = fs::read_to_string(format!("/proc/{pid}/stat"))
                .is_ok_and(|stat| {
                    stat.rsplit(')')
                        .next()
                        .is_some_and(|rest| rest.trim_start().starts_with('Z'))
                });
            !zombie && kill(Pid::from_raw(pid), None).is_ok()
        }

        #[tokio::test]
        async fn inherits_host_env_with_overlay_on_top() {
            std::env::set_var(
                "CUCUMBER_EXPLORER_NOT_UTF8",
                OsStr::from_bytes(b"\xff\xfe"),
            );
            std::env::set_var("CUCUMBER_EXPLORER_HOST_ONLY", "host");
            std::env::set_var("CUCUMBER_EXPLORER_MODE", "host");
            let command = sh(
                r#"printf '%s|%s' "$CUCUMBER_EXPLORER_HOST_ONLY" \
                   "$CUCUMBER_EXPLORER_MODE""#,
            )
            .envs(Env::from([(
                "CUCUMBER_EXPLORER_MODE".to_owned(),
                "overlay".to_owned(),
            )]));

            let mut child = TokioProcessRunner.spawn(command).unwrap();
            let (stdout, _) = child.take_output();
            let out = stdout.try_concat().await.unwrap();

            assert_eq!(String::from_utf8(out).unwrap(), "host|overlay");
            assert!((&mut child.status).await.unwrap().success());
        }

        #[tokio::test]
        async fn kill_terminates_whole_process_tree() {
            let mut child = TokioProcessRunner
                .spawn(sh("sleep 30 & echo $!; wait"))
                .unwrap();
            let (stdout, _) = child.take_output();
            let mut lines = Lines::new(stdout);
            let grandchild = lines
                .next()
                .await
                .unwrap()
                .unwrap()
                .trim()
                .parse::<i32>()
                .unwrap();
            assert!(is_alive(grandchild));

            child.kill();
            let exit = (&mut child.status).await.unwrap();

            assert_eq!(exit, Exit { code: None });
            let reaped = tokio::time::timeout(Duration::from_secs(5), async {
                while is_alive(grandchild) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(reaped.is_ok(), "process {grandchild} survived the kill");
        }
    }
}
