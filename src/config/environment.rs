// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Composition of the runner environment.

use std::{path::Path, sync::Arc};

use futures::future;

use crate::{runner::Env, Cancellation};

use super::Error;

/// Parses the given env file `contents`.
///
/// # Errors
///
/// If the `contents` are malformed.
pub fn parse_env_file(contents: &[u8]) -> Result<Env, dotenvy::Error> {
    dotenvy::from_read_iter(contents).collect()
}

/// Composes the environment overlay of the runner out of the inline `env`
/// variables and the given `env_files` (relative to the `base` path).
///
/// Files are merged in the listed order, later ones winning. Inline
/// variables are applied last, so they win over any file.
///
/// Returns [`None`] if there are neither inline variables nor env files.
///
/// # Errors
///
/// - [`Error::Io`] if an env file cannot be read;
/// - [`Error::EnvFile`] if an env file is malformed;
/// - [`Error::Cancelled`] if the `cancellation` is requested after any file
///   has been read.
pub async fn read_env(
    env: Option<&Env>,
    base: &Path,
    env_files: Option<&[String]>,
    cancellation: &Cancellation,
) -> Result<Option<Env>, Error> {
    let env_files = env_files.unwrap_or_default();
    if env.is_none() && env_files.is_empty() {
        return Ok(None);
    }

    let parsed = future::try_join_all(env_files.iter().map(|file| async move {
        let path = base.join(file);
        tracing::debug!(path = %path.display(), "reading env file");

        let contents = tokio::fs::read(&path).await.map_err(|e| Error::Io {
            path: path.clone(),
            source: Arc::new(e),
        })?;
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        parse_env_file(&contents)
            .map_err(|e| Error::EnvFile { path, source: Arc::new(e) })
    }))
    .await?;

    let mut out = Env::new();
    for vars in parsed {
        out.extend(vars);
    }
    if let Some(env) = env {
        out.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{config::Error, runner::Env, Cancellation};

    use super::{parse_env_file, read_env};

    fn env(pairs: &[(&str, &str)]) -> Env {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parses_dotenv_syntax() {
        let parsed =
            parse_env_file(b"# comment\nA=1\nB=\"two words\"\n").unwrap();

        assert_eq!(parsed, env(&[("A", "1"), ("B", "two words")]));
    }

    #[tokio::test]
    async fn nothing_to_compose() {
        let dir = tempfile::tempdir().unwrap();

        let composed =
            read_env(None, dir.path(), Some(&[]), &Cancellation::new())
                .await
                .unwrap();

        assert_eq!(composed, None);
    }

    #[tokio::test]
    async fn later_files_win_and_inline_wins_over_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=base\nB=base\nC=base\n").unwrap();
        fs::write(dir.path().join(".env.local"), "B=local\n").unwrap();
        let inline = env(&[("C", "inline")]);
        let files = [".env".to_owned(), ".env.local".to_owned()];

        let composed = read_env(
            Some(&inline),
            dir.path(),
            Some(&files),
            &Cancellation::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            composed,
            Some(env(&[("A", "base"), ("B", "local"), ("C", "inline")])),
        );
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let files = ["absent.env".to_owned()];

        let err = read_env(None, dir.path(), Some(&files), &Cancellation::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io { .. }), "unexpected: {err}");
    }

    #[tokio::test]
    async fn cancellation_aborts_without_partial_result() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=1\n").unwrap();
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let files = [".env".to_owned()];

        let err = read_env(None, dir.path(), Some(&files), &cancellation)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
