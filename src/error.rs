// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Consolidated error type of this crate.

use std::io;

use derive_more::{Display, Error, From};

use crate::{config, event::DecodeError, navigator, runner, tree};

/// Top-level error of any operation of this crate.
///
/// Every module has its own error type, this one merely unifies them for
/// hosts not interested in the exact origin.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Record cannot be decoded.
    #[display("{_0}")]
    Decode(DecodeError),

    /// Event log is malformed.
    #[display("Malformed event log: {_0}")]
    Navigation(navigator::Error),

    /// Discovered entities cannot be mounted into a tree.
    #[display("{_0}")]
    Tree(tree::Error),

    /// External runner failed.
    #[display("{_0}")]
    Runner(runner::Error),

    /// Configuration cannot be resolved.
    #[display("{_0}")]
    Config(config::Error),

    /// I/O operation failed.
    #[display("I/O operation failed: {_0}")]
    Io(io::Error),
}

impl Error {
    /// Indicates whether this error means cancellation, rather than a real
    /// failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        match self {
            Self::Runner(e) => e.is_cancelled(),
            Self::Config(e) => e.is_cancelled(),
            Self::Decode(_)
            | Self::Navigation(_)
            | Self::Tree(_)
            | Self::Io(_) => false,
        }
    }
}

/// Alias of a [`Result`](std::result::Result) with the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use crate::{config, runner};

    use super::Error;

    #[test]
    fn converts_module_errors() {
        let err = Error::from(config::Error::Runner(runner::Error::Cancelled));

        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Cancelled");
    }

    #[test]
    fn real_failures_are_not_cancellation() {
        let err = Error::from(runner::Error::InvalidConfigToken);

        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "Invalid config token");
    }
}
