// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cooperative cancellation signal shared by long-running operations.

use std::{fmt, sync::Arc};

use tokio::sync::watch;

/// Shared cancellation signal.
///
/// Clones observe the same signal. Once [`Cancellation::cancel()`] is called
/// it stays cancelled forever.
#[derive(Clone)]
pub struct Cancellation {
    state: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    /// Creates a new, not yet cancelled, [`Cancellation`].
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { state: Arc::new(sender) }
    }

    /// Requests cancellation, waking up everyone awaiting
    /// [`Cancellation::cancelled()`].
    pub fn cancel(&self) {
        drop(self.state.send_replace(true));
    }

    /// Indicates whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        while !*receiver.borrow_and_update() {
            // The sender lives as long as `self`, so this can't fail.
            if receiver.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
