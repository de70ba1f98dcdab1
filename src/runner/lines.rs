// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Line buffering of raw process output.

use std::{
    collections::VecDeque,
    io, mem,
    pin::Pin,
    task::{ready, Context, Poll},
};

use futures::Stream;
use pin_project::pin_project;

/// Buffer accumulating raw chunks and splitting them into complete lines.
///
/// Lines are terminated with `\n`, an optional preceding `\r` is stripped.
/// Empty lines are dropped.
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Creates a new empty [`LineBuffer`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the given `chunk`, returning all the lines completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return vec![];
        };
        let rest = self.pending.split_off(last + 1);
        let complete = mem::replace(&mut self.pending, rest);
        complete
            .split(|b| *b == b'\n')
            .filter_map(decode)
            .collect()
    }

    /// Takes the trailing incomplete line, if any.
    pub fn flush(&mut self) -> Option<String> {
        decode(&mem::take(&mut self.pending))
    }
}

fn decode(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    (!line.is_empty()).then(|| String::from_utf8_lossy(line).into_owned())
}

/// [`Stream`] of complete lines read out of a [`Stream`] of raw chunks.
#[pin_project]
#[derive(Debug)]
pub struct Lines<S> {
    #[pin]
    chunks: S,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    done: bool,
}

impl<S> Lines<S> {
    /// Wraps the given `chunks` [`Stream`].
    pub fn new(chunks: S) -> Self {
        Self {
            chunks,
            buffer: LineBuffer::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S> Stream for Lines<S>
where
    S: Stream<Item = io::Result<Vec<u8>>>,
{
    type Item = io::Result<String>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if *this.done {
                return Poll::Ready(None);
            }
            match ready!(this.chunks.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.ready.extend(this.buffer.push(&chunk)),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    *this.done = true;
                    this.ready.extend(this.buffer.flush());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt as _, TryStreamExt as _};

    use super::{LineBuffer, Lines};

    #[test]
    fn dispatches_only_complete_lines() {
        let mut buffer = LineBuffer::new();

        assert_eq!(buffer.push(br#"{"a":1}"#), Vec::<String>::new());
        assert_eq!(buffer.push(b"\n{\"b\":"), [r#"{"a":1}"#]);
        assert_eq!(buffer.push(b"2}\n"), [r#"{"b":2}"#]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn strips_carriage_returns_and_drops_empty_lines() {
        let mut buffer = LineBuffer::new();

        assert_eq!(buffer.push(b"one\r\n\r\n\ntwo\n"), ["one", "two"]);
    }

    #[test]
    fn flushes_trailing_partial_line() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.push(b"done").is_empty());
        assert_eq!(buffer.flush().as_deref(), Some("done"));
        assert_eq!(buffer.flush(), None);
    }

    #[tokio::test]
    async fn stream_yields_lines_across_chunks() {
        let chunks = stream::iter([
            Ok(b"{\"a\":1}\n{\"b\":".to_vec()),
            Ok(b"2}\n".to_vec()),
            Ok(b"tail".to_vec()),
        ]);

        let lines = Lines::new(chunks).try_collect::<Vec<_>>().await.unwrap();

        assert_eq!(lines, [r#"{"a":1}"#, r#"{"b":2}"#, "tail"]);
    }

    #[tokio::test]
    async fn stream_surfaces_read_errors() {
        let chunks = stream::iter([
            Ok(b"x\n".to_vec()),
            Err(std::io::Error::other("boom")),
        ]);

        let items = Lines::new(chunks).collect::<Vec<_>>().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
