//! Response sink enforcing the shell-first write protocol.

use std::fmt::Display;
use std::time::Instant;

use futures::{Sink, SinkExt};
use pagelet_core::{LifecyclePhase, PageletError, TimingContext};

use crate::flush::FlushPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing written yet.
    Initial,
    /// Shell written, fragments may follow.
    ShellSent,
    /// Response closed.
    Closed,
}

/// Writes one pagelet response.
///
/// The shell must be written before any fragment. Every fragment the engine
/// dispatches is announced with [`FragmentSink::expect`]; [`FragmentSink::end`]
/// only closes the response once all announced fragments have been written.
///
/// Generic over any `Sink<Vec<u8>>`, so a channel sender or an HTTP body
/// writer can sit underneath.
pub struct FragmentSink<S> {
    inner: S,
    state: SinkState,
    policy: FlushPolicy,
    timing: TimingContext,
    outstanding: usize,
    fragments_sent: Vec<String>,
}

impl<S> FragmentSink<S>
where
    S: Sink<Vec<u8>> + Unpin,
    S::Error: Display,
{
    pub fn new(sink: S, policy: FlushPolicy) -> Self {
        Self {
            inner: sink,
            state: SinkState::Initial,
            policy,
            timing: TimingContext::new(),
            outstanding: 0,
            fragments_sent: Vec::new(),
        }
    }

    /// Write the shell. Must come first and only once.
    ///
    /// An empty shell opens the response without writing anything.
    pub async fn send_shell(&mut self, html: &str) -> Result<(), PageletError> {
        if self.state != SinkState::Initial {
            return Err(PageletError::Stream(
                "Shell already sent or response closed".to_string(),
            ));
        }

        if !html.is_empty() {
            self.write(html.as_bytes().to_vec(), self.policy.flush_after_shell())
                .await?;
        }
        self.timing.mark_shell_sent();
        self.state = SinkState::ShellSent;
        tracing::debug!(bytes = html.len(), "shell sent");

        Ok(())
    }

    /// Announce `count` more fragments that must be written before close.
    pub fn expect(&mut self, count: usize) {
        self.outstanding += count;
    }

    /// Write one fragment and settle one outstanding slot.
    pub async fn send_fragment(&mut self, name: &str, html: &str) -> Result<(), PageletError> {
        self.ensure_open()?;

        let started = Instant::now();
        self.write(html.as_bytes().to_vec(), self.policy.flush_after_fragment())
            .await?;
        self.fragments_sent.push(name.to_string());
        self.outstanding = self.outstanding.saturating_sub(1);
        self.timing.mark_fragment_sent(name, started, self.outstanding);
        tracing::debug!(pagelet = name, outstanding = self.outstanding, "fragment sent");

        Ok(())
    }

    /// Write markup after the shell that does not settle a fragment slot.
    /// Flushed like a fragment; empty markup writes nothing.
    pub async fn send_raw(&mut self, bytes: Vec<u8>) -> Result<(), PageletError> {
        self.ensure_open()?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.write(bytes, self.policy.flush_after_fragment()).await
    }

    /// Close the response with `closing` as the last write.
    ///
    /// Returns `Ok(false)` without writing anything while fragments are
    /// still outstanding, `Ok(true)` once the response is closed. Closing an
    /// already closed response is a no-op that returns `Ok(true)`.
    pub async fn end(&mut self, closing: &str) -> Result<bool, PageletError> {
        match self.state {
            SinkState::Closed => return Ok(true),
            SinkState::Initial => return Err(PageletError::ShellNotSent),
            SinkState::ShellSent => {}
        }
        if self.outstanding > 0 {
            return Ok(false);
        }

        if !closing.is_empty() {
            self.write(closing.as_bytes().to_vec(), false).await?;
        }
        self.inner.close().await.map_err(stream_error)?;
        self.state = SinkState::Closed;
        self.timing.mark_complete();
        tracing::debug!(fragments = self.fragments_sent.len(), "response closed");

        Ok(true)
    }

    /// Fragments still to be written before close.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_closed(&self) -> bool {
        self.state == SinkState::Closed
    }

    /// Names of the fragments written so far, in write order.
    pub fn fragments_sent(&self) -> &[String] {
        &self.fragments_sent
    }

    pub fn phase(&self) -> LifecyclePhase {
        match (self.state, self.fragments_sent.last()) {
            (SinkState::Initial, _) => LifecyclePhase::Start,
            (SinkState::ShellSent, None) => LifecyclePhase::ShellSent,
            (SinkState::ShellSent, Some(last)) => LifecyclePhase::FragmentSent(last.clone()),
            (SinkState::Closed, _) => LifecyclePhase::Completion,
        }
    }

    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    fn ensure_open(&self) -> Result<(), PageletError> {
        match self.state {
            SinkState::Initial => Err(PageletError::ShellNotSent),
            SinkState::Closed => Err(PageletError::Stream("Response already closed".to_string())),
            SinkState::ShellSent => Ok(()),
        }
    }

    async fn write(&mut self, bytes: Vec<u8>, flush: bool) -> Result<(), PageletError> {
        self.inner.feed(bytes).await.map_err(stream_error)?;
        if flush {
            self.inner.flush().await.map_err(stream_error)?;
        }
        Ok(())
    }
}

fn stream_error<E: Display>(err: E) -> PageletError {
    PageletError::Stream(err.to_string())
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use futures::StreamExt;

    use super::*;

    fn sink() -> (
        FragmentSink<mpsc::UnboundedSender<Vec<u8>>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let (tx, rx) = mpsc::unbounded();
        (FragmentSink::new(tx, FlushPolicy::default()), rx)
    }

    async fn written(rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<String> {
        rx.map(|b| String::from_utf8(b).unwrap()).collect().await
    }

    // === Protocol Tests ===

    #[tokio::test]
    async fn test_fragment_before_shell_is_rejected() {
        let (mut sink, _rx) = sink();

        let err = sink.send_fragment("a", "<a/>").await.unwrap_err();
        assert!(matches!(err, PageletError::ShellNotSent));
        assert_eq!(sink.phase(), LifecyclePhase::Start);
    }

    #[tokio::test]
    async fn test_shell_only_once() {
        let (mut sink, _rx) = sink();

        sink.send_shell("<html>").await.unwrap();
        assert!(sink.send_shell("<html>").await.is_err());
        assert_eq!(sink.phase(), LifecyclePhase::ShellSent);
        assert!(sink.timing().time_to_shell().is_some());
    }

    // === Outstanding Gate Tests ===

    #[tokio::test]
    async fn test_end_waits_for_outstanding_fragments() {
        let (mut sink, rx) = sink();

        sink.send_shell("<html>").await.unwrap();
        sink.expect(2);
        sink.send_fragment("a", "<a/>").await.unwrap();
        assert!(!sink.end("</html>").await.unwrap());
        assert_eq!(sink.outstanding(), 1);

        sink.send_fragment("b", "<b/>").await.unwrap();
        assert_eq!(sink.phase(), LifecyclePhase::FragmentSent("b".to_string()));
        assert!(sink.end("</html>").await.unwrap());
        assert!(sink.is_closed());
        assert!(sink.end("</html>").await.unwrap());

        assert_eq!(written(rx).await, vec!["<html>", "<a/>", "<b/>", "</html>"]);
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let (mut sink, _rx) = sink();

        sink.send_shell("<html>").await.unwrap();
        sink.end("").await.unwrap();

        assert!(matches!(
            sink.send_fragment("late", "<p/>").await,
            Err(PageletError::Stream(_))
        ));
        assert_eq!(sink.phase(), LifecyclePhase::Completion);
        assert!(sink.timing().time_to_complete().is_some());
    }

    // === Raw Write Tests ===

    #[tokio::test]
    async fn test_raw_write_does_not_settle_fragments() {
        let (mut sink, rx) = sink();

        assert!(matches!(
            sink.send_raw(b"<main>".to_vec()).await,
            Err(PageletError::ShellNotSent)
        ));

        sink.send_shell("").await.unwrap();
        sink.expect(1);
        sink.send_raw(b"<main>".to_vec()).await.unwrap();
        sink.send_raw(Vec::new()).await.unwrap();
        assert_eq!(sink.outstanding(), 1);
        assert!(sink.fragments_sent().is_empty());

        sink.send_fragment("a", "<a/>").await.unwrap();
        assert!(sink.end("").await.unwrap());

        assert_eq!(written(rx).await, vec!["<main>", "<a/>"]);
    }

    #[tokio::test]
    async fn test_fragment_timing_records_remaining() {
        let (mut sink, _rx) = sink();

        sink.send_shell("<html>").await.unwrap();
        sink.expect(2);
        sink.send_fragment("a", "<a/>").await.unwrap();
        sink.send_fragment("b", "<b/>").await.unwrap();

        let remaining: Vec<usize> = sink.timing().fragments().map(|f| f.remaining).collect();
        assert_eq!(remaining, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_end_before_shell_is_an_error() {
        let (mut sink, _rx) = sink();
        assert!(matches!(sink.end("").await, Err(PageletError::ShellNotSent)));
    }

    #[tokio::test]
    async fn test_closed_receiver_surfaces_stream_error() {
        let (mut sink, rx) = sink();
        drop(rx);

        assert!(matches!(
            sink.send_shell("<html>").await,
            Err(PageletError::Stream(_))
        ));
    }
}
