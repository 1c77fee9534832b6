//! Push-only channel for streamed answers.
//!
//! Every channel delivers exactly one `done`: on `finish`, or on drop if the
//! producer never finished (upstream error, early return, panic). Sends to a
//! disconnected caller are discarded.

use crate::types::StreamEvent;
use tokio::sync::mpsc;

/// Producer side of a streamed answer.
#[derive(Debug)]
pub struct StreamChannel {
    tx: mpsc::UnboundedSender<StreamEvent>,
    finished: bool,
}

impl StreamChannel {
    /// Open a channel; the receiver goes to the caller.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, finished: false }, rx)
    }

    /// Forward one token. Empty tokens are skipped.
    pub fn send_token(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.finished || value.is_empty() {
            return;
        }
        if self.tx.send(StreamEvent::Token { value }).is_err() {
            tracing::debug!("Stream receiver gone, discarding token");
        }
    }

    /// Whether the caller has hung up.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send the terminal `done`.
    pub fn finish(mut self) {
        self.send_done();
    }

    fn send_done(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.tx.send(StreamEvent::Done);
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Stream dropped before finishing, sending done");
        }
        self.send_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn done_count(events: &[StreamEvent]) -> usize {
        events.iter().filter(|e| **e == StreamEvent::Done).count()
    }

    #[test]
    fn test_finish_sends_single_done() {
        let (mut channel, mut rx) = StreamChannel::open();
        channel.send_token("Hel");
        channel.send_token("");
        channel.send_token("lo");
        channel.finish();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token { value: "Hel".to_string() },
                StreamEvent::Token { value: "lo".to_string() },
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_drop_without_finish_sends_done() {
        let (mut channel, mut rx) = StreamChannel::open();
        channel.send_token("partial");
        drop(channel);

        let events = drain(&mut rx);
        assert_eq!(done_count(&events), 1);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_panicking_producer_still_sends_done() {
        let (mut channel, mut rx) = StreamChannel::open();
        let task = tokio::spawn(async move {
            channel.send_token("before");
            panic!("producer failed");
        });
        assert!(task.await.is_err());

        let events = drain(&mut rx);
        assert_eq!(done_count(&events), 1);
    }

    #[test]
    fn test_send_after_disconnect_is_silent() {
        let (mut channel, rx) = StreamChannel::open();
        drop(rx);
        assert!(channel.is_closed());
        channel.send_token("nobody listens");
        channel.finish();
    }
}
