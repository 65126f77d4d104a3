//! Supervised listening loop

use async_stream::stream;
use futures::Stream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{SpeechError, SpeechInput};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Doubling restart delay, capped
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following one doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Keeps a [`SpeechInput`] listening until cancelled or closed.
///
/// Ended sessions restart straight away; errors restart after a
/// [`Backoff`] delay that resets once an utterance comes through.
pub struct ListenLoop {
    input: Box<dyn SpeechInput>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl ListenLoop {
    pub fn new(input: Box<dyn SpeechInput>, cancel: CancellationToken) -> Self {
        Self {
            input,
            backoff: Backoff::default(),
            cancel,
        }
    }

    /// Recognized, non-blank utterances as a lazy stream
    pub fn into_stream(self) -> impl Stream<Item = String> + Send {
        let ListenLoop {
            mut input,
            mut backoff,
            cancel,
        } = self;

        stream! {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = input.listen() => next,
                };

                match next {
                    Ok(Some(utterance)) => {
                        backoff.reset();
                        let utterance = utterance.trim().to_string();
                        if !utterance.is_empty() {
                            yield utterance;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Listening session ended, restarting");
                    }
                    Err(SpeechError::Closed) => {
                        tracing::info!("Speech input closed");
                        break;
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "Listening failed, restarting");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
            tracing::debug!("Listen loop stopped");
        }
    }
}
