//! Speech input and output
//!
//! Recognition and synthesis are collaborators behind two ports:
//! - [`SpeechInput`] yields recognized utterances, one listening session at a time
//! - [`SpeechOutput`] renders text as speech
//!
//! [`Speaker`] adds the mute flag and replace semantics on top of an output;
//! [`ListenLoop`] turns an input into a supervised, cancellable stream.

mod console;
mod listen;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SpeechConfig;

pub use console::{ConsoleVoice, StdinInput};
pub use listen::{Backoff, ListenLoop};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input is gone for good; listening must stop
    #[error("Speech input closed")]
    Closed,
}

/// Source of recognized utterances
#[async_trait]
pub trait SpeechInput: Send {
    /// Wait for the next utterance. `Ok(None)` ends the current listening
    /// session; the caller starts a new one.
    async fn listen(&mut self) -> Result<Option<String>, SpeechError>;
}

/// Text-to-speech sink
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Resolves once the text has been spoken
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Completed,
    /// Replaced by a newer `speak` call before finishing
    Interrupted,
}

/// Speech output with a mute flag. A new `speak` interrupts the one in
/// flight instead of queueing behind it.
pub struct Speaker {
    output: Arc<dyn SpeechOutput>,
    muted: AtomicBool,
    muted_delay: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl Speaker {
    pub fn new(output: Arc<dyn SpeechOutput>, config: &SpeechConfig) -> Self {
        Self {
            output,
            muted: AtomicBool::new(config.muted),
            muted_delay: Duration::from_millis(config.muted_delay_ms),
            current: Mutex::new(None),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        tracing::debug!(muted, "Speech mute toggled");
    }

    /// Speak `text`, cancelling whatever is currently being spoken. When
    /// muted, resolves after the configured delay without producing sound.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome, SpeechError> {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        if self.is_muted() {
            tokio::select! {
                _ = token.cancelled() => return Ok(SpeakOutcome::Interrupted),
                _ = tokio::time::sleep(self.muted_delay) => return Ok(SpeakOutcome::Completed),
            }
        }

        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Speech interrupted by a newer request");
                Ok(SpeakOutcome::Interrupted)
            }
            result = self.output.speak(text) => {
                result?;
                Ok(SpeakOutcome::Completed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    /// Takes ten seconds per utterance and records what it finished
    #[derive(Default)]
    struct SlowVoice {
        started: AtomicU32,
        finished: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechOutput for SlowVoice {
        async fn speak(&self, text: &str) -> Result<(), SpeechError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.finished.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_muted_speak_resolves_after_delay() {
        let voice = Arc::new(SlowVoice::default());
        let speaker = Speaker::new(
            voice.clone(),
            &SpeechConfig {
                muted: true,
                muted_delay_ms: 500,
            },
        );

        let start = tokio::time::Instant::now();
        let outcome = speaker.speak("hola").await.unwrap();

        assert_eq!(outcome, SpeakOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(voice.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_speak_interrupts_previous() {
        let voice = Arc::new(SlowVoice::default());
        let speaker = Arc::new(Speaker::new(voice.clone(), &SpeechConfig::default()));

        let first = {
            let speaker = speaker.clone();
            tokio::spawn(async move { speaker.speak("uno").await })
        };
        while voice.started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = speaker.speak("dos").await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, SpeakOutcome::Interrupted);
        assert_eq!(second, SpeakOutcome::Completed);
        assert_eq!(*voice.finished.lock().unwrap(), vec!["dos".to_string()]);
    }

    #[test]
    fn test_mute_toggle() {
        let speaker = Speaker::new(Arc::new(SlowVoice::default()), &SpeechConfig::default());
        assert!(!speaker.is_muted());

        speaker.set_muted(true);
        assert!(speaker.is_muted());
        speaker.set_muted(false);
        assert!(!speaker.is_muted());
    }
}
