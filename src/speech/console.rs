//! Terminal stand-ins for the microphone and the speaker

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;

use super::{SpeechError, SpeechInput, SpeechOutput};

/// One typed line per utterance; end of input closes the loop
pub struct StdinInput {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechInput for StdinInput {
    async fn listen(&mut self) -> Result<Option<String>, SpeechError> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(line)),
            None => Err(SpeechError::Closed),
        }
    }
}

/// Writes each reply to stdout under the assistant's name
pub struct ConsoleVoice {
    name: String,
    stdout: Mutex<Stdout>,
}

impl ConsoleVoice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl SpeechOutput for ConsoleVoice {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(format!("🔊 {}: {}\n", self.name, text).as_bytes())
            .await?;
        stdout.flush().await?;
        Ok(())
    }
}
