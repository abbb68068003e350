//! Human input read line by line from stdin, for collaboration mode.

use async_trait::async_trait;
use std::io::Write;
use stepwise_core::agent::HumanInput;
use stepwise_core::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub struct StdinInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl HumanInput for StdinInput {
    /// Prompt and wait for one line. EOF closes the input.
    async fn next_input(&self) -> Result<Option<String>, Error> {
        print!("  You > ");
        let _ = std::io::stdout().flush();

        let mut lines = self.lines.lock().await;
        let line = lines
            .next_line()
            .await
            .map_err(|e| Error::Internal(format!("Failed to read stdin: {e}")))?;
        Ok(line.map(|l| l.trim().to_string()))
    }
}
