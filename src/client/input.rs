//! Interactive multi-line input for the client.
//!
//! Lines are collected until an empty line, which sends the collected text
//! as one payload. Two lines are commands rather than code:
//!
//! - `\q` abandons input (the client then closes)
//! - `\c` clears what has been typed so far and starts over
//!
//! An empty line with nothing typed also ends input.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::constants::{INPUT_CLEAR, INPUT_QUIT};

/// Result of feeding one line to [`MultilineInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Keep reading lines.
    Continue,
    /// A complete message is ready to send.
    Submit(String),
    /// The user is done; no more messages.
    Abort,
}

/// Line-by-line message assembly, independent of where lines come from.
#[derive(Debug, Default)]
pub struct MultilineInput {
    buffer: Vec<String>,
}

impl MultilineInput {
    /// Create an empty input buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompt to show before the next line.
    pub fn prompt(&self) -> &'static str {
        if self.buffer.is_empty() {
            "Send:\n "
        } else {
            " "
        }
    }

    /// Feed one line (without its newline).
    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        match line {
            INPUT_QUIT => {
                self.buffer.clear();
                LineOutcome::Abort
            }
            INPUT_CLEAR => {
                self.buffer.clear();
                LineOutcome::Continue
            }
            "" if self.buffer.is_empty() => LineOutcome::Abort,
            "" => LineOutcome::Submit(std::mem::take(&mut self.buffer).join("\n")),
            _ => {
                self.buffer.push(line.to_string());
                LineOutcome::Continue
            }
        }
    }
}

/// Reads messages from a line-oriented async source (normally stdin).
#[derive(Debug)]
pub struct InteractiveInput<R> {
    lines: Lines<BufReader<R>>,
    state: MultilineInput,
    show_prompt: bool,
}

impl InteractiveInput<tokio::io::Stdin> {
    /// Read from stdin, printing prompts to stdout.
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), true)
    }
}

impl<R> InteractiveInput<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader.
    pub fn new(reader: R, show_prompt: bool) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            state: MultilineInput::new(),
            show_prompt,
        }
    }

    /// Next message to send, or `None` once the user is done.
    ///
    /// End of input counts as done; a partially typed message is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source or writing the prompt fails.
    pub async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            if self.show_prompt {
                print!("{}", self.state.prompt());
                std::io::stdout().flush()?;
            }

            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };

            match self.state.push_line(line.trim_end_matches('\r')) {
                LineOutcome::Continue => {}
                LineOutcome::Submit(message) => return Ok(Some(message)),
                LineOutcome::Abort => return Ok(None),
            }
        }
    }
}
