//! Operator confirmation for destructive actions

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;
use std::io::{BufRead, IsTerminal, Write};

/// Asks the operator a yes/no question; anything but an explicit yes is "no"
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Only `y` and `yes` (any case, surrounding whitespace ignored) are affirmative
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// Prompt on the controlling terminal, or read a line from piped stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let prompt = format!("{prompt} [y/N]");

        if std::io::stdin().is_terminal() {
            let answer: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
                .context("Failed to read confirmation")?;
            return Ok(is_affirmative(&answer));
        }

        print!("{prompt} ");
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation from stdin")?;
        Ok(is_affirmative(&answer))
    }
}

/// Answers yes to everything (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}
