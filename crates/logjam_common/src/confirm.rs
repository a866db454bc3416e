//! Operator confirmation prompts
//!
//! Decision points ask through `Confirm` so tests can inject answers. When
//! nobody is at the terminal the caller-supplied unattended answer applies,
//! and every caller in this workspace passes `false`.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;
use tracing::info;

pub trait Confirm {
    /// Ask a yes/no question. `unattended` is the answer used when no
    /// operator can respond.
    fn confirm(&self, prompt: &str, unattended: bool) -> bool;
}

/// Prompts on stderr and reads stdin, only when stdin is a terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str, unattended: bool) -> bool {
        if !io::stdin().is_terminal() {
            info!(prompt, answer = unattended, "no terminal, using unattended answer");
            return unattended;
        }

        let mut stderr = io::stderr();
        let _ = write!(stderr, "{} [y/N] ", prompt);
        let _ = stderr.flush();

        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(0) | Err(_) => unattended,
            Ok(_) => parse_answer(&input),
        }
    }
}

/// Anything but an explicit yes is a no
pub fn parse_answer(input: &str) -> bool {
    let answer = input.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// Pre-recorded answers for tests; falls back to the unattended answer
/// once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str, unattended: bool) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(prompt.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(unattended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("YES"));
        assert!(parse_answer("  yes  "));
        assert!(!parse_answer("n"));
        assert!(!parse_answer(""));
        assert!(!parse_answer("yep"));
    }

    #[test]
    fn test_scripted_answers_then_unattended() {
        let confirm = ScriptedConfirm::new(&[true]);
        assert!(confirm.confirm("first?", false));
        assert!(!confirm.confirm("second?", false));
        assert_eq!(confirm.asked(), vec!["first?", "second?"]);
    }
}
