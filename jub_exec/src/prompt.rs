//! # Operator Prompts
//!
//! Homing the Z and U axes drives the bed and the tool lock through the build volume, so the
//! operator must confirm the volume is clear first.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use std::io::{self, BufRead, Write};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can answer yes/no questions.
pub trait Operator {
    /// Ask a question, blocking until it is answered.
    fn confirm(&mut self, question: &str) -> bool;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Operator at the terminal.
#[derive(Debug, Default)]
pub struct StdinOperator;

/// Gives the same answer to every question.
///
/// Used when running unattended scripts with `--assume-yes`.
#[derive(Debug, Clone)]
pub struct FixedOperator {
    answer: bool,

    asked: Vec<String>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Operator for StdinOperator {
    fn confirm(&mut self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            warn!("Could not flush the prompt to stdout");
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => is_affirmative(&line),
            Err(e) => {
                warn!("Could not read the operator's answer: {}", e);
                false
            }
        }
    }
}

impl FixedOperator {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Vec::new(),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Operator for FixedOperator {
    fn confirm(&mut self, question: &str) -> bool {
        self.asked.push(question.to_string());
        self.answer
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True for the accepted affirmative answers: `y`, `yes`, `s` and `sim`, in any case.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        for a in &["y", "Yes\n", " S ", "sim", "YES"] {
            assert!(is_affirmative(a), "{:?} should be accepted", a);
        }
        for a in &["", "n", "no", "nao", "yep", "1"] {
            assert!(!is_affirmative(a), "{:?} should be refused", a);
        }
    }

    #[test]
    fn test_fixed_operator_records_questions() {
        let mut op = FixedOperator::new(false);
        assert!(!op.confirm("Is the build volume clear?"));
        assert_eq!(op.asked(), &["Is the build volume clear?".to_string()]);
    }
}
