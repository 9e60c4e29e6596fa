//! # Command script interpreter module
//!
//! Scripts are plain text files of shell commands, each terminated by a `;`.
//! Anything after a `#` on a line is a comment. Commands are handed back in
//! the order they appear in the file.
//!
//! ```text
//! # Pick up the pipette and draw 500 uL
//! home all;
//! install pipette;
//! pipette press 500; pipette aspirate;
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command read from a script.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Line of the script the command starts on (1-indexed)
    pub line: usize,

    /// The command text, trimmed
    pub text: String
}

/// A script interpreter.
///
/// After initialising with the path to the script use `.next_command()` to
/// acquire the commands that need executing.
pub struct ScriptInterpreter {
    _script_path: PathBuf,
    cmds: VecDeque<Command>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script has an unterminated command on line {0} (missing `;`)")]
    Unterminated(usize)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path.display().to_string()));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let cmds = parse(&script)?;

        Ok(ScriptInterpreter {
            _script_path: path,
            cmds
        })
    }

    /// Create an interpreter directly from script text.
    pub fn from_source(script: &str) -> Result<Self, ScriptError> {
        Ok(ScriptInterpreter {
            _script_path: PathBuf::new(),
            cmds: parse(script)?
        })
    }

    /// Pop the next command, or `None` at the end of the script.
    pub fn next_command(&mut self) -> Option<Command> {
        self.cmds.pop_front()
    }

    /// Get the number of commands left in the script
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse(script: &str) -> Result<VecDeque<Command>, ScriptError> {
    // Strip comments first, keeping line structure so line numbers stay right
    let comment_re = RegexBuilder::new(r"#.*$")
        .multi_line(true)
        .build()
        .expect("Comment regex is valid");
    let stripped = comment_re.replace_all(script, "");

    let mut cmds = VecDeque::new();
    let mut start = 0;

    for (idx, _) in stripped.match_indices(';') {
        let text = stripped[start..idx].trim();

        if !text.is_empty() {
            // Line of the first non-whitespace character of the command
            let offset = start + (stripped[start..idx].len() - stripped[start..idx].trim_start().len());
            cmds.push_back(Command {
                line: stripped[..offset].matches('\n').count() + 1,
                text: text.split_whitespace().collect::<Vec<_>>().join(" ")
            });
        }

        start = idx + 1;
    }

    let trailing = stripped[start..].trim();
    if !trailing.is_empty() {
        let offset = start + (stripped[start..].len() - stripped[start..].trim_start().len());
        return Err(ScriptError::Unterminated(stripped[..offset].matches('\n').count() + 1));
    }

    if cmds.is_empty() {
        return Err(ScriptError::ScriptEmpty)
    }

    Ok(cmds)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_script() {
        let mut si = ScriptInterpreter::from_source(
            "# setup\nhome all;\ninstall   pipette; # comment ; not a command\n\
             pipette press 500;\n  pipette aspirate;"
        ).unwrap();

        assert_eq!(si.get_num_cmds(), 4);
        assert_eq!(si.next_command(), Some(Command { line: 2, text: "home all".into() }));
        assert_eq!(si.next_command().unwrap().text, "install pipette");
        assert_eq!(si.next_command().unwrap().line, 4);
        assert_eq!(si.next_command().unwrap().line, 5);
        assert_eq!(si.next_command(), None);
    }

    #[test]
    fn test_empty_and_unterminated() {
        assert!(matches!(
            ScriptInterpreter::from_source("# nothing here\n\n"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_source("home all;\nphoto"),
            Err(ScriptError::Unterminated(2))
        ));
    }
}
