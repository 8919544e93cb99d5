//! Interactive question input using rustyline
//!
//! Line editing plus history persisted to `~/.reviewrag/history`.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

use crate::errors::{RagError, Result};

const PROMPT: &str = "reviewrag> ";

/// What the user typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// A question to answer
    Query(String),
    /// Blank line or Ctrl-C; prompt again
    Skip,
    /// `/help`
    Help,
    /// `/exit`, `/quit` or Ctrl-D
    Exit,
}

impl InputLine {
    fn classify(line: &str) -> Self {
        match line.trim() {
            "" => InputLine::Skip,
            "/exit" | "/quit" | "exit" | "quit" => InputLine::Exit,
            "/help" | "?" => InputLine::Help,
            query => InputLine::Query(query.to_string()),
        }
    }
}

fn readline_error(err: ReadlineError) -> RagError {
    match err {
        ReadlineError::Io(e) => RagError::IoError(e),
        other => RagError::Generic(format!("readline: {}", other)),
    }
}

/// Readline front-end for `ask` without a query
pub struct InputHandler {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
}

impl InputHandler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new().map_err(readline_error)?,
            history_path: None,
        })
    }

    /// Load history from `history_file` if present; it is written back by
    /// [`save_history`](Self::save_history)
    pub fn with_history(history_file: PathBuf) -> Result<Self> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        if history_file.exists() {
            let _ = editor.load_history(&history_file);
        }
        Ok(Self {
            editor,
            history_path: Some(history_file),
        })
    }

    /// `~/.reviewrag/history`
    pub fn default_history_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".reviewrag").join("history"))
    }

    pub fn read_line(&mut self) -> Result<InputLine> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                let input = InputLine::classify(&line);
                if let InputLine::Query(query) = &input {
                    let _ = self.editor.add_history_entry(query.as_str());
                }
                Ok(input)
            }
            Err(ReadlineError::Interrupted) => Ok(InputLine::Skip),
            Err(ReadlineError::Eof) => Ok(InputLine::Exit),
            Err(err) => Err(readline_error(err)),
        }
    }

    /// Ask a yes/no question; anything but `y`/`yes` is a no
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        match self.editor.readline(&format!("{} [y/N] ", question)) {
            Ok(answer) => Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(false),
            Err(err) => Err(readline_error(err)),
        }
    }

    pub fn save_history(&mut self) -> Result<()> {
        if let Some(path) = &self.history_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.editor.save_history(path).map_err(readline_error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::History;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        assert_eq!(InputLine::classify("   "), InputLine::Skip);
        assert_eq!(InputLine::classify("/exit"), InputLine::Exit);
        assert_eq!(InputLine::classify("quit"), InputLine::Exit);
        assert_eq!(InputLine::classify("/help"), InputLine::Help);
        assert_eq!(
            InputLine::classify("  is the battery good?  "),
            InputLine::Query("is the battery good?".to_string())
        );
    }

    #[test]
    fn test_history_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let history_path = temp_dir.path().join("nested").join("history");

        {
            let mut handler = InputHandler::with_history(history_path.clone()).unwrap();
            let _ = handler.editor.add_history_entry("battery?");
            let _ = handler.editor.add_history_entry("shipping?");
            handler.save_history().unwrap();
        }
        assert!(history_path.exists());

        let handler = InputHandler::with_history(history_path).unwrap();
        assert_eq!(handler.editor.history().len(), 2);
    }

    #[test]
    fn test_history_path_none() {
        let mut handler = InputHandler::new().unwrap();
        assert!(handler.history_path.is_none());
        assert!(handler.save_history().is_ok());
    }
}
