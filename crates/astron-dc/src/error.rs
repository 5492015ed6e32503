use std::path::PathBuf;

/// Errors produced while reading or parsing a DC schema.
///
/// Every variant except [`ParseError::FileNotFound`] carries the 1-based
/// source line that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("DC file {path} could not be read: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: `{name}` is not a valid identifier")]
    InvalidIdentifier { line: usize, name: String },

    #[error("line {line}: unexpected token `{token}`")]
    InvalidToken { line: usize, token: String },

    #[error("line {line}: expected `{expected}`")]
    MissingDelimiter { line: usize, expected: &'static str },

    #[error("line {line}: indentation does not match the rest of the file")]
    InvalidIndentation { line: usize },

    #[error("line {line}: molecular field `{field}` references undeclared field `{component}`")]
    UndeclaredComponent {
        line: usize,
        field: String,
        component: String,
    },

    #[error("line {line}: invalid field: {reason}")]
    InvalidField { line: usize, reason: String },
}

impl ParseError {
    /// Source line of the error, if it came from parsing rather than I/O.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::FileNotFound { .. } => None,
            ParseError::InvalidIdentifier { line, .. }
            | ParseError::InvalidToken { line, .. }
            | ParseError::MissingDelimiter { line, .. }
            | ParseError::InvalidIndentation { line }
            | ParseError::UndeclaredComponent { line, .. }
            | ParseError::InvalidField { line, .. } => Some(*line),
        }
    }
}
