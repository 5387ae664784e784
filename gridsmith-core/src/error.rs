use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: unterminated template literal")]
    UnterminatedTemplate { line: usize },
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: usize },
    #[error("line {line}: unexpected character {ch:?}")]
    UnexpectedChar { line: usize, ch: char },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::UnterminatedString { line }
            | ScriptError::UnterminatedTemplate { line }
            | ScriptError::UnterminatedComment { line }
            | ScriptError::UnexpectedChar { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,
    #[error("invalid cell reference: {0}")]
    InvalidCell(String),
    #[error("address out of sheet bounds: {0}")]
    OutOfBounds(String),
}
