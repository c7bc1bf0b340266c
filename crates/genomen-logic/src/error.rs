//! Rule evaluation error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LogicError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Value is not numeric: {0:?}")]
    NotNumeric(String),

    #[error("Rule {0} produced no result")]
    NoResult(String),

    #[error("Rule logic never bound a result")]
    MissingResultBinding,

    #[error("Rule cycle detected: {}", chain.join(" -> "))]
    RuleCycle { chain: Vec<String> },

    #[error("Rule nesting deeper than {depth}")]
    DepthExceeded { depth: usize },

    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<genomen_common::GenomenError> for LogicError {
    fn from(err: genomen_common::GenomenError) -> Self {
        LogicError::Repository(err.to_string())
    }
}
