use crate::scanner::{Token, TokenType};
use thiserror::Error;

/// Lexical, syntactic or scoping problem found before anything runs.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error{location}: {msg}")]
pub struct StaticError {
    pub line: usize,
    pub location: String,
    pub msg: String,
}

impl StaticError {
    pub fn on_line(line: usize, msg: &str) -> Self {
        Self {
            line,
            location: String::new(),
            msg: msg.to_string(),
        }
    }

    pub fn at(token: &Token, msg: &str) -> Self {
        let location = match token.token_type {
            TokenType::EOF => " at end".to_string(),
            _ => format!(" at '{}'", token.lexeme),
        };
        Self {
            line: token.line,
            location,
            msg: msg.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{msg}\n[line {}]", .token.line)]
pub struct RuntimeError {
    pub token: Token,
    pub msg: String,
}

impl RuntimeError {
    pub fn new<T>(token: Token, msg: &str) -> Result<T, Self> {
        Err(Self {
            token,
            msg: msg.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum LoxError {
    #[error("{}", join_lines(.0))]
    Static(Vec<StaticError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl LoxError {
    /// Process exit status for this failure, following sysexits.h.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Static(_) => 65,
            Self::Runtime(_) => 70,
        }
    }
}

fn join_lines(errors: &[StaticError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn token(token_type: TokenType, lexeme: &str) -> Token {
        Token {
            token_type,
            lexeme: Arc::new(lexeme.to_string()),
            literal: None,
            line: 3,
        }
    }

    #[test]
    fn static_error_names_the_offending_lexeme() {
        let err = StaticError::at(&token(TokenType::IDENTIFIER, "foo"), "Expect ';' after value.");
        assert_eq!(err.to_string(), "[line 3] Error at 'foo': Expect ';' after value.");
        let err = StaticError::at(&token(TokenType::EOF, ""), "Expect expression.");
        assert_eq!(err.to_string(), "[line 3] Error at end: Expect expression.");
        let err = StaticError::on_line(7, "Unexpected character.");
        assert_eq!(err.to_string(), "[line 7] Error: Unexpected character.");
    }

    #[test]
    fn exit_codes_distinguish_error_classes() {
        let runtime: Result<(), _> = RuntimeError::new(token(TokenType::PLUS, "+"), "boom");
        let runtime = LoxError::from(runtime.unwrap_err());
        assert_eq!(runtime.to_string(), "boom\n[line 3]");
        assert_eq!(runtime.exit_code(), 70);
        let stat = LoxError::Static(vec![
            StaticError::on_line(1, "a"),
            StaticError::on_line(2, "b"),
        ]);
        assert_eq!(stat.to_string(), "[line 1] Error: a\n[line 2] Error: b");
        assert_eq!(stat.exit_code(), 65);
    }
}
