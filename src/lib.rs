pub mod ast_printer;
pub mod class;
pub mod environment;
pub mod error;
pub mod expr;
pub mod function;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod transpiler;
pub mod types;

use crate::error::LoxError;
use crate::expr::Stmt;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::transpiler::Transpiler;
use std::io::Write;

/// Runs source text through the whole pipeline. One `Lox` keeps its globals
/// between calls, so a REPL can feed it line by line.
pub struct Lox {
    interpreter: Interpreter,
    next_id: usize,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self::with_interpreter(Interpreter::with_output(out))
    }

    fn with_interpreter(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            next_id: 0,
        }
    }

    /// Scans and parses `source`. Scanner and parser errors are reported
    /// together, in source order.
    pub fn parse(&mut self, source: &str) -> Result<Vec<Stmt>, LoxError> {
        let (tokens, mut errors) = Scanner::new(source).scan_tokens();
        tracing::debug!(tokens = tokens.len(), "scanned");
        let (statements, parse_errors) = Parser::new(tokens, &mut self.next_id).parse();
        tracing::debug!(statements = statements.len(), "parsed");
        errors.extend(parse_errors);
        if errors.is_empty() {
            Ok(statements)
        } else {
            errors.sort_by_key(|e| e.line);
            Err(LoxError::Static(errors))
        }
    }

    /// Parses and resolves, refusing to go on after any static error.
    fn analyze(&mut self, source: &str) -> Result<(Vec<Stmt>, types::Locals), LoxError> {
        let statements = self.parse(source)?;
        let locals = Resolver::new()
            .resolve(&statements)
            .map_err(LoxError::Static)?;
        Ok((statements, locals))
    }

    pub fn run(&mut self, source: &str) -> Result<(), LoxError> {
        let (statements, locals) = self.analyze(source)?;
        self.interpreter.resolve(locals);
        self.interpreter.interpret_program(&statements)?;
        Ok(())
    }

    /// Scheme source for `source`; `pretty` wraps it in a pretty-printer call.
    pub fn transpile(&mut self, source: &str, pretty: bool) -> Result<String, LoxError> {
        let (statements, _) = self.analyze(source)?;
        let transpiler = Transpiler::new();
        Ok(if pretty {
            transpiler.pretty_print(&statements)
        } else {
            transpiler.transpile(&statements)
        })
    }
}
