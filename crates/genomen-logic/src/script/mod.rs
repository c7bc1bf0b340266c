//! Built-in rule script engine.
//!
//! Scripts are sequences of expressions separated by newlines or `;`.
//! Rule authors call built-ins such as `GENO`, `RULE` and `RESULT`; the
//! value bound by `RESULT` is the rule's outcome.
//!
//! ```text
//! RESULT(GENO("rs1801133", "T/T") | GENO("rs1801131", "C/C"),
//!        true_interest=3, true_result="reduced activity")
//! ```

mod interpreter;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::LogicError;
use crate::evaluator::{Bindings, LogicEngine, LogicHost};
use crate::value::DecisionValue;
use interpreter::Interpreter;
pub use parser::Program;

/// Parses rule logic on first use and caches the program by source text.
#[derive(Default)]
pub struct ScriptEngine {
    programs: RwLock<HashMap<String, Arc<Program>>>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse without executing. Useful for validating a rule catalog.
    pub fn compile(source: &str) -> Result<Program, LogicError> {
        parser::parse(lexer::tokenize(source)?)
    }

    fn program(&self, source: &str) -> Result<Arc<Program>, LogicError> {
        if let Some(program) = self
            .programs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
        {
            return Ok(program.clone());
        }

        let program = Arc::new(Self::compile(source)?);
        debug!(statements = program.statements.len(), "Compiled rule script");
        self.programs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source.to_string(), program.clone());
        Ok(program)
    }
}

impl LogicEngine for ScriptEngine {
    fn execute(
        &self,
        logic: &str,
        bindings: &Bindings<'_>,
        host: &dyn LogicHost,
    ) -> Result<DecisionValue, LogicError> {
        let program = self.program(logic)?;
        Interpreter::new(bindings, host).run(&program)
    }
}
