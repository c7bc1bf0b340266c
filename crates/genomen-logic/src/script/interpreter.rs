//! Evaluates parsed rule scripts against a `LogicHost`.

use super::parser::{Arg, BinaryOp, Expr, Program};
use crate::error::LogicError;
use crate::evaluator::{Bindings, LogicHost};
use crate::repository::{ALLELE_FIELD, SNP};
use crate::value::DecisionValue;

pub struct Interpreter<'a> {
    bindings: &'a Bindings<'a>,
    host: &'a dyn LogicHost,
    /// The value bound by `RESULT`; the script's outcome.
    result: Option<DecisionValue>,
}

impl<'a> Interpreter<'a> {
    pub fn new(bindings: &'a Bindings<'a>, host: &'a dyn LogicHost) -> Self {
        Self { bindings, host, result: None }
    }

    pub fn run(mut self, program: &Program) -> Result<DecisionValue, LogicError> {
        for statement in &program.statements {
            self.eval(statement)?;
        }
        self.result.ok_or(LogicError::MissingResultBinding)
    }

    fn eval(&mut self, expr: &Expr) -> Result<DecisionValue, LogicError> {
        match expr {
            Expr::Number(n) => Ok(DecisionValue::numeric(*n)),
            Expr::Text(s) => Ok(DecisionValue::text(s.clone())),
            Expr::Bool(b) => Ok(DecisionValue::boolean(*b)),
            Expr::Neg(inner) => {
                let operand = self.eval(inner)?;
                let mut zero = DecisionValue::numeric(0.0);
                zero.subtract(operand)?;
                Ok(zero)
            }
            Expr::Binary { op, lhs, rhs } => {
                let mut left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                apply(&mut left, *op, right)?;
                Ok(left)
            }
            Expr::Call { name, args, .. } => self.call(name, args),
        }
    }

    fn call(&mut self, name: &str, args: &[Arg]) -> Result<DecisionValue, LogicError> {
        let args = Args { function: name, args };
        match name {
            "GENO" => self.geno(&args),
            "GENO_RISK" => self.geno_risk(&args),
            "PHENO" => self.pheno(&args),
            "ALLELE" => {
                let text = self.text_arg(&args, 0, "allele")?;
                Ok(DecisionValue::allele(text))
            }
            "RULE" => {
                let rule_id = self.text_arg(&args, 0, "id")?;
                self.host
                    .evaluate_rule(self.bindings.sample, &rule_id)?
                    .ok_or(LogicError::NoResult(rule_id))
            }
            "RESULT" => self.result(&args),
            "SET_INTEREST" => self.set_interest(&args),
            "ACCEPT_RESULT" => self.accept_result(),
            "ACCEPT_RESULT_IF_ATLEAST_ONE_NON_MISSING_VALUE" => self.accept_if_any_present(),
            other => Err(LogicError::UnknownFunction(other.to_string())),
        }
    }

    // ── Genotype and phenotype lookups ──

    fn geno(&mut self, args: &Args<'_>) -> Result<DecisionValue, LogicError> {
        let key = self.text_arg(args, 0, "name")?;
        let allele = self.text_arg(args, 1, "allele")?;
        self.host
            .compare_to_attribute(SNP, self.bindings.sample, &key, ALLELE_FIELD, &allele)
    }

    /// `GENO_RISK(name, allele1, risk1, allele2, risk2, ...)`: the first
    /// matching allele sets the interest level to its paired risk.
    fn geno_risk(&mut self, args: &Args<'_>) -> Result<DecisionValue, LogicError> {
        let key = self.text_arg(args, 0, "name")?;
        let pairs = args.args.get(1..).unwrap_or(&[]);
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(args.invalid("expected allele/risk pairs after the name"));
        }

        let mut last = None;
        for pair in pairs.chunks(2) {
            let allele = self.eval(&pair[0].value)?.text_value().to_string();
            let mut value = self
                .host
                .compare_to_attribute(SNP, self.bindings.sample, &key, ALLELE_FIELD, &allele)?;
            if value.flag() {
                let risk = self.eval(&pair[1].value)?.numeric_value()?;
                value.set_interest_level(risk);
                return Ok(value);
            }
            last = Some(value);
        }
        last.ok_or_else(|| args.invalid("no allele given"))
    }

    fn pheno(&mut self, args: &Args<'_>) -> Result<DecisionValue, LogicError> {
        let key = self.text_arg(args, 0, "name")?;
        let expected = self.text_arg(args, 1, "value")?;
        self.host.compare_to_phenotype(self.bindings.sample, &key, &expected)
    }

    // ── Result binding ──

    fn result(&mut self, args: &Args<'_>) -> Result<DecisionValue, LogicError> {
        let logic = args.required(0, "logic")?;
        let mut value = self.eval(logic)?;
        value.set_interest_level(f64::from(self.bindings.default_interest_level));

        let (interest_slot, result_slot) = if value.flag() {
            ((1, "true_interest"), (2, "true_result"))
        } else {
            ((3, "false_interest"), (4, "false_result"))
        };
        if let Some(text) = self.optional(args, result_slot.0, result_slot.1)? {
            let text = text.text_value().to_string();
            if !text.is_empty() {
                value.set_text(text);
            }
        }
        if let Some(interest) = self.optional(args, interest_slot.0, interest_slot.1)? {
            let interest = interest.numeric_value()?;
            if interest > 0.0 {
                value.set_interest_level(interest);
            }
        }

        self.result = Some(value.clone());
        Ok(value)
    }

    fn set_interest(&mut self, args: &Args<'_>) -> Result<DecisionValue, LogicError> {
        let test = self.eval(args.required(0, "test")?)?;
        let slot = if test.flag() { (1, "true_interest") } else { (2, "false_interest") };
        let interest = match self.optional(args, slot.0, slot.1)? {
            Some(v) => v.numeric_value()?,
            None => 0.0,
        };
        let bound = self
            .result
            .as_mut()
            .ok_or_else(|| args.invalid("called before RESULT"))?;
        bound.set_interest_level(interest);
        Ok(test)
    }

    /// Accepts an unresolvable result whose missing data is accounted for
    /// by its associated values.
    fn accept_result(&mut self) -> Result<DecisionValue, LogicError> {
        let bound = self.result.as_mut().ok_or(LogicError::MissingResultBinding)?;
        if bound.is_unresolvable() && bound.associated_values().iter().any(|v| v.has_missing_data()) {
            bound.set_unresolvable(false);
        }
        Ok(bound.clone())
    }

    /// Clears `unresolvable` on the bound result when at least one of its
    /// associated values was computed from present data.
    fn accept_if_any_present(&mut self) -> Result<DecisionValue, LogicError> {
        let bound = self.result.as_mut().ok_or(LogicError::MissingResultBinding)?;
        if bound.associated_values().iter().any(|v| !v.is_unresolvable()) {
            bound.set_unresolvable(false);
        }
        Ok(bound.clone())
    }

    // ── Argument helpers ──

    fn text_arg(&mut self, args: &Args<'_>, index: usize, name: &str) -> Result<String, LogicError> {
        let expr = args.required(index, name)?;
        Ok(self.eval(expr)?.text_value().to_string())
    }

    fn optional(&mut self, args: &Args<'_>, index: usize, name: &str) -> Result<Option<DecisionValue>, LogicError> {
        match args.get(index, name) {
            Some(expr) => self.eval(expr).map(Some),
            None => Ok(None),
        }
    }
}

fn apply(left: &mut DecisionValue, op: BinaryOp, right: DecisionValue) -> Result<(), LogicError> {
    match op {
        BinaryOp::Or => {
            left.or(right);
        }
        BinaryOp::And => {
            left.and(right);
        }
        BinaryOp::Eq => {
            left.equals(right)?;
        }
        BinaryOp::Lt => {
            left.less_than(right)?;
        }
        BinaryOp::Le => {
            left.less_than_or_equal(right)?;
        }
        BinaryOp::Gt => {
            left.greater_than(right)?;
        }
        BinaryOp::Ge => {
            left.greater_than_or_equal(right)?;
        }
        BinaryOp::Add => {
            left.add(right)?;
        }
        BinaryOp::Sub => {
            left.subtract(right)?;
        }
        BinaryOp::Mul => {
            left.multiply(right)?;
        }
        BinaryOp::Div => {
            left.divide(right)?;
        }
    }
    Ok(())
}

/// Positional-or-named argument lookup for one call.
struct Args<'a> {
    function: &'a str,
    args: &'a [Arg],
}

impl<'a> Args<'a> {
    /// A named argument wins; otherwise the positional argument at `index`,
    /// counting only unnamed arguments.
    fn get(&self, index: usize, name: &str) -> Option<&'a Expr> {
        if let Some(arg) = self.args.iter().find(|a| a.name.as_deref() == Some(name)) {
            return Some(&arg.value);
        }
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .nth(index)
            .map(|a| &a.value)
    }

    fn required(&self, index: usize, name: &str) -> Result<&'a Expr, LogicError> {
        self.get(index, name)
            .ok_or_else(|| self.invalid(&format!("missing argument '{name}'")))
    }

    fn invalid(&self, message: &str) -> LogicError {
        LogicError::InvalidArgument {
            function: self.function.to_string(),
            message: message.to_string(),
        }
    }
}
