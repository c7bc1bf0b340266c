//! The typed value rule expressions operate on.
//!
//! A `DecisionValue` is mutated in place by its own operators: every binary
//! operator merges the operand into `self` (missing-data lists, audit trail,
//! unresolvable flag) and returns `&mut Self` so expressions can chain.

use serde::Serialize;
use std::fmt;

use crate::allele;
use crate::error::LogicError;

/// Stand-in for an unresolvable operand of `add` and `subtract`.
const UNRESOLVED_ADDEND: f64 = 0.0;
/// Stand-in for an unresolvable operand of `multiply` and `divide`.
const UNRESOLVED_FACTOR: f64 = 1.0;

/// Numeric payload carried by boolean results.
const BOOLEAN_PAYLOAD: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueKind {
    Numeric,
    Boolean,
    Text,
    Allele,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Numeric => "NUMERIC",
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::Text    => "TEXT",
            ValueKind::Allele  => "ALLELE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionValue {
    kind: ValueKind,
    text: String,
    flag: bool,
    interest_level: f64,
    unresolvable: bool,
    missing_genotypes: Vec<String>,
    missing_phenotypes: Vec<String>,
    associated_values: Vec<DecisionValue>,
}

impl Default for DecisionValue {
    fn default() -> Self {
        Self::numeric(0.0)
    }
}

// ---------------------------------------------------------------------------
// Construction and accessors
// ---------------------------------------------------------------------------

impl DecisionValue {
    fn with_kind(kind: ValueKind, text: String, flag: bool) -> Self {
        Self {
            kind,
            text,
            flag,
            interest_level: 0.0,
            unresolvable: false,
            missing_genotypes: Vec::new(),
            missing_phenotypes: Vec::new(),
            associated_values: Vec::new(),
        }
    }

    pub fn numeric(value: f64) -> Self {
        Self::with_kind(ValueKind::Numeric, format_number(value), false)
    }

    /// Boolean literal. Its numeric payload is 1 or 0.
    pub fn boolean(value: bool) -> Self {
        let payload = if value { "1" } else { "0" };
        Self::with_kind(ValueKind::Boolean, payload.to_string(), value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::with_kind(ValueKind::Text, value.into(), false)
    }

    /// A genotype used as the subject of pattern equality.
    pub fn allele(value: impl Into<String>) -> Self {
        Self::with_kind(ValueKind::Allele, value.into(), false)
    }

    pub fn kind(&self) -> ValueKind { self.kind }
    pub fn text_value(&self) -> &str { &self.text }
    pub fn flag(&self) -> bool { self.flag }
    pub fn interest_level(&self) -> f64 { self.interest_level }
    pub fn is_unresolvable(&self) -> bool { self.unresolvable }
    pub fn missing_genotypes(&self) -> &[String] { &self.missing_genotypes }
    pub fn missing_phenotypes(&self) -> &[String] { &self.missing_phenotypes }
    pub fn associated_values(&self) -> &[DecisionValue] { &self.associated_values }

    pub fn set_kind(&mut self, kind: ValueKind) { self.kind = kind; }
    pub fn set_text(&mut self, text: impl Into<String>) { self.text = text.into(); }
    pub fn set_flag(&mut self, flag: bool) { self.flag = flag; }
    pub fn set_interest_level(&mut self, level: f64) { self.interest_level = level; }

    /// Only the explicit acceptance built-ins clear this; operators never do.
    pub fn set_unresolvable(&mut self, unresolvable: bool) {
        self.unresolvable = unresolvable;
    }

    /// Record a genotype attribute the value could not be computed from.
    pub fn add_missing_genotype(&mut self, key: impl Into<String>) {
        self.missing_genotypes.push(key.into());
    }

    pub fn add_missing_phenotype(&mut self, key: impl Into<String>) {
        self.missing_phenotypes.push(key.into());
    }

    pub fn has_missing_data(&self) -> bool {
        !self.missing_genotypes.is_empty() || !self.missing_phenotypes.is_empty()
    }

    /// Parse the text payload as a number.
    pub fn numeric_value(&self) -> Result<f64, LogicError> {
        self.text
            .trim()
            .parse::<f64>()
            .map_err(|_| LogicError::NotNumeric(self.text.clone()))
    }

    fn set_number(&mut self, value: f64) {
        self.text = format_number(value);
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

impl DecisionValue {
    /// Fold `other` into the audit trail of `self`.
    pub fn merge(&mut self, other: DecisionValue) {
        self.missing_genotypes.extend(other.missing_genotypes.iter().cloned());
        self.missing_phenotypes.extend(other.missing_phenotypes.iter().cloned());
        if other.unresolvable {
            self.unresolvable = true;
        }
        self.associated_values.push(other);
    }

    fn substitute_if_unresolvable(&mut self, stand_in: f64) {
        if self.unresolvable {
            self.set_number(stand_in);
        }
    }

    fn arithmetic(
        &mut self,
        mut other: DecisionValue,
        stand_in: f64,
        op: fn(f64, f64) -> f64,
    ) -> Result<&mut Self, LogicError> {
        other.substitute_if_unresolvable(stand_in);
        let value = op(self.numeric_value()?, other.numeric_value()?);
        self.flag = self.flag || other.flag;
        self.merge(other);
        self.set_number(value);
        self.kind = ValueKind::Numeric;
        Ok(self)
    }

    fn comparison(
        &mut self,
        other: DecisionValue,
        op: fn(f64, f64) -> bool,
    ) -> Result<&mut Self, LogicError> {
        self.flag = op(self.numeric_value()?, other.numeric_value()?);
        self.merge(other);
        self.kind = ValueKind::Boolean;
        self.text = BOOLEAN_PAYLOAD.to_string();
        Ok(self)
    }

    fn logical(&mut self, other: DecisionValue, op: fn(bool, bool) -> bool) -> &mut Self {
        self.flag = op(self.flag, other.flag);
        self.merge(other);
        self.kind = ValueKind::Boolean;
        self.text = BOOLEAN_PAYLOAD.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl DecisionValue {
    /// Numeric sum. An unresolvable operand counts as 0.
    pub fn add(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.arithmetic(other, UNRESOLVED_ADDEND, |a, b| a + b)
    }

    pub fn subtract(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.arithmetic(other, UNRESOLVED_ADDEND, |a, b| a - b)
    }

    /// Numeric product. An unresolvable operand counts as 1.
    pub fn multiply(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.arithmetic(other, UNRESOLVED_FACTOR, |a, b| a * b)
    }

    pub fn divide(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.arithmetic(other, UNRESOLVED_FACTOR, |a, b| a / b)
    }

    pub fn and(&mut self, other: DecisionValue) -> &mut Self {
        self.logical(other, |a, b| a && b)
    }

    pub fn or(&mut self, other: DecisionValue) -> &mut Self {
        self.logical(other, |a, b| a || b)
    }

    pub fn less_than(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.comparison(other, |a, b| a < b)
    }

    pub fn less_than_or_equal(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.comparison(other, |a, b| a <= b)
    }

    pub fn greater_than(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.comparison(other, |a, b| a > b)
    }

    pub fn greater_than_or_equal(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        self.comparison(other, |a, b| a >= b)
    }

    /// Equality across kinds. An allele subject is matched as a pattern
    /// against `other` and yields a boolean; every other pairing leaves the
    /// kind as NUMERIC with the verdict in the flag.
    pub fn equals(&mut self, other: DecisionValue) -> Result<&mut Self, LogicError> {
        if self.kind == ValueKind::Allele {
            self.flag = allele::matches(&self.text, &other.text);
            self.merge(other);
            self.kind = ValueKind::Boolean;
        } else {
            self.flag = self.cross_kind_equals(&other)?;
            self.merge(other);
            self.kind = ValueKind::Numeric;
        }
        self.text = BOOLEAN_PAYLOAD.to_string();
        Ok(self)
    }

    /// Match the text payload as a genotype against `pattern`, leaving a
    /// boolean verdict.
    pub fn compare_to_allele(&mut self, pattern: &str) -> &mut Self {
        self.flag = allele::matches(&self.text, pattern);
        self.kind = ValueKind::Boolean;
        self.text = BOOLEAN_PAYLOAD.to_string();
        self
    }

    fn cross_kind_equals(&self, other: &DecisionValue) -> Result<bool, LogicError> {
        use ValueKind::*;

        let equal = match (self.kind, other.kind) {
            (Boolean, Boolean) => self.flag == other.flag,
            (Boolean, Numeric) => bool_matches_number(self.flag, other.numeric_value()?),
            (Boolean, Text)    => bool_matches_text(self.flag, &other.text),
            (Numeric, Boolean) => bool_matches_number(other.flag, self.numeric_value()?),
            (Numeric, Numeric) | (Numeric, Text) | (Text, Numeric) => {
                self.numeric_value()? == other.numeric_value()?
            }
            (Text, Boolean)    => bool_matches_text(other.flag, &self.text),
            (Text, Text)       => self.text == other.text,
            // An allele operand is only comparable from the allele side.
            (_, Allele) | (Allele, _) => false,
        };
        Ok(equal)
    }
}

fn bool_matches_number(flag: bool, number: f64) -> bool {
    (flag && number == 1.0) || (!flag && number == 0.0)
}

fn bool_matches_text(flag: bool, text: &str) -> bool {
    (flag && text == "true") || (!flag && text == "false")
}

fn format_number(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolvable(key: &str) -> DecisionValue {
        let mut v = DecisionValue::text("A/G");
        v.add_missing_genotype(key);
        v.set_unresolvable(true);
        v
    }

    #[test]
    fn test_add_sums_numbers() {
        let mut v = DecisionValue::numeric(2.0);
        v.add(DecisionValue::numeric(1.5)).unwrap();
        assert_eq!(v.kind(), ValueKind::Numeric);
        assert_eq!(v.numeric_value().unwrap(), 3.5);
        assert_eq!(v.associated_values().len(), 1);
    }

    #[test]
    fn test_add_formats_whole_numbers_without_fraction() {
        let mut v = DecisionValue::numeric(1.0);
        v.add(DecisionValue::text("2")).unwrap();
        assert_eq!(v.text_value(), "3");
    }

    #[test]
    fn test_add_substitutes_zero_for_unresolvable() {
        let mut v = DecisionValue::numeric(4.0);
        v.add(unresolvable("rs1")).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 4.0);
        assert!(v.is_unresolvable());
        assert_eq!(v.missing_genotypes(), ["rs1".to_string()]);
    }

    #[test]
    fn test_multiply_substitutes_one_for_unresolvable() {
        let mut v = DecisionValue::numeric(4.0);
        v.multiply(unresolvable("rs1")).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 4.0);

        let mut v = DecisionValue::numeric(9.0);
        v.divide(unresolvable("rs2")).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 9.0);
    }

    #[test]
    fn test_chained_arithmetic_keeps_running_value_after_unresolvable() {
        let mut v = DecisionValue::numeric(2.0);
        v.add(unresolvable("rs1")).unwrap();
        v.add(DecisionValue::numeric(3.0)).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 5.0);
        assert!(v.is_unresolvable());

        v.multiply(DecisionValue::numeric(2.0)).unwrap();
        v.subtract(DecisionValue::numeric(1.0)).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 9.0);
    }

    #[test]
    fn test_subtract_and_divide() {
        let mut v = DecisionValue::numeric(10.0);
        v.subtract(DecisionValue::numeric(4.0)).unwrap();
        v.divide(DecisionValue::numeric(3.0)).unwrap();
        assert_eq!(v.numeric_value().unwrap(), 2.0);
        assert_eq!(v.associated_values().len(), 2);
    }

    #[test]
    fn test_arithmetic_rejects_text() {
        let mut v = DecisionValue::numeric(1.0);
        let err = v.subtract(DecisionValue::text("abc")).unwrap_err();
        assert_eq!(err, LogicError::NotNumeric("abc".into()));
    }

    #[test]
    fn test_logical_operators_reset_payload() {
        let mut v = DecisionValue::boolean(true);
        v.and(DecisionValue::boolean(false));
        assert!(!v.flag());
        assert_eq!(v.kind(), ValueKind::Boolean);
        assert_eq!(v.text_value(), "0");

        v.or(DecisionValue::boolean(true));
        assert!(v.flag());
    }

    #[test]
    fn test_comparisons() {
        let mut v = DecisionValue::numeric(2.0);
        v.less_than(DecisionValue::numeric(3.0)).unwrap();
        assert!(v.flag());
        assert_eq!(v.kind(), ValueKind::Boolean);

        let mut v = DecisionValue::numeric(3.0);
        v.greater_than_or_equal(DecisionValue::numeric(3.0)).unwrap();
        assert!(v.flag());

        let mut v = DecisionValue::numeric(3.0);
        v.greater_than(DecisionValue::numeric(3.0)).unwrap();
        assert!(!v.flag());

        let mut v = DecisionValue::numeric(3.0);
        v.less_than_or_equal(DecisionValue::text("2.5")).unwrap();
        assert!(!v.flag());
    }

    #[test]
    fn test_comparison_does_not_substitute() {
        let mut v = unresolvable("rs1");
        assert!(v.less_than(DecisionValue::numeric(1.0)).is_err());
    }

    #[test]
    fn test_equals_cross_kind_table() {
        let cases = [
            (DecisionValue::boolean(true), DecisionValue::boolean(true), true),
            (DecisionValue::boolean(true), DecisionValue::numeric(1.0), true),
            (DecisionValue::boolean(false), DecisionValue::numeric(0.0), true),
            (DecisionValue::boolean(true), DecisionValue::numeric(0.0), false),
            (DecisionValue::boolean(true), DecisionValue::text("true"), true),
            (DecisionValue::boolean(false), DecisionValue::text("true"), false),
            (DecisionValue::numeric(1.0), DecisionValue::boolean(true), true),
            (DecisionValue::numeric(2.0), DecisionValue::numeric(2.0), true),
            (DecisionValue::numeric(2.0), DecisionValue::text("2.0"), true),
            (DecisionValue::text("false"), DecisionValue::boolean(false), true),
            (DecisionValue::text("7"), DecisionValue::numeric(7.0), true),
            (DecisionValue::text("abc"), DecisionValue::text("abc"), true),
            (DecisionValue::text("abc"), DecisionValue::text("abd"), false),
        ];
        for (mut lhs, rhs, expected) in cases {
            let label = format!("{:?} == {:?}", lhs.kind(), rhs.text_value());
            lhs.equals(rhs).unwrap();
            assert_eq!(lhs.flag(), expected, "{label}");
            assert_eq!(lhs.kind(), ValueKind::Numeric);
        }
    }

    #[test]
    fn test_equals_allele_uses_pattern_match() {
        let mut v = DecisionValue::allele("A/G");
        v.equals(DecisionValue::text("A/N")).unwrap();
        assert!(v.flag());
        assert_eq!(v.kind(), ValueKind::Boolean);

        let mut v = DecisionValue::allele("T/T");
        v.equals(DecisionValue::text("A/G")).unwrap();
        assert!(!v.flag());
    }

    #[test]
    fn test_unresolvable_survives_composition() {
        let mut v = DecisionValue::boolean(true);
        v.and(unresolvable("rs1"));
        v.or(DecisionValue::boolean(true));
        v.equals(DecisionValue::boolean(true)).unwrap();
        assert!(v.is_unresolvable());
        assert!(v.has_missing_data());
        assert_eq!(v.missing_genotypes(), ["rs1".to_string()]);
    }

    #[test]
    fn test_merge_accumulates_audit_trail() {
        let mut inner = DecisionValue::boolean(true);
        inner.add_missing_phenotype("height");
        let mut v = DecisionValue::boolean(true);
        v.and(inner);
        v.and(unresolvable("rs9"));
        assert_eq!(v.associated_values().len(), 2);
        assert_eq!(v.missing_phenotypes(), ["height".to_string()]);
        assert_eq!(v.missing_genotypes(), ["rs9".to_string()]);
    }

    #[test]
    fn test_compare_to_allele() {
        let mut v = DecisionValue::text("C/T");
        v.compare_to_allele("N/T");
        assert!(v.flag());
        assert_eq!(v.kind(), ValueKind::Boolean);
        assert_eq!(v.text_value(), "0");
    }
}
