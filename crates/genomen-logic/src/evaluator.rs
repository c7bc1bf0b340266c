//! Binding samples to rule evaluation.
//!
//! `RuleEvaluator` owns the two primitives rule logic calls back into:
//! attribute comparison against sample data and sub-rule invocation. The
//! logic itself is executed by a pluggable [`LogicEngine`].

use std::cell::RefCell;
use std::sync::Arc;

use genomen_common::{Rule, Sample};
use tracing::{debug, warn};

use crate::error::LogicError;
use crate::repository::{RuleRepository, SampleDataRepository, ALLELE_FIELD, PHENOTYPE, PHENOTYPE_FIELD, SNP};
use crate::value::DecisionValue;

/// Context bound into one evaluation of rule logic.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub sample: &'a Sample,
    pub default_interest_level: i32,
}

/// Callbacks available to rule logic while it runs.
pub trait LogicHost {
    /// Compare a stored genotype attribute against an expected allele
    /// pattern. Missing data is an optimistic, unresolvable match.
    fn compare_to_attribute(
        &self,
        data_type: &str,
        sample: &Sample,
        attribute_key: &str,
        attribute_field: &str,
        expected_allele: &str,
    ) -> Result<DecisionValue, LogicError>;

    /// Compare a stored phenotype value against `expected` as text.
    fn compare_to_phenotype(
        &self,
        sample: &Sample,
        attribute_key: &str,
        expected: &str,
    ) -> Result<DecisionValue, LogicError>;

    /// Evaluate another rule for the same sample. `None` when the rule is
    /// not in the catalog.
    fn evaluate_rule(&self, sample: &Sample, rule_id: &str) -> Result<Option<DecisionValue>, LogicError>;
}

/// Executes rule logic text and yields the value it bound as its result.
pub trait LogicEngine: Send + Sync {
    fn execute(
        &self,
        logic: &str,
        bindings: &Bindings<'_>,
        host: &dyn LogicHost,
    ) -> Result<DecisionValue, LogicError>;
}

/// Evaluates rules for samples. Holds the chain of rules currently being
/// evaluated, so one evaluator serves one sample at a time.
pub struct RuleEvaluator {
    rules: Arc<dyn RuleRepository>,
    data: Arc<dyn SampleDataRepository>,
    engine: Arc<dyn LogicEngine>,
    max_depth: usize,
    chain: RefCell<Vec<String>>,
}

impl RuleEvaluator {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        data: Arc<dyn SampleDataRepository>,
        engine: Arc<dyn LogicEngine>,
        max_depth: usize,
    ) -> Self {
        Self {
            rules,
            data,
            engine,
            max_depth,
            chain: RefCell::new(Vec::new()),
        }
    }

    /// Evaluate logic text for a sample. Any failure yields `None`.
    pub fn evaluate(&self, logic: &str, sample: &Sample, default_interest_level: i32) -> Option<DecisionValue> {
        match self.try_evaluate(logic, sample, default_interest_level) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(sample_id = %sample.id, error = %e, "Rule logic failed");
                None
            }
        }
    }

    pub fn try_evaluate(
        &self,
        logic: &str,
        sample: &Sample,
        default_interest_level: i32,
    ) -> Result<DecisionValue, LogicError> {
        let bindings = Bindings { sample, default_interest_level };
        self.engine.execute(logic, &bindings, self)
    }

    /// Evaluate a catalog rule. Unknown ids and failures both yield `None`.
    pub fn evaluate_rule(&self, sample: &Sample, rule_id: &str) -> Option<DecisionValue> {
        match self.try_evaluate_rule(sample, rule_id) {
            Ok(value) => value,
            Err(e) => {
                warn!(rule_id, sample_id = %sample.id, error = %e, "Rule evaluation failed");
                None
            }
        }
    }

    pub fn try_evaluate_rule(&self, sample: &Sample, rule_id: &str) -> Result<Option<DecisionValue>, LogicError> {
        self.guard(rule_id)?;
        let Some(rule) = self.rules.rule(rule_id)? else {
            debug!(rule_id, "Rule not in catalog");
            return Ok(None);
        };
        self.run_in_chain(&rule, sample).map(Some)
    }

    /// Evaluate an already fetched rule, as the analyzer does for top-level
    /// rules. Failures yield `None`.
    pub fn apply(&self, rule: &Rule, sample: &Sample) -> Option<DecisionValue> {
        let outcome = self.guard(&rule.id).and_then(|_| self.run_in_chain(rule, sample));
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(rule_id = %rule.id, sample_id = %sample.id, error = %e, "Rule evaluation failed");
                None
            }
        }
    }

    fn guard(&self, rule_id: &str) -> Result<(), LogicError> {
        let chain = self.chain.borrow();
        if chain.iter().any(|id| id == rule_id) {
            let mut cycle = chain.clone();
            cycle.push(rule_id.to_string());
            return Err(LogicError::RuleCycle { chain: cycle });
        }
        if chain.len() >= self.max_depth {
            return Err(LogicError::DepthExceeded { depth: self.max_depth });
        }
        Ok(())
    }

    fn run_in_chain(&self, rule: &Rule, sample: &Sample) -> Result<DecisionValue, LogicError> {
        self.chain.borrow_mut().push(rule.id.clone());
        let result = self.try_evaluate(&rule.logic, sample, rule.default_interest_level);
        self.chain.borrow_mut().pop();
        result
    }
}

impl LogicHost for RuleEvaluator {
    fn compare_to_attribute(
        &self,
        data_type: &str,
        sample: &Sample,
        attribute_key: &str,
        attribute_field: &str,
        expected_allele: &str,
    ) -> Result<DecisionValue, LogicError> {
        let stored = self.data.attribute(data_type, &sample.id, attribute_key, attribute_field)?;
        let mut value = match stored {
            Some(allele) => DecisionValue::text(allele),
            None => {
                let mut missing = DecisionValue::text(expected_allele);
                missing.add_missing_genotype(attribute_key);
                missing.set_flag(true);
                missing.set_unresolvable(true);
                missing
            }
        };
        value.compare_to_allele(expected_allele);
        Ok(value)
    }

    fn compare_to_phenotype(
        &self,
        sample: &Sample,
        attribute_key: &str,
        expected: &str,
    ) -> Result<DecisionValue, LogicError> {
        let stored = self.data.attribute(PHENOTYPE, &sample.id, attribute_key, PHENOTYPE_FIELD)?;
        let mut value = DecisionValue::boolean(true);
        match stored {
            Some(observed) => value.set_flag(observed == expected),
            None => {
                value.add_missing_phenotype(attribute_key);
                value.set_unresolvable(true);
            }
        }
        Ok(value)
    }

    fn evaluate_rule(&self, sample: &Sample, rule_id: &str) -> Result<Option<DecisionValue>, LogicError> {
        self.try_evaluate_rule(sample, rule_id)
    }
}

impl RuleEvaluator {
    /// Shorthand for a genotype comparison on the allele field.
    pub fn compare_genotype(
        &self,
        sample: &Sample,
        attribute_key: &str,
        expected_allele: &str,
    ) -> Result<DecisionValue, LogicError> {
        self.compare_to_attribute(SNP, sample, attribute_key, ALLELE_FIELD, expected_allele)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genomen_common::{EffectType, GenomenError};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Fixture {
        rules: HashMap<String, Rule>,
        alleles: HashMap<String, String>,
    }

    impl RuleRepository for Fixture {
        fn top_level_rules(&self) -> genomen_common::Result<Vec<Rule>> {
            Ok(self.rules.values().filter(|r| !r.sub_rule).cloned().collect())
        }

        fn rule(&self, rule_id: &str) -> genomen_common::Result<Option<Rule>> {
            Ok(self.rules.get(rule_id).cloned())
        }
    }

    impl SampleDataRepository for Fixture {
        fn attribute(&self, _: &str, _: &str, key: &str, _: &str) -> genomen_common::Result<Option<String>> {
            if key == "broken" {
                return Err(GenomenError::Repository("offline".into()));
            }
            Ok(self.alleles.get(key).cloned())
        }

        fn find_sample(&self, _: &str) -> genomen_common::Result<Option<Sample>> {
            Ok(None)
        }
    }

    /// Logic text is a rule id to call, or `geno:<key>:<allele>`.
    struct Scripted;

    impl LogicEngine for Scripted {
        fn execute(
            &self,
            logic: &str,
            bindings: &Bindings<'_>,
            host: &dyn LogicHost,
        ) -> Result<DecisionValue, LogicError> {
            if let Some(rest) = logic.strip_prefix("geno:") {
                let (key, allele) = rest.split_once(':').unwrap_or((rest, ""));
                return host.compare_to_attribute(SNP, bindings.sample, key, ALLELE_FIELD, allele);
            }
            host.evaluate_rule(bindings.sample, logic)?
                .ok_or_else(|| LogicError::NoResult(logic.to_string()))
        }
    }

    fn rule(id: &str, logic: &str) -> Rule {
        Rule {
            id: id.into(),
            effect_type: EffectType::Risk,
            trait_id: "t".into(),
            default_interest_level: 1,
            logic: logic.into(),
            sub_rule: false,
        }
    }

    fn evaluator(fixture: Fixture, max_depth: usize) -> RuleEvaluator {
        let fixture = Arc::new(fixture);
        RuleEvaluator::new(fixture.clone(), fixture, Arc::new(Scripted), max_depth)
    }

    #[test]
    fn test_present_attribute_matches() {
        let mut fixture = Fixture::default();
        fixture.alleles.insert("rs1".into(), "A/G".into());
        let ev = evaluator(fixture, 8);

        let v = ev.compare_genotype(&Sample::new("s1"), "rs1", "A/G").unwrap();
        assert!(v.flag());
        assert!(!v.is_unresolvable());

        let v = ev.compare_genotype(&Sample::new("s1"), "rs1", "T/T").unwrap();
        assert!(!v.flag());
    }

    #[test]
    fn test_missing_attribute_is_optimistic_and_unresolvable() {
        let ev = evaluator(Fixture::default(), 8);
        let v = ev.compare_genotype(&Sample::new("s1"), "rs404", "C/T").unwrap();
        assert!(v.flag());
        assert!(v.is_unresolvable());
        assert_eq!(v.missing_genotypes(), ["rs404".to_string()]);
    }

    #[test]
    fn test_repository_failure_is_swallowed_at_top_level() {
        let ev = evaluator(Fixture::default(), 8);
        assert!(ev.evaluate("geno:broken:A/A", &Sample::new("s1"), 0).is_none());
    }

    #[test]
    fn test_unknown_rule_is_none_not_error() {
        let ev = evaluator(Fixture::default(), 8);
        assert_eq!(ev.try_evaluate_rule(&Sample::new("s1"), "nope").unwrap(), None);
    }

    #[test]
    fn test_sub_rule_composition() {
        let mut fixture = Fixture::default();
        fixture.rules.insert("outer".into(), rule("outer", "inner"));
        fixture.rules.insert("inner".into(), rule("inner", "geno:rs1:A/N"));
        fixture.alleles.insert("rs1".into(), "A/C".into());
        let ev = evaluator(fixture, 8);

        let v = ev.evaluate_rule(&Sample::new("s1"), "outer").unwrap();
        assert!(v.flag());
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut fixture = Fixture::default();
        fixture.rules.insert("a".into(), rule("a", "b"));
        fixture.rules.insert("b".into(), rule("b", "a"));
        let ev = evaluator(fixture, 8);

        let err = ev.try_evaluate_rule(&Sample::new("s1"), "a").unwrap_err();
        assert_eq!(
            err,
            LogicError::RuleCycle { chain: vec!["a".into(), "b".into(), "a".into()] }
        );
        assert!(ev.evaluate_rule(&Sample::new("s1"), "a").is_none());
        // The chain unwinds after a failure.
        assert!(ev.chain.borrow().is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let mut fixture = Fixture::default();
        for i in 0..5 {
            fixture.rules.insert(format!("r{i}"), rule(&format!("r{i}"), &format!("r{}", i + 1)));
        }
        fixture.rules.insert("r5".into(), rule("r5", "geno:rs1:A/A"));
        let ev = evaluator(fixture, 3);

        let err = ev.try_evaluate_rule(&Sample::new("s1"), "r0").unwrap_err();
        assert_eq!(err, LogicError::DepthExceeded { depth: 3 });
    }

    #[test]
    fn test_apply_places_rule_on_chain() {
        let mut fixture = Fixture::default();
        let selfish = rule("self", "self");
        fixture.rules.insert("self".into(), selfish.clone());
        let ev = evaluator(fixture, 8);
        assert!(ev.apply(&selfish, &Sample::new("s1")).is_none());
    }
}
