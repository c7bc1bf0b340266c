//! Rule scripts evaluated end to end through `RuleEvaluator`.

use std::collections::HashMap;
use std::sync::Arc;

use genomen_common::{EffectType, Result, Rule, Sample};
use genomen_logic::{
    LogicError, RuleEvaluator, RuleRepository, SampleDataRepository, ScriptEngine, ValueKind,
    PHENOTYPE, SNP,
};

#[derive(Default)]
struct Catalog {
    rules: HashMap<String, Rule>,
    attributes: HashMap<(String, String), String>,
}

impl Catalog {
    fn with_rule(mut self, id: &str, logic: &str, interest: i32) -> Self {
        self.rules.insert(
            id.to_string(),
            Rule {
                id: id.to_string(),
                effect_type: EffectType::Risk,
                trait_id: format!("trait-{id}"),
                default_interest_level: interest,
                logic: logic.to_string(),
                sub_rule: false,
            },
        );
        self
    }

    fn genotype(mut self, key: &str, allele: &str) -> Self {
        self.attributes.insert((SNP.to_string(), key.to_string()), allele.to_string());
        self
    }

    fn phenotype(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert((PHENOTYPE.to_string(), key.to_string()), value.to_string());
        self
    }

    fn evaluator(self) -> RuleEvaluator {
        let shared = Arc::new(self);
        RuleEvaluator::new(shared.clone(), shared, Arc::new(ScriptEngine::new()), 16)
    }
}

impl RuleRepository for Catalog {
    fn top_level_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.values().cloned().collect())
    }

    fn rule(&self, rule_id: &str) -> Result<Option<Rule>> {
        Ok(self.rules.get(rule_id).cloned())
    }
}

impl SampleDataRepository for Catalog {
    fn attribute(&self, data_type: &str, _sample: &str, key: &str, _field: &str) -> Result<Option<String>> {
        Ok(self.attributes.get(&(data_type.to_string(), key.to_string())).cloned())
    }

    fn find_sample(&self, _sample_id: &str) -> Result<Option<Sample>> {
        Ok(None)
    }
}

fn sample() -> Sample {
    Sample::new("NA12878")
}

#[test]
fn test_result_binds_true_branch() {
    let ev = Catalog::default().genotype("rs1", "A/G").evaluator();
    let v = ev
        .evaluate(
            "RESULT(GENO('rs1', 'A/N'), true_interest=3, true_result='carrier', false_result='none')",
            &sample(),
            1,
        )
        .unwrap();
    assert!(v.flag());
    assert_eq!(v.text_value(), "carrier");
    assert_eq!(v.interest_level(), 3.0);
    assert!(!v.is_unresolvable());
}

#[test]
fn test_result_false_branch_keeps_default_interest() {
    let ev = Catalog::default().genotype("rs1", "T/T").evaluator();
    let v = ev
        .evaluate("RESULT(GENO('rs1', 'A/G'), 3, 'carrier', 0, 'none')", &sample(), 2)
        .unwrap();
    assert!(!v.flag());
    assert_eq!(v.text_value(), "none");
    assert_eq!(v.interest_level(), 2.0);
}

#[test]
fn test_missing_genotype_is_recorded() {
    let ev = Catalog::default().genotype("rs1", "A/G").evaluator();
    let v = ev
        .evaluate("RESULT(GENO('rs1', 'A/G') & GENO('rs2', 'C/C'))", &sample(), 0)
        .unwrap();
    assert!(v.flag());
    assert!(v.is_unresolvable());
    assert_eq!(v.missing_genotypes(), ["rs2".to_string()]);
}

#[test]
fn test_or_keeps_unresolvable() {
    let ev = Catalog::default().genotype("rs1", "T/T").evaluator();
    let v = ev
        .evaluate("RESULT(GENO('rs9', 'A/A') | GENO('rs1', 'T/T'))", &sample(), 0)
        .unwrap();
    assert!(v.is_unresolvable());
}

#[test]
fn test_sub_rule_call() {
    let ev = Catalog::default()
        .genotype("rs1", "C/T")
        .with_rule("inner", "RESULT(GENO('rs1', 'N/T'))", 0)
        .evaluator();
    let v = ev.evaluate("RESULT(RULE('inner'))", &sample(), 0).unwrap();
    assert!(v.flag());
}

#[test]
fn test_unknown_sub_rule_fails_enclosing_rule() {
    let ev = Catalog::default().evaluator();
    assert!(ev.evaluate("RESULT(RULE('ghost'))", &sample(), 0).is_none());
}

#[test]
fn test_recursive_rules_fail_fast() {
    let ev = Catalog::default()
        .with_rule("ping", "RESULT(RULE('pong'))", 0)
        .with_rule("pong", "RESULT(RULE('ping'))", 0)
        .evaluator();
    let err = ev.try_evaluate_rule(&sample(), "ping").unwrap_err();
    assert!(matches!(err, LogicError::RuleCycle { .. }));
    assert!(ev.evaluate_rule(&sample(), "ping").is_none());
}

#[test]
fn test_script_without_result_yields_none() {
    let ev = Catalog::default().genotype("rs1", "A/A").evaluator();
    assert!(ev.evaluate("GENO('rs1', 'A/A')", &sample(), 0).is_none());
    assert_eq!(
        ev.try_evaluate("GENO('rs1', 'A/A')", &sample(), 0).unwrap_err(),
        LogicError::MissingResultBinding
    );
}

#[test]
fn test_syntax_error_yields_none() {
    let ev = Catalog::default().evaluator();
    assert!(ev.evaluate("RESULT(GENO('rs1',", &sample(), 0).is_none());
    assert!(ev.evaluate("NOT_A_BUILTIN(1)", &sample(), 0).is_none());
}

#[test]
fn test_deeply_nested_logic_yields_none() {
    let depth = 200_000;
    let logic = format!("RESULT({}1{})", "(".repeat(depth), ")".repeat(depth));
    let ev = Catalog::default().with_rule("deep", &logic, 1).evaluator();
    assert!(ev.evaluate(&logic, &sample(), 0).is_none());
    assert!(ev.evaluate_rule(&sample(), "deep").is_none());
}

#[test]
fn test_arithmetic_score() {
    let ev = Catalog::default().evaluator();
    let v = ev.evaluate("RESULT(1 + 2 * 3 - 1)", &sample(), 0).unwrap();
    assert_eq!(v.kind(), ValueKind::Numeric);
    assert_eq!(v.text_value(), "6");
}

#[test]
fn test_geno_risk_matches_any_listed_allele() {
    let ev = Catalog::default().genotype("rs4680", "A/G").evaluator();
    let v = ev
        .try_evaluate("RESULT(GENO_RISK('rs4680', 'G/G', 3, 'A/G', 2))", &sample(), 0)
        .unwrap();
    assert!(v.flag());

    let v = ev
        .try_evaluate("RESULT(GENO_RISK('rs4680', 'G/G', 3, 'C/C', 2))", &sample(), 0)
        .unwrap();
    assert!(!v.flag());
}

#[test]
fn test_geno_risk_requires_pairs() {
    let ev = Catalog::default().evaluator();
    let err = ev
        .try_evaluate("RESULT(GENO_RISK('rs4680', 'A/G'))", &sample(), 0)
        .unwrap_err();
    assert!(matches!(err, LogicError::InvalidArgument { .. }));
}

#[test]
fn test_set_interest_overrides_bound_result() {
    let ev = Catalog::default().genotype("rs1", "A/G").evaluator();
    let v = ev
        .try_evaluate(
            "RESULT(GENO('rs1', 'A/G'))\nSET_INTEREST(GENO('rs1', 'A/N'), true_interest=4, false_interest=1)",
            &sample(),
            0,
        )
        .unwrap();
    assert_eq!(v.interest_level(), 4.0);
}

#[test]
fn test_set_interest_before_result_fails() {
    let ev = Catalog::default().evaluator();
    let err = ev.try_evaluate("SET_INTEREST(true, 1, 2)\nRESULT(true)", &sample(), 0).unwrap_err();
    assert!(matches!(err, LogicError::InvalidArgument { .. }));
}

#[test]
fn test_accept_result_if_one_value_present() {
    let ev = Catalog::default().genotype("rs1", "A/G").evaluator();
    let v = ev
        .try_evaluate(
            "RESULT(GENO('rs2', 'C/C') & GENO('rs1', 'A/G'))\nACCEPT_RESULT_IF_ATLEAST_ONE_NON_MISSING_VALUE()",
            &sample(),
            0,
        )
        .unwrap();
    assert!(!v.is_unresolvable());
    // Missing data stays on record for the audit trail.
    assert_eq!(v.missing_genotypes(), ["rs2".to_string()]);
}

#[test]
fn test_accept_result_clears_unresolvable() {
    let ev = Catalog::default().evaluator();
    let v = ev
        .try_evaluate("RESULT(true & GENO('rs2', 'C/C')); ACCEPT_RESULT()", &sample(), 0)
        .unwrap();
    assert!(!v.is_unresolvable());
}

#[test]
fn test_allele_equality() {
    let ev = Catalog::default().evaluator();
    let v = ev.try_evaluate("RESULT(ALLELE('A/G') == 'A/N')", &sample(), 0).unwrap();
    assert!(v.flag());
    assert_eq!(v.kind(), ValueKind::Boolean);
}

#[test]
fn test_phenotype_lookup() {
    let ev = Catalog::default().phenotype("eye_colour", "blue").evaluator();
    let v = ev
        .try_evaluate("RESULT(PHENO('eye_colour', 'blue') & PHENO('height', '180'))", &sample(), 0)
        .unwrap();
    assert!(v.flag());
    assert_eq!(v.missing_phenotypes(), ["height".to_string()]);
    assert!(v.missing_genotypes().is_empty());
}
