//! Read-only views over externally supplied rules and sample data.

use genomen_common::{Result, Rule, Sample, TraitInfo};

/// Data type of genotype attributes.
pub const SNP: &str = "SNP";
/// Field holding a genotype's allele string.
pub const ALLELE_FIELD: &str = "ALLELE";
/// Data type of phenotype attributes.
pub const PHENOTYPE: &str = "PHENOTYPE";
/// Field holding a phenotype's observed value.
pub const PHENOTYPE_FIELD: &str = "VALUE";

/// The rule catalog. Read-only after load and shared across workers.
pub trait RuleRepository: Send + Sync {
    /// Every rule not marked as a sub-rule.
    fn top_level_rules(&self) -> Result<Vec<Rule>>;

    fn rule(&self, rule_id: &str) -> Result<Option<Rule>>;

    fn rule_logic(&self, rule_id: &str) -> Result<Option<String>> {
        Ok(self.rule(rule_id)?.map(|r| r.logic))
    }

    /// Display metadata for a trait, if the catalog has any.
    fn trait_info(&self, _trait_id: &str, _language: &str) -> Result<Option<TraitInfo>> {
        Ok(None)
    }

    /// Human-readable description of a text effect, if the catalog has one.
    fn result_description(&self, _effect: &str, _language: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Per-sample attribute store filled by importers.
pub trait SampleDataRepository: Send + Sync {
    fn attribute(
        &self,
        data_type: &str,
        sample_id: &str,
        attribute_key: &str,
        field: &str,
    ) -> Result<Option<String>>;

    /// Look up a sample persisted by an earlier task.
    fn find_sample(&self, sample_id: &str) -> Result<Option<Sample>>;
}
