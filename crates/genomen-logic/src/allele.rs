//! Genotype allele pattern matching.
//!
//! Alleles are slash-separated (`"A/G"`). In a pattern every `N` stands for
//! any single word character, so `"A/N"` accepts any genotype carrying an `A`.

use regex::Regex;

const SEPARATOR: char = '/';
const WILDCARD: char = 'N';

/// Match a subject genotype against a pattern genotype.
///
/// Every subject allele is tested against the pattern alleles in order and
/// counts once if any of them accepts it. The match holds when the count
/// reaches the number of pattern alleles.
pub fn matches(subject: &str, pattern: &str) -> bool {
    let pattern_parts = split_alleles(pattern);
    let slots: Vec<Option<Regex>> = pattern_parts.iter().map(|p| compile(p)).collect();

    let match_count = split_alleles(subject)
        .into_iter()
        .filter(|allele| {
            slots
                .iter()
                .flatten()
                .any(|slot| slot.is_match(allele))
        })
        .count();

    match_count >= pattern_parts.len()
}

/// Split on `/`, dropping trailing empty alleles. An empty string is a
/// single empty allele.
fn split_alleles(alleles: &str) -> Vec<&str> {
    if alleles.is_empty() {
        return vec![""];
    }
    let mut parts: Vec<&str> = alleles.split(SEPARATOR).collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// Whole-string regex for one pattern allele. Characters other than the
/// wildcard are matched literally.
fn compile(pattern_allele: &str) -> Option<Regex> {
    let body = pattern_allele
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\w");
    Regex::new(&format!("^(?:{body})$")).ok()
}
