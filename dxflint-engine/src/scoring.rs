//! 汇总与评分：分桶、健康度、状态与整改建议。

use std::collections::BTreeMap;

use dxflint_config::ScoringConfig;

use crate::findings::{Bucket, Finding, LOAD_ERROR_RULE_ID};
use crate::report::Status;
use crate::rules::Rule;

pub const READY_FOR_CUTTING: &str = "File is ready for laser cutting.";

const LOAD_ERROR_RECOMMENDATION: &str = "Repair or redraw the entities that could not be loaded.";

#[derive(Debug, Default, Clone)]
pub struct Buckets {
    pub critical: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub export_errors: Vec<Finding>,
}

impl Buckets {
    pub fn len(&self) -> usize {
        self.critical.len() + self.warnings.len() + self.export_errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.critical
            .iter()
            .chain(&self.warnings)
            .chain(&self.export_errors)
    }
}

pub fn bucket(findings: impl IntoIterator<Item = Finding>) -> Buckets {
    let mut buckets = Buckets::default();
    for finding in findings {
        match finding.bucket {
            Bucket::Critical => buckets.critical.push(finding),
            Bucket::Warning => buckets.warnings.push(finding),
            Bucket::ExportError => buckets.export_errors.push(finding),
        }
    }
    buckets
}

fn weight(bucket: Bucket, scoring: &ScoringConfig) -> f64 {
    match bucket {
        Bucket::Critical => scoring.critical_weight,
        Bucket::Warning => scoring.warning_weight,
        Bucket::ExportError => scoring.export_weight,
    }
}

/// `100 - Σ(严重度 × 桶权重) / 实体数`，下限 0，保留两位小数。
pub fn health_percentage<'a>(
    findings: impl IntoIterator<Item = &'a Finding>,
    total_entities: usize,
    scoring: &ScoringConfig,
) -> f64 {
    let penalty: f64 = findings
        .into_iter()
        .map(|finding| f64::from(finding.severity) * weight(finding.bucket, scoring))
        .sum();
    let health = (100.0 - penalty / total_entities.max(1) as f64).max(0.0);
    (health * 100.0).round() / 100.0
}

pub fn status(health: f64, has_critical: bool, scoring: &ScoringConfig) -> Status {
    if has_critical || health < scoring.reject_below {
        Status::Rejected
    } else if health >= scoring.pass_threshold {
        Status::Ok
    } else {
        Status::NeedsReview
    }
}

/// 每条触发的规则一条建议，按最高严重度降序、规则编号升序。
pub fn recommendations<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Vec<String> {
    let mut worst: BTreeMap<u8, u8> = BTreeMap::new();
    for finding in findings {
        let severity = worst.entry(finding.rule_id).or_default();
        *severity = (*severity).max(finding.severity);
    }
    if worst.is_empty() {
        return vec![READY_FOR_CUTTING.to_string()];
    }

    let mut ordered: Vec<(u8, u8)> = worst.into_iter().collect();
    ordered.sort_by(|(a_rule, a_sev), (b_rule, b_sev)| b_sev.cmp(a_sev).then(a_rule.cmp(b_rule)));
    ordered
        .into_iter()
        .map(|(rule_id, _)| match Rule::from_id(rule_id) {
            Some(rule) => rule.recommendation().to_string(),
            None if rule_id == LOAD_ERROR_RULE_ID => LOAD_ERROR_RECOMMENDATION.to_string(),
            None => format!("Review findings of rule {rule_id}."),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: Rule, severity: u8) -> Finding {
        rule.finding(severity, "x")
    }

    #[test]
    fn empty_findings_score_full_health() {
        let scoring = ScoringConfig::default();
        let none: Vec<Finding> = Vec::new();
        let health = health_percentage(&none, 10, &scoring);
        assert_eq!(health, 100.0);
        assert_eq!(status(health, false, &scoring), Status::Ok);
        assert_eq!(recommendations(&none), vec![READY_FOR_CUTTING.to_string()]);
    }

    #[test]
    fn penalty_is_normalised_by_entity_count() {
        let scoring = ScoringConfig::default();
        let findings = vec![finding(Rule::OpenPaths, 10)];
        // 10 × 10 / 4 = 25
        assert_eq!(health_percentage(&findings, 4, &scoring), 75.0);
        // 实体数为 0 时按 1 计
        assert_eq!(health_percentage(&findings, 0, &scoring), 0.0);

        let warnings = vec![finding(Rule::SmallText, 4), finding(Rule::Scale, 5)];
        // (4 + 5) × 3 / 7 = 3.857...
        assert_eq!(health_percentage(&warnings, 7, &scoring), 96.14);
    }

    #[test]
    fn adding_findings_never_raises_health() {
        let scoring = ScoringConfig::default();
        let mut findings: Vec<Finding> = Vec::new();
        let mut previous = health_percentage(&findings, 5, &scoring);
        for rule in Rule::ALL {
            findings.push(finding(rule, rule.severity()));
            let current = health_percentage(&findings, 5, &scoring);
            assert!(current <= previous, "{} raised health", rule.name());
            previous = current;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn status_thresholds() {
        let scoring = ScoringConfig::default();
        assert_eq!(status(100.0, true, &scoring), Status::Rejected);
        assert_eq!(status(39.99, false, &scoring), Status::Rejected);
        assert_eq!(status(40.0, false, &scoring), Status::NeedsReview);
        assert_eq!(status(99.99, false, &scoring), Status::NeedsReview);
        assert_eq!(status(100.0, false, &scoring), Status::Ok);
    }

    #[test]
    fn buckets_split_by_finding_bucket() {
        let buckets = bucket(vec![
            finding(Rule::OpenPaths, 10),
            finding(Rule::Units, 5),
            finding(Rule::NestedBlocks, 4),
            Finding::load_error("bad"),
        ]);
        assert_eq!(buckets.critical.len(), 2);
        assert_eq!(buckets.warnings.len(), 1);
        assert_eq!(buckets.export_errors.len(), 1);
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn recommendations_are_deduplicated_and_ordered() {
        let findings = vec![
            finding(Rule::SmallText, 4),
            finding(Rule::EditableText, 8),
            finding(Rule::SmallText, 4),
            finding(Rule::Scale, 5),
            finding(Rule::OutOfArea, 8),
            Finding::load_error("bad"),
        ];
        let recommendations = recommendations(&findings);
        assert_eq!(
            recommendations,
            vec![
                LOAD_ERROR_RECOMMENDATION.to_string(),
                Rule::EditableText.recommendation().to_string(),
                Rule::OutOfArea.recommendation().to_string(),
                Rule::Scale.recommendation().to_string(),
                Rule::SmallText.recommendation().to_string(),
            ]
        );
    }
}
