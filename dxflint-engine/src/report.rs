//! 报告组装：确定性排序后拼装各字段，不做额外计算。

use std::fmt;

use dxflint_config::ScoringConfig;
use dxflint_core::document::Document;
use serde::Serialize;

use crate::findings::Finding;
use crate::scoring::{self, Buckets};

const UNKNOWN_VERSION: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    NeedsReview,
    Rejected,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NeedsReview => "NEEDS_REVIEW",
            Status::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_entities: usize,
    pub critical_errors_count: usize,
    pub warnings_count: usize,
    pub export_errors_count: usize,
    pub layers_found: Vec<String>,
    pub dxf_version: String,
    pub units: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_entities: usize,
    pub health_percentage: f64,
    pub status: Status,
    pub critical_errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub export_errors: Vec<Finding>,
    pub summary: Summary,
    pub recommendations: Vec<String>,
}

fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

impl Report {
    /// 由归一化文档与全部发现（含加载错误）组装报告。
    pub fn assemble(
        document: &Document,
        findings: impl IntoIterator<Item = Finding>,
        scoring: &ScoringConfig,
    ) -> Self {
        let Buckets {
            mut critical,
            mut warnings,
            mut export_errors,
        } = scoring::bucket(findings);
        sort_findings(&mut critical);
        sort_findings(&mut warnings);
        sort_findings(&mut export_errors);

        let total_entities = document.entities().len();
        let all = || critical.iter().chain(&warnings).chain(&export_errors);
        let health_percentage = scoring::health_percentage(all(), total_entities, scoring);
        let status = scoring::status(health_percentage, !critical.is_empty(), scoring);
        let recommendations = scoring::recommendations(all());

        let summary = Summary {
            total_entities,
            critical_errors_count: critical.len(),
            warnings_count: warnings.len(),
            export_errors_count: export_errors.len(),
            layers_found: document.layer_names(),
            dxf_version: document
                .version()
                .unwrap_or(UNKNOWN_VERSION)
                .to_string(),
            units: document.units().label(),
            status,
        };

        Self {
            total_entities,
            health_percentage,
            status,
            critical_errors: critical,
            warnings,
            export_errors,
            summary,
            recommendations,
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.critical_errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.export_errors)
    }

    pub fn finding_count(&self) -> usize {
        self.critical_errors.len() + self.warnings.len() + self.export_errors.len()
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }
}
