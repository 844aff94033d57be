//! 终端文本输出。

use std::fmt::Write;

use dxflint_engine::{Finding, Report, RuleInfo};

use crate::{FileOutcome, Tally};

pub fn batch(outcomes: &[FileOutcome], tally: &Tally) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => report_block(&mut out, outcome, report),
            (None, error) => {
                let _ = writeln!(
                    out,
                    "DXF ANALYSIS: {}\nFAILED: {}\n",
                    outcome.file.display(),
                    error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    if outcomes.len() > 1 {
        let _ = writeln!(
            out,
            "Files analyzed: {}  with critical errors: {}  with warnings: {}  clean: {}  failed: {}",
            tally.files_analyzed,
            tally.with_critical_errors,
            tally.with_warnings,
            tally.clean,
            tally.failed
        );
    }
    out
}

fn report_block(out: &mut String, outcome: &FileOutcome, report: &Report) {
    let summary = &report.summary;
    let _ = writeln!(out, "DXF ANALYSIS: {}", outcome.file.display());
    let _ = writeln!(
        out,
        "Health: {:.2}%  Status: {}",
        report.health_percentage, report.status
    );
    let _ = writeln!(
        out,
        "Entities: {}  Version: {}  Units: {}",
        report.total_entities, summary.dxf_version, summary.units
    );
    let _ = writeln!(out, "Layers: {}", summary.layers_found.join(", "));
    let _ = writeln!(out);

    section(out, "Critical errors", &report.critical_errors);
    section(out, "Warnings", &report.warnings);
    section(out, "Export errors", &report.export_errors);

    let _ = writeln!(out, "Recommendations:");
    for recommendation in &report.recommendations {
        let _ = writeln!(out, "  - {recommendation}");
    }
    let _ = writeln!(out);
}

fn section(out: &mut String, title: &str, findings: &[Finding]) {
    let _ = writeln!(out, "{title}: {}", findings.len());
    for finding in findings {
        let _ = writeln!(
            out,
            "  [{}] {} (severity {}): {}",
            finding.rule_id, finding.title, finding.severity, finding.description
        );
        if !finding.affected_entity_ids.is_empty() {
            let ids: Vec<&str> = finding
                .affected_entity_ids
                .iter()
                .map(|id| id.as_str())
                .collect();
            let _ = writeln!(out, "      entities: {}", ids.join(", "));
        }
        if !finding.suggestion.is_empty() {
            let _ = writeln!(out, "      fix: {}", finding.suggestion);
        }
    }
    if !findings.is_empty() {
        let _ = writeln!(out);
    }
}

pub fn catalog(rules: &[RuleInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>3}  {:<12}  {:>3}  {:<20}  TITLE", "ID", "BUCKET", "SEV", "NAME");
    for rule in rules {
        let _ = writeln!(
            out,
            "{:>3}  {:<12}  {:>3}  {:<20}  {}",
            rule.id,
            rule.bucket.label(),
            rule.severity,
            rule.name,
            rule.title
        );
    }
    out
}
