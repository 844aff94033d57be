//! 分析流水线：归一化 → 并行执行规则 → 汇总评分 → 组装报告。

use dxflint_config::AnalysisConfig;
use dxflint_core::document::Document;
use dxflint_core::drawing::Drawing;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::deadline::Deadline;
use crate::errors::AnalysisError;
use crate::findings::Finding;
use crate::normalize::{Normalized, normalize};
use crate::report::Report;
use crate::rules::{Rule, RuleContext};

#[derive(Debug)]
pub struct Analyzer {
    config: AnalysisConfig,
    /// `workers > 0` 时使用独立线程池，否则使用 rayon 全局池。
    pool: Option<rayon::ThreadPool>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let pool = match config.workers {
            0 => None,
            workers => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|index| format!("dxflint-rule-{index}"))
                    .build()
                    .map_err(|err| AnalysisError::WorkerPool(err.to_string()))?,
            ),
        };
        Ok(Self { config, pool })
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// 使用配置中的时间预算分析一张图纸。
    pub fn analyze(&self, drawing: &Drawing) -> Result<Report, AnalysisError> {
        self.analyze_with_deadline(drawing, Deadline::from_secs(self.config.timeout_secs))
    }

    pub fn analyze_with_deadline(
        &self,
        drawing: &Drawing,
        deadline: Deadline,
    ) -> Result<Report, AnalysisError> {
        let Normalized {
            document,
            load_findings,
        } = normalize(drawing, &self.config, &deadline)?;

        let findings = self.evaluate_rules(&document, &deadline)?;
        deadline.check()?;

        let report = Report::assemble(
            &document,
            load_findings.into_iter().chain(findings),
            &self.config.scoring,
        );
        info!(
            entities = report.total_entities,
            health = report.health_percentage,
            status = %report.status,
            critical = report.critical_errors.len(),
            warnings = report.warnings.len(),
            export_errors = report.export_errors.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "分析完成"
        );
        Ok(report)
    }

    /// 并行执行全部规则；任一规则开始前发现超时即整体失败。
    pub fn evaluate_rules(
        &self,
        document: &Document,
        deadline: &Deadline,
    ) -> Result<Vec<Finding>, AnalysisError> {
        let ctx = RuleContext::new(document, &self.config);
        let run = || {
            Rule::ALL
                .par_iter()
                .map(|rule| {
                    deadline.check()?;
                    let findings = rule.evaluate(&ctx);
                    debug!(
                        rule = rule.id(),
                        name = rule.name(),
                        findings = findings.len(),
                        "规则执行完毕"
                    );
                    Ok(findings)
                })
                .collect::<Result<Vec<Vec<Finding>>, AnalysisError>>()
        };
        let per_rule = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }?;
        Ok(per_rule.into_iter().flatten().collect())
    }
}

/// 一次性分析入口。
pub fn analyze(drawing: &Drawing, config: &AnalysisConfig) -> Result<Report, AnalysisError> {
    Analyzer::new(config.clone())?.analyze(drawing)
}
