use std::collections::BTreeSet;
use std::fmt;

use dxflint_core::document::EntityId;
use serde::Serialize;

/// 加载阶段（归一化失败）的规则编号。
pub const LOAD_ERROR_RULE_ID: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    Critical,
    Warning,
    ExportError,
}

impl Bucket {
    pub fn label(self) -> &'static str {
        match self {
            Bucket::Critical => "CRITICAL",
            Bucket::Warning => "WARNING",
            Bucket::ExportError => "EXPORT_ERROR",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub rule_id: u8,
    pub bucket: Bucket,
    pub title: String,
    pub description: String,
    pub cause: String,
    pub suggestion: String,
    pub severity: u8,
    pub affected_entity_ids: BTreeSet<EntityId>,
}

impl Finding {
    /// 严重度限制在 1..=10。
    pub fn new(
        rule_id: u8,
        bucket: Bucket,
        title: impl Into<String>,
        severity: u8,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rule_id,
            bucket,
            title: title.into(),
            description: description.into(),
            cause: String::new(),
            suggestion: String::new(),
            severity: severity.clamp(1, 10),
            affected_entity_ids: BTreeSet::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = cause.into();
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn affecting<'a, I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        self.affected_entity_ids.extend(ids.into_iter().cloned());
        self
    }

    pub fn affecting_one(mut self, id: &EntityId) -> Self {
        self.affected_entity_ids.insert(id.clone());
        self
    }

    /// 归一化阶段单个实体失败时生成的加载错误。
    pub fn load_error(description: impl Into<String>) -> Self {
        Finding::new(
            LOAD_ERROR_RULE_ID,
            Bucket::Critical,
            "Entity could not be loaded",
            8,
            description,
        )
        .cause("The entity is malformed or references geometry that cannot be resolved.")
        .suggestion("Redraw or explode the entity in your CAD tool and export again.")
    }

    /// 报告排序键：规则编号、受影响实体、描述。
    pub(crate) fn sort_key(&self) -> (u8, &BTreeSet<EntityId>, &str) {
        (self.rule_id, &self.affected_entity_ids, &self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_clamped() {
        let finding = Finding::new(9, Bucket::Critical, "x", 42, "d");
        assert_eq!(finding.severity, 10);
        let finding = Finding::new(9, Bucket::Warning, "x", 0, "d");
        assert_eq!(finding.severity, 1);
    }

    #[test]
    fn bucket_serializes_in_screaming_case() {
        let json = serde_json::to_string(&Bucket::ExportError).expect("serialize");
        assert_eq!(json, "\"EXPORT_ERROR\"");
        assert_eq!(Bucket::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn load_error_uses_rule_zero() {
        let finding = Finding::load_error("bad").affecting_one(&EntityId::new("7"));
        assert_eq!(finding.rule_id, LOAD_ERROR_RULE_ID);
        assert_eq!(finding.bucket, Bucket::Critical);
        assert!(finding.affected_entity_ids.contains(&EntityId::new("7")));
    }
}
