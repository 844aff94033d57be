use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "DXFLINT_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置，加载后立即校验分析参数。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.analysis.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `DXFLINT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// 健康分与状态判定参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "ScoringConfig::default_critical_weight")]
    pub critical_weight: f64,
    #[serde(default = "ScoringConfig::default_warning_weight")]
    pub warning_weight: f64,
    #[serde(default = "ScoringConfig::default_export_weight")]
    pub export_weight: f64,
    /// 无严重错误且健康分不低于此值时判定为 OK。
    #[serde(default = "ScoringConfig::default_pass_threshold")]
    pub pass_threshold: f64,
    /// 健康分低于此值时直接拒绝。
    #[serde(default = "ScoringConfig::default_reject_below")]
    pub reject_below: f64,
}

impl ScoringConfig {
    fn default_critical_weight() -> f64 {
        10.0
    }

    fn default_warning_weight() -> f64 {
        3.0
    }

    fn default_export_weight() -> f64 {
        5.0
    }

    fn default_pass_threshold() -> f64 {
        100.0
    }

    fn default_reject_below() -> f64 {
        40.0
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_weight: Self::default_critical_weight(),
            warning_weight: Self::default_warning_weight(),
            export_weight: Self::default_export_weight(),
            pass_threshold: Self::default_pass_threshold(),
            reject_below: Self::default_reject_below(),
        }
    }
}

/// 分析阈值。所有长度单位均为毫米。
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "AnalysisConfig::default_recognized_layers")]
    pub recognized_layers: Vec<String>,
    #[serde(default = "AnalysisConfig::default_cut_layers")]
    pub cut_layers: Vec<String>,
    #[serde(default = "AnalysisConfig::default_reference_layer_patterns")]
    pub reference_layer_patterns: Vec<String>,
    #[serde(default = "AnalysisConfig::default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "AnalysisConfig::default_z_tolerance")]
    pub z_tolerance: f64,
    #[serde(default = "AnalysisConfig::default_duplicate_tolerance")]
    pub duplicate_tolerance: f64,
    #[serde(default = "AnalysisConfig::default_min_size_mm")]
    pub min_size_mm: f64,
    #[serde(default = "AnalysisConfig::default_max_size_mm")]
    pub max_size_mm: f64,
    #[serde(default = "AnalysisConfig::default_min_text_height_mm")]
    pub min_text_height_mm: f64,
    #[serde(default = "AnalysisConfig::default_max_polyline_points")]
    pub max_polyline_points: usize,
    #[serde(default = "AnalysisConfig::default_max_origin_distance_mm")]
    pub max_origin_distance_mm: f64,
    #[serde(default = "AnalysisConfig::default_min_vector_distance_mm")]
    pub min_vector_distance_mm: f64,
    #[serde(default = "AnalysisConfig::default_max_block_depth")]
    pub max_block_depth: u32,
    #[serde(default = "AnalysisConfig::default_max_entities")]
    pub max_entities: usize,
    #[serde(default = "AnalysisConfig::default_max_total_points")]
    pub max_total_points: usize,
    #[serde(default = "AnalysisConfig::default_max_file_size_mb")]
    pub max_file_size_mb: f64,
    #[serde(default = "AnalysisConfig::default_supported_versions")]
    pub supported_versions: Vec<String>,
    /// 单次分析的时间预算，0 表示不限制。
    #[serde(default = "AnalysisConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// 规则并行线程数，0 表示使用 rayon 全局线程池。
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl AnalysisConfig {
    fn default_recognized_layers() -> Vec<String> {
        strings(&["CUT", "ENGRAVE", "MARK", "ETCH", "SCORE", "REFERENCE"])
    }

    fn default_cut_layers() -> Vec<String> {
        strings(&["CUT", "ENGRAVE", "MARK"])
    }

    fn default_reference_layer_patterns() -> Vec<String> {
        strings(&["LAYER 0", "SKETCH", "REFERENCE", "GUIDE", "DEFPOINTS"])
    }

    fn default_tolerance() -> f64 {
        0.01
    }

    fn default_z_tolerance() -> f64 {
        0.001
    }

    fn default_duplicate_tolerance() -> f64 {
        0.001
    }

    fn default_min_size_mm() -> f64 {
        5.0
    }

    fn default_max_size_mm() -> f64 {
        3000.0
    }

    fn default_min_text_height_mm() -> f64 {
        2.0
    }

    fn default_max_polyline_points() -> usize {
        100
    }

    fn default_max_origin_distance_mm() -> f64 {
        2000.0
    }

    fn default_min_vector_distance_mm() -> f64 {
        0.1
    }

    fn default_max_block_depth() -> u32 {
        16
    }

    fn default_max_entities() -> usize {
        50_000
    }

    fn default_max_total_points() -> usize {
        500_000
    }

    fn default_max_file_size_mb() -> f64 {
        50.0
    }

    fn default_supported_versions() -> Vec<String> {
        strings(&[
            "AC1009", "AC1012", "AC1014", "AC1015", "AC1018", "AC1021", "AC1024", "AC1027",
        ])
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn contains_ignore_case(values: &[String], name: &str) -> bool {
        let name = name.trim();
        values.iter().any(|value| value.eq_ignore_ascii_case(name))
    }

    pub fn is_recognized_layer(&self, name: &str) -> bool {
        Self::contains_ignore_case(&self.recognized_layers, name)
    }

    pub fn is_cut_layer(&self, name: &str) -> bool {
        Self::contains_ignore_case(&self.cut_layers, name)
    }

    pub fn supports_version(&self, version: &str) -> bool {
        Self::contains_ignore_case(&self.supported_versions, version)
    }

    /// 返回图层名中命中的第一个参考图层片段（不区分大小写的子串匹配）。
    pub fn reference_pattern_for(&self, name: &str) -> Option<&str> {
        let upper = name.to_ascii_uppercase();
        self.reference_layer_patterns
            .iter()
            .find(|pattern| !pattern.is_empty() && upper.contains(&pattern.to_ascii_uppercase()))
            .map(String::as_str)
    }

    /// 校验阈值的取值范围与相互关系。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tolerance", self.tolerance),
            ("duplicate_tolerance", self.duplicate_tolerance),
            ("min_vector_distance_mm", self.min_vector_distance_mm),
            ("min_size_mm", self.min_size_mm),
            ("max_size_mm", self.max_size_mm),
            ("min_text_height_mm", self.min_text_height_mm),
            ("max_origin_distance_mm", self.max_origin_distance_mm),
            ("max_file_size_mb", self.max_file_size_mb),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(format!("{name} 必须为正数，当前值 {value}")));
            }
        }
        if !(self.z_tolerance.is_finite() && self.z_tolerance >= 0.0) {
            return Err(ConfigError::invalid(format!(
                "z_tolerance 不能为负数，当前值 {}",
                self.z_tolerance
            )));
        }
        if self.min_size_mm >= self.max_size_mm {
            return Err(ConfigError::invalid(format!(
                "min_size_mm ({}) 必须小于 max_size_mm ({})",
                self.min_size_mm, self.max_size_mm
            )));
        }
        if self.max_block_depth == 0 {
            return Err(ConfigError::invalid("max_block_depth 至少为 1"));
        }
        if self.max_polyline_points == 0 || self.max_entities == 0 || self.max_total_points == 0 {
            return Err(ConfigError::invalid(
                "max_polyline_points、max_entities 与 max_total_points 必须大于 0",
            ));
        }
        self.scoring.validate()
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("critical_weight", self.critical_weight),
            ("warning_weight", self.warning_weight),
            ("export_weight", self.export_weight),
        ];
        for (name, value) in weights {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(format!("{name} 不能为负数，当前值 {value}")));
            }
        }
        for (name, value) in [
            ("pass_threshold", self.pass_threshold),
            ("reject_below", self.reject_below),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::invalid(format!(
                    "{name} 必须位于 0 到 100 之间，当前值 {value}"
                )));
            }
        }
        if self.reject_below > self.pass_threshold {
            return Err(ConfigError::invalid(format!(
                "reject_below ({}) 不能高于 pass_threshold ({})",
                self.reject_below, self.pass_threshold
            )));
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recognized_layers: Self::default_recognized_layers(),
            cut_layers: Self::default_cut_layers(),
            reference_layer_patterns: Self::default_reference_layer_patterns(),
            tolerance: Self::default_tolerance(),
            z_tolerance: Self::default_z_tolerance(),
            duplicate_tolerance: Self::default_duplicate_tolerance(),
            min_size_mm: Self::default_min_size_mm(),
            max_size_mm: Self::default_max_size_mm(),
            min_text_height_mm: Self::default_min_text_height_mm(),
            max_polyline_points: Self::default_max_polyline_points(),
            max_origin_distance_mm: Self::default_max_origin_distance_mm(),
            min_vector_distance_mm: Self::default_min_vector_distance_mm(),
            max_block_depth: Self::default_max_block_depth(),
            max_entities: Self::default_max_entities(),
            max_total_points: Self::default_max_total_points(),
            max_file_size_mb: Self::default_max_file_size_mb(),
            supported_versions: Self::default_supported_versions(),
            timeout_secs: Self::default_timeout_secs(),
            workers: 0,
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.output.format, OutputFormat::Text);
        assert_eq!(cfg.analysis.max_polyline_points, 100);
        assert_eq!(cfg.analysis.timeout_secs, 30);
        assert!(cfg.analysis.validate().is_ok());
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [output]
            format = "json"

            [analysis]
            cut_layers = ["CUT"]
            min_text_height_mm = 1.5
            workers = 2

            [analysis.scoring]
            pass_threshold = 90.0
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.output.format, OutputFormat::Json);
        assert_eq!(cfg.analysis.cut_layers, vec!["CUT".to_string()]);
        assert_eq!(cfg.analysis.min_text_height_mm, 1.5);
        assert_eq!(cfg.analysis.workers, 2);
        assert_eq!(cfg.analysis.scoring.pass_threshold, 90.0);
        // 未写出的字段保持默认值
        assert_eq!(cfg.analysis.scoring.reject_below, 40.0);
        assert_eq!(cfg.analysis.recognized_layers.len(), 6);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [analysis]
            min_size_mm = 50.0
            max_size_mm = 10.0
            "#
        )
        .unwrap();

        let err = AppConfig::from_file(file.path()).expect_err("should reject");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[analysis\ntolerance = ").unwrap();
        let err = AppConfig::from_file(file.path()).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn layer_helpers_ignore_case() {
        let cfg = AnalysisConfig::default();
        assert!(cfg.is_recognized_layer("engrave"));
        assert!(cfg.is_cut_layer(" Cut "));
        assert!(!cfg.is_cut_layer("ETCH"));
        assert!(cfg.supports_version("ac1015"));
        assert!(!cfg.supports_version("AC1032"));
        assert_eq!(cfg.reference_pattern_for("my_sketch_v2"), Some("SKETCH"));
        assert_eq!(cfg.reference_pattern_for("CUT"), None);
    }

    #[test]
    fn scoring_thresholds_must_be_ordered() {
        let mut cfg = AnalysisConfig::default();
        cfg.scoring.reject_below = 95.0;
        cfg.scoring.pass_threshold = 80.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.tolerance = 0.0;
        assert!(cfg.validate().is_err());
    }
}
