use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dxflint_config::{AppConfig, ConfigError, OutputFormat};
use dxflint_engine::{Analyzer, Report, Rule, Status};
use dxflint_io::{DrawingLoader, DxfFacade};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

mod render;

/// 配置或用法错误的退出码；clap 的参数错误同样为 2。
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "dxflint", version, about = "Pre-flight checks for laser-cutting DXF drawings")]
struct Cli {
    /// Configuration file (defaults to $DXFLINT_CONFIG or ./config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze DXF files or directories of DXF files
    Analyze(AnalyzeArgs),
    /// List the rule catalog
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Files or directories; directories are searched recursively for *.dxf
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Which report status makes the command fail
    #[arg(long, value_enum, default_value_t = FailOn::Rejected)]
    fail_on: FailOn,
}

#[derive(Debug, Args)]
struct CatalogArgs {
    #[arg(long, value_enum)]
    format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl Format {
    fn resolve(flag: Option<Format>, config: &AppConfig) -> Format {
        flag.unwrap_or(match config.output.format {
            OutputFormat::Text => Format::Text,
            OutputFormat::Json => Format::Json,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailOn {
    Rejected,
    Review,
    Never,
}

impl FailOn {
    fn trips(self, status: Status) -> bool {
        match self {
            FailOn::Rejected => status == Status::Rejected,
            FailOn::Review => status != Status::Ok,
            FailOn::Never => false,
        }
    }
}

/// 单个文件的分析结果；加载或分析失败时只保留错误信息。
#[derive(Debug, Serialize)]
pub(crate) struct FileOutcome {
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct Tally {
    pub files_analyzed: usize,
    pub with_critical_errors: usize,
    pub with_warnings: usize,
    pub clean: usize,
    pub failed: usize,
}

impl Tally {
    fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        let mut tally = Tally::default();
        for outcome in outcomes {
            let Some(report) = &outcome.report else {
                tally.failed += 1;
                continue;
            };
            tally.files_analyzed += 1;
            if !report.critical_errors.is_empty() {
                tally.with_critical_errors += 1;
            }
            if !report.warnings.is_empty() {
                tally.with_warnings += 1;
            }
            if report.is_clean() {
                tally.clean += 1;
            }
        }
        tally
    }
}

#[derive(Debug, Serialize)]
struct BatchOutput<'a> {
    files: &'a [FileOutcome],
    tally: &'a Tally,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("dxflint: {err:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    init_logging(&config, cli.verbose);

    let result = match &cli.command {
        Command::Analyze(args) => run_analyze(&config, args),
        Command::Catalog(args) => run_catalog(&config, args).map(|()| true),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("dxflint: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// 显式指定的配置必须可用；自动发现失败时退回内建默认值。
fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = override_path {
        return AppConfig::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()));
    }
    match AppConfig::discover() {
        Ok(config) => Ok(config),
        Err(err @ ConfigError::Invalid(_)) => Err(err).context("默认配置无效"),
        Err(err) => {
            eprintln!("dxflint: 加载默认配置失败，使用内建默认值: {err}");
            Ok(AppConfig::default())
        }
    }
}

fn init_logging(config: &AppConfig, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

/// 返回 `Ok(false)` 表示有文件失败或状态门槛被触发。
fn run_analyze(config: &AppConfig, args: &AnalyzeArgs) -> Result<bool> {
    let files = collect_inputs(&args.paths)?;
    if files.is_empty() {
        bail!("在给定路径中没有找到 DXF 文件");
    }
    info!(files = files.len(), "开始分析");

    let analyzer = Analyzer::new(config.analysis.clone()).context("无法创建分析器")?;
    let loader = DxfFacade::new();
    let outcomes: Vec<FileOutcome> = files
        .into_iter()
        .map(|file| analyze_file(&analyzer, &loader, file))
        .collect();
    let tally = Tally::from_outcomes(&outcomes);

    let rendered = match Format::resolve(args.format, config) {
        Format::Json => {
            let mut json = serde_json::to_string_pretty(&BatchOutput {
                files: &outcomes,
                tally: &tally,
            })
            .context("无法序列化分析结果")?;
            json.push('\n');
            json
        }
        Format::Text => render::batch(&outcomes, &tally),
    };
    emit(&rendered, args.output.as_deref())?;

    let gate_tripped = outcomes
        .iter()
        .filter_map(|outcome| outcome.report.as_ref())
        .any(|report| args.fail_on.trips(report.status));
    Ok(tally.failed == 0 && !gate_tripped)
}

fn analyze_file(analyzer: &Analyzer, loader: &DxfFacade, file: PathBuf) -> FileOutcome {
    let result = loader
        .load(&file)
        .map_err(anyhow::Error::from)
        .and_then(|drawing| analyzer.analyze(&drawing).map_err(anyhow::Error::from));
    match result {
        Ok(report) => {
            info!(
                file = %file.display(),
                status = %report.status,
                health = report.health_percentage,
                "文件分析完成"
            );
            FileOutcome {
                file,
                report: Some(report),
                error: None,
            }
        }
        Err(err) => {
            warn!(file = %file.display(), error = %err, "文件分析失败");
            FileOutcome {
                file,
                report: None,
                error: Some(format!("{err:#}")),
            }
        }
    }
}

/// 目录递归查找 `*.dxf`（不区分大小写），按文件名排序；文件路径原样保留。
fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("无法遍历目录 {}", path.display()))?;
            let is_dxf = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dxf"));
            if entry.file_type().is_file() && is_dxf {
                files.push(entry.into_path());
            }
        }
    }
    debug!(count = files.len(), "收集到待分析文件");
    Ok(files)
}

fn run_catalog(config: &AppConfig, args: &CatalogArgs) -> Result<()> {
    let catalog = Rule::catalog();
    let rendered = match Format::resolve(args.format, config) {
        Format::Json => {
            let mut json = serde_json::to_string_pretty(&catalog).context("无法序列化规则目录")?;
            json.push('\n');
            json
        }
        Format::Text => render::catalog(&catalog),
    };
    emit(&rendered, None)
}

fn emit(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("无法写入输出文件 {}", path.display())),
        None => {
            print!("{rendered}");
            Ok(())
        }
    }
}
