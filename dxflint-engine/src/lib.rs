pub mod analyzer;
pub mod findings;
pub mod normalize;
pub mod report;
pub mod rules;
pub mod scoring;

pub use analyzer::{Analyzer, analyze};
pub use deadline::Deadline;
pub use errors::AnalysisError;
pub use findings::{Bucket, Finding, LOAD_ERROR_RULE_ID};
pub use report::{Report, Status, Summary};
pub use rules::{Rule, RuleContext, RuleInfo};

pub mod errors {
    use std::time::Duration;

    use dxflint_config::ConfigError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum AnalysisError {
        #[error("no usable geometry in drawing ({dropped} entities could not be normalized)")]
        NoUsableGeometry { dropped: usize },
        #[error("analysis exceeded its time budget of {budget:?} (elapsed {elapsed:?})")]
        Timeout { budget: Duration, elapsed: Duration },
        #[error("invalid analysis configuration: {0}")]
        InvalidConfig(#[from] ConfigError),
        #[error("failed to build rule worker pool: {0}")]
        WorkerPool(String),
    }
}

pub mod deadline {
    use std::time::{Duration, Instant};

    use crate::errors::AnalysisError;

    /// 单次分析的墙钟预算。
    #[derive(Debug, Clone, Copy)]
    pub struct Deadline {
        start: Instant,
        budget: Option<Duration>,
    }

    impl Deadline {
        pub fn new(budget: Option<Duration>) -> Self {
            Self {
                start: Instant::now(),
                budget,
            }
        }

        #[inline]
        pub fn unlimited() -> Self {
            Self::new(None)
        }

        /// 0 表示不限制。
        pub fn from_secs(secs: u64) -> Self {
            match secs {
                0 => Self::unlimited(),
                secs => Self::new(Some(Duration::from_secs(secs))),
            }
        }

        #[inline]
        pub fn elapsed(&self) -> Duration {
            self.start.elapsed()
        }

        pub fn check(&self) -> Result<(), AnalysisError> {
            let Some(budget) = self.budget else {
                return Ok(());
            };
            let elapsed = self.elapsed();
            if elapsed >= budget {
                return Err(AnalysisError::Timeout { budget, elapsed });
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn zero_budget_expires_immediately() {
            let deadline = Deadline::new(Some(Duration::ZERO));
            assert!(matches!(
                deadline.check(),
                Err(AnalysisError::Timeout { .. })
            ));
        }

        #[test]
        fn unlimited_never_expires() {
            assert!(Deadline::from_secs(0).check().is_ok());
            assert!(Deadline::from_secs(60).check().is_ok());
        }
    }
}
