//! Orchestration policies: retries, timeouts and continuous-run behaviour.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(300);

/// Bounded retry of a failed phase with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub phase_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }
}

/// How lessons from earlier cycles are folded into the next cycle's seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonsMerge {
    /// Every lesson, oldest cycle first.
    #[default]
    Concatenate,
    /// Like `Concatenate`, keeping only the first occurrence of a lesson.
    Deduplicate,
    /// Only the last `n` lessons.
    MostRecent(usize),
}

impl LessonsMerge {
    /// Merge lessons ordered oldest first.
    pub fn merge<'a, I>(&self, lessons: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let all: Vec<String> = lessons.into_iter().map(str::to_string).collect();
        match self {
            Self::Concatenate => all,
            Self::Deduplicate => {
                let mut seen = HashSet::new();
                all.into_iter()
                    .filter(|lesson| seen.insert(lesson.trim().to_lowercase()))
                    .collect()
            }
            Self::MostRecent(n) => {
                let skip = all.len().saturating_sub(*n);
                all.into_iter().skip(skip).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContinuousConfig {
    pub continue_on_failure: bool,
    pub lessons_merge: LessonsMerge,
}

impl ContinuousConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn with_lessons_merge(mut self, merge: LessonsMerge) -> Self {
        self.lessons_merge = merge;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.retry.delay, Duration::from_millis(500));
        assert_eq!(config.phase_timeout, Duration::from_secs(300));

        let continuous = ContinuousConfig::default();
        assert!(!continuous.continue_on_failure);
        assert_eq!(continuous.lessons_merge, LessonsMerge::Concatenate);
    }

    #[test]
    fn test_builder() {
        let config = OrchestratorConfig::new()
            .with_retry(RetryPolicy::none())
            .with_phase_timeout(Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts(), 1);
        assert_eq!(config.phase_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_lessons_merge() {
        let lessons = ["Calibrate scales", "Train operators", "calibrate scales "];

        assert_eq!(LessonsMerge::Concatenate.merge(lessons).len(), 3);
        assert_eq!(
            LessonsMerge::Deduplicate.merge(lessons),
            vec!["Calibrate scales", "Train operators"]
        );
        assert_eq!(
            LessonsMerge::MostRecent(1).merge(lessons),
            vec!["calibrate scales "]
        );
        assert_eq!(LessonsMerge::MostRecent(10).merge(lessons).len(), 3);
    }

    #[test]
    fn test_lessons_merge_from_toml_style_value() {
        let merge: LessonsMerge = serde_json::from_str(r#"{"most_recent": 4}"#).unwrap();
        assert_eq!(merge, LessonsMerge::MostRecent(4));
        let merge: LessonsMerge = serde_json::from_str(r#""deduplicate""#).unwrap();
        assert_eq!(merge, LessonsMerge::Deduplicate);
    }
}
