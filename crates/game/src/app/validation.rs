use std::collections::{BTreeMap, VecDeque};

use engine::{AudioSource, Vec3};
use tracing::error;

const JOURNAL_CAPACITY: usize = 100;
const RECENT_WINDOW_SECONDS: f64 = 60.0;
const HEALTHY_RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ValidationReport {
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
}

impl ValidationReport {
    pub(crate) fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }
}

pub(crate) fn validate_position(position: Vec3) -> ValidationReport {
    if position.is_finite() {
        ValidationReport::default()
    } else {
        ValidationReport::error(format!(
            "invalid position coordinates ({}, {}, {})",
            position.x, position.y, position.z
        ))
    }
}

pub(crate) fn validate_audio(source: &AudioSource) -> ValidationReport {
    let mut report = if (0.0..=1.0).contains(&source.volume) {
        ValidationReport::default()
    } else {
        ValidationReport::error(format!("audio volume {} outside 0..=1", source.volume))
    };
    if source.clip.trim().is_empty() {
        report.warnings.push("audio source has no clip".to_string());
    }
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum ErrorContext {
    EntityCreation,
    Audio,
    StageTransition,
    SystemUpdate,
}

impl ErrorContext {
    fn critical_threshold(self) -> Option<(usize, &'static str)> {
        match self {
            ErrorContext::EntityCreation => Some((10, "high entity creation failure rate")),
            ErrorContext::Audio => Some((5, "audio loading issues")),
            ErrorContext::StageTransition => Some((3, "stage transition failures")),
            ErrorContext::SystemUpdate => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JournalEntry {
    pub(crate) context: ErrorContext,
    pub(crate) message: String,
    pub(crate) at_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ErrorStats {
    pub(crate) total: usize,
    pub(crate) by_context: BTreeMap<ErrorContext, usize>,
    pub(crate) recent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HealthReport {
    pub(crate) healthy: bool,
    pub(crate) error_count: usize,
    pub(crate) recent_errors: usize,
    pub(crate) critical: Vec<&'static str>,
}

/// Bounded log of recoverable failures, keyed to session time.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorJournal {
    entries: VecDeque<JournalEntry>,
}

impl ErrorJournal {
    pub(crate) fn record(&mut self, context: ErrorContext, message: impl Into<String>, at_seconds: f64) {
        let message = message.into();
        error!(context = ?context, message = %message, "error_recorded");
        self.entries.push_back(JournalEntry {
            context,
            message,
            at_seconds,
        });
        while self.entries.len() > JOURNAL_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn stats(&self, now_seconds: f64) -> ErrorStats {
        let mut stats = ErrorStats {
            total: self.entries.len(),
            ..ErrorStats::default()
        };
        for entry in &self.entries {
            *stats.by_context.entry(entry.context).or_default() += 1;
            if entry.at_seconds > now_seconds - RECENT_WINDOW_SECONDS {
                stats.recent += 1;
            }
        }
        stats
    }

    pub(crate) fn is_healthy(&self, now_seconds: f64) -> bool {
        self.stats(now_seconds).recent < HEALTHY_RECENT_LIMIT
    }

    pub(crate) fn health(&self, now_seconds: f64) -> HealthReport {
        let stats = self.stats(now_seconds);
        let critical = stats
            .by_context
            .iter()
            .filter_map(|(context, count)| {
                context
                    .critical_threshold()
                    .filter(|(limit, _)| count > limit)
                    .map(|(_, label)| label)
            })
            .collect::<Vec<_>>();
        HealthReport {
            healthy: stats.recent < HEALTHY_RECENT_LIMIT && critical.is_empty(),
            error_count: stats.total,
            recent_errors: stats.recent,
            critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_positions_are_rejected() {
        assert!(validate_position(Vec3::new(1.0, 2.0, 3.0)).is_valid());
        assert!(!validate_position(Vec3::new(f32::NAN, 0.0, 0.0)).is_valid());
        assert!(!validate_position(Vec3::new(0.0, f32::INFINITY, 0.0)).is_valid());
    }

    #[test]
    fn audio_volume_must_be_unit_range() {
        assert!(validate_audio(&AudioSource::new("sounds/wind.mp3", true, 0.8)).is_valid());
        assert!(!validate_audio(&AudioSource::new("sounds/wind.mp3", true, 1.2)).is_valid());
        let report = validate_audio(&AudioSource::new("", false, 0.5));
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn journal_keeps_the_latest_hundred() {
        let mut journal = ErrorJournal::default();
        for i in 0..120 {
            journal.record(ErrorContext::SystemUpdate, format!("failure {i}"), f64::from(i));
        }
        assert_eq!(journal.len(), 100);
        assert_eq!(
            journal.entries().next().map(|entry| entry.message.as_str()),
            Some("failure 20")
        );
    }

    #[test]
    fn health_counts_only_the_last_minute() {
        let mut journal = ErrorJournal::default();
        for i in 0..6 {
            journal.record(ErrorContext::Audio, "clip missing", f64::from(i));
        }
        assert!(!journal.is_healthy(10.0));
        assert!(journal.is_healthy(120.0));

        let stats = journal.stats(120.0);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.by_context.get(&ErrorContext::Audio), Some(&6));
    }

    #[test]
    fn repeated_transition_failures_are_critical() {
        let mut journal = ErrorJournal::default();
        for _ in 0..4 {
            journal.record(ErrorContext::StageTransition, "invalid transition", 0.0);
        }
        let report = journal.health(500.0);
        assert!(!report.healthy);
        assert_eq!(report.critical, vec!["stage transition failures"]);
        assert_eq!(report.recent_errors, 0);
    }
}
