//! Skip/process decision from source and target watermarks.

use std::fmt;

use crate::model::Watermark;

/// Why a dataset is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessReason {
    /// The caller forced reprocessing.
    Forced,
    /// No target watermark: first sync, or the target was removed.
    FirstSync,
    /// The source was modified after the target.
    SourceNewer,
}

/// Why a dataset is skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Source is not newer than the target (equal counts as not newer).
    UpToDate {
        source_modified: Watermark,
        target_modified: Watermark,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpToDate {
                source_modified,
                target_modified,
            } => write!(
                f,
                "up to date (source modified {source_modified}, target modified {target_modified})"
            ),
        }
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Process(ProcessReason),
    Skip(SkipReason),
}

impl Decision {
    pub fn is_process(&self) -> bool {
        matches!(self, Decision::Process(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip(_))
    }
}

/// Decide whether a dataset needs processing.
///
/// - `force` always processes.
/// - A missing target watermark always processes.
/// - `source_modified <= target_modified` skips.
/// - Otherwise processes.
pub fn decide(
    source_modified: &Watermark,
    target_modified: Option<&Watermark>,
    force: bool,
) -> Decision {
    if force {
        return Decision::Process(ProcessReason::Forced);
    }
    match target_modified {
        None => Decision::Process(ProcessReason::FirstSync),
        Some(target) if source_modified <= target => Decision::Skip(SkipReason::UpToDate {
            source_modified: source_modified.clone(),
            target_modified: target.clone(),
        }),
        Some(_) => Decision::Process(ProcessReason::SourceNewer),
    }
}

#[cfg(test)]
mod tests {
    use super::{decide, Decision, ProcessReason};
    use crate::model::Watermark;

    fn wm(s: &str) -> Watermark {
        Watermark::from(s)
    }

    #[test]
    fn equal_watermarks_skip() {
        let m = wm("2021-05-01");
        assert!(decide(&m, Some(&m), false).is_skip());
    }

    #[test]
    fn missing_target_processes() {
        assert_eq!(
            decide(&wm("2021-05-01"), None, false),
            Decision::Process(ProcessReason::FirstSync)
        );
    }

    #[test]
    fn force_always_processes() {
        let cases = [
            (wm("2021-05-01"), Some(wm("2021-05-01"))),
            (wm("2021-05-01"), Some(wm("2022-01-01"))),
            (wm("2021-05-01"), None),
            (wm("garbage"), Some(wm("zzz"))),
        ];
        for (source, target) in cases {
            assert_eq!(
                decide(&source, target.as_ref(), true),
                Decision::Process(ProcessReason::Forced)
            );
        }
    }

    #[test]
    fn newer_source_processes_older_source_skips() {
        assert_eq!(
            decide(&wm("2021-05-01"), Some(&wm("2021-04-01")), false),
            Decision::Process(ProcessReason::SourceNewer)
        );
        assert!(decide(&wm("2021-05-01"), Some(&wm("2021-06-01")), false).is_skip());
    }

    #[test]
    fn decide_is_deterministic() {
        let s = wm("2021-05-01T12:00:00");
        let t = wm("2021-05-01T11:59:59");
        let first = decide(&s, Some(&t), false);
        for _ in 0..10 {
            assert_eq!(decide(&s, Some(&t), false), first);
        }
    }
}
