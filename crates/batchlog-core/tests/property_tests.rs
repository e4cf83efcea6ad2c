//! Property-based tests for thresholds, roll-over and date rules
//!
//! Uses proptest to verify invariants that must hold for any input.

use std::fs;

use batchlog_core::logging::archive::DateRule;
use batchlog_core::logging::roll::{generation_path, roll_generations};
use batchlog_core::logging::{allow_log, LogLevel};
use chrono::NaiveDate;
use proptest::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Strategy Generators
// ============================================================================

fn level_strategy() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::None),
        Just(LogLevel::Fatal),
        Just(LogLevel::Error),
        Just(LogLevel::Warn),
        Just(LogLevel::Info),
        Just(LogLevel::Debug),
    ]
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1990i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Raising the threshold never hides a message that a lower one admitted
    #[test]
    fn threshold_is_monotonic(
        level in level_strategy(),
        a in level_strategy(),
        b in level_strategy(),
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if allow_log(level, low) {
            prop_assert!(allow_log(level, high));
        }
    }

    /// Nothing passes a None threshold and a None message never passes
    #[test]
    fn none_blocks_everything(level in level_strategy()) {
        prop_assert!(!allow_log(level, LogLevel::None));
        prop_assert!(!allow_log(LogLevel::None, level));
    }

    /// Level names parse back to the same level
    #[test]
    fn level_names_parse(level in level_strategy()) {
        prop_assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
    }

    /// Current and legacy file names yield the date they were built from
    #[test]
    fn date_rules_recover_dates(date in date_strategy()) {
        let current = format!("Import_{}.txt", date.format("%Y-%m-%d"));
        let legacy = format!("Import_{}.txt", date.format("%m-%d-%Y"));

        prop_assert!(DateRule::current().matches(&current));
        prop_assert_eq!(DateRule::current().parse_date(&current), Some(date));
        prop_assert!(DateRule::legacy().matches(&legacy));
        prop_assert_eq!(DateRule::legacy().parse_date(&legacy), Some(date));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rolling any number of times keeps at most `max` backups and the
    /// newest backup always holds the last rolled content
    #[test]
    fn roll_keeps_at_most_max_generations(max in 1usize..6, rolls in 1usize..12) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("App.txt");

        for i in 0..rolls {
            fs::write(&path, format!("roll {}", i)).unwrap();
            let report = roll_generations(&path, max);
            prop_assert!(report.rolled);
            prop_assert!(report.warnings.is_empty());
        }

        let kept = (1..=max + 2)
            .filter(|n| generation_path(&path, *n).exists())
            .count();
        prop_assert_eq!(kept, rolls.min(max));
        prop_assert!(!generation_path(&path, max + 1).exists());
        prop_assert_eq!(
            fs::read_to_string(generation_path(&path, 1)).unwrap(),
            format!("roll {}", rolls - 1)
        );
    }
}
