//! Recurrence rules.
//!
//! Supports the practical subset of RFC 5545 `RRULE` strings used by
//! automation definitions: `FREQ` (`HOURLY`, `DAILY`, `WEEKLY`), `INTERVAL`,
//! `BYDAY`, `BYHOUR` and `BYMINUTE`. Other keys are ignored.
//!
//! Intervals are anchored at the Unix epoch rather than at a per-rule start
//! date: an `INTERVAL=2;FREQ=DAILY` rule fires on even-numbered epoch days.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};

const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_DAY: i64 = 86_400_000;
const MILLIS_PER_WEEK: i64 = 604_800_000;

/// Hour used by daily and weekly rules without `BYHOUR`.
pub const DEFAULT_HOUR: u32 = 9;

/// Minute used by daily and weekly rules without `BYMINUTE`.
pub const DEFAULT_MINUTE: u32 = 0;

/// How often a rule repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    /// Any other `FREQ` value. Never due.
    Unsupported(String),
}

impl Frequency {
    fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "HOURLY" => Frequency::Hourly,
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            other => Frequency::Unsupported(other.to_string()),
        }
    }
}

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Always at least 1.
    pub interval: u32,
    /// Two-letter weekday codes (`MO`, `TU`, ...), uppercased.
    pub by_day: BTreeSet<String>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: 1,
            by_day: BTreeSet::new(),
            by_hour: Vec::new(),
            by_minute: Vec::new(),
        }
    }
}

impl RecurrenceRule {
    /// Parse a rule string such as `FREQ=DAILY;BYHOUR=9;BYMINUTE=30`.
    ///
    /// Keys are case-insensitive and may appear in any order. An optional
    /// `RRULE:` prefix is accepted. Unparseable list entries are dropped and
    /// a missing or non-positive `INTERVAL` falls back to 1.
    pub fn parse(rule: &str) -> Self {
        let mut parsed = Self::default();

        let rule = rule.trim();
        let body = match rule.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("RRULE:") => &rule[6..],
            _ => rule,
        };

        for part in body.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => parsed.frequency = Frequency::parse(value),
                "INTERVAL" => {
                    parsed.interval = value.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(1);
                }
                "BYDAY" => {
                    parsed.by_day = split_values(value)
                        .map(|day| day.to_ascii_uppercase())
                        .collect();
                }
                "BYHOUR" => {
                    parsed.by_hour = split_values(value).filter_map(|h| h.parse().ok()).collect();
                }
                "BYMINUTE" => {
                    parsed.by_minute = split_values(value).filter_map(|m| m.parse().ok()).collect();
                }
                _ => {}
            }
        }

        parsed
    }

    /// Decide whether the rule fires at `now`.
    ///
    /// A rule that already ran during the same local minute as `now` is never
    /// due, so a scheduler that ticks more than once a minute fires once.
    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>, last_run: Option<&DateTime<Utc>>) -> bool {
        if let Some(last_run) = last_run {
            let last_local = last_run.with_timezone(&now.timezone());
            if same_minute(&last_local.naive_local(), &now.naive_local()) {
                return false;
            }
        }

        let interval = i64::from(self.interval.max(1));
        let millis = now.timestamp_millis();

        match self.frequency {
            Frequency::Hourly => {
                millis.div_euclid(MILLIS_PER_HOUR).rem_euclid(interval) == 0
                    && (self.by_minute.is_empty() || self.by_minute.contains(&now.minute()))
                    && self.matches_day(now)
            }
            Frequency::Daily => {
                millis.div_euclid(MILLIS_PER_DAY).rem_euclid(interval) == 0
                    && self.matches_day(now)
                    && self.matches_time(now)
            }
            Frequency::Weekly => {
                week_start_millis(now).div_euclid(MILLIS_PER_WEEK).rem_euclid(interval) == 0
                    && self.matches_day(now)
                    && self.matches_time(now)
            }
            Frequency::Unsupported(_) => false,
        }
    }

    fn matches_day<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.by_day.is_empty() || self.by_day.contains(weekday_code(now.weekday()))
    }

    fn matches_time<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let hour_ok = if self.by_hour.is_empty() {
            now.hour() == DEFAULT_HOUR
        } else {
            self.by_hour.contains(&now.hour())
        };
        let minute_ok = if self.by_minute.is_empty() {
            now.minute() == DEFAULT_MINUTE
        } else {
            self.by_minute.contains(&now.minute())
        };
        hour_ok && minute_ok
    }
}

fn split_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn same_minute(a: &NaiveDateTime, b: &NaiveDateTime) -> bool {
    a.date() == b.date() && a.hour() == b.hour() && a.minute() == b.minute()
}

/// RFC 5545 two-letter weekday code.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Epoch milliseconds of local midnight on the Monday starting `now`'s week.
fn week_start_millis<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - chrono::Duration::days(days_since_monday);
    let midnight = monday.and_time(chrono::NaiveTime::MIN);

    // Midnight can fall in a DST gap; fall back to reading it as UTC.
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(start) => start.timestamp_millis(),
        None => midnight.and_utc().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};
    use pretty_assertions::assert_eq;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_parse_defaults() {
        let rule = RecurrenceRule::parse("");
        assert_eq!(rule, RecurrenceRule::default());
        assert_eq!(rule.frequency, Frequency::Daily);
        assert_eq!(rule.interval, 1);
    }

    #[test]
    fn test_parse_all_keys() {
        let rule = RecurrenceRule::parse("freq=weekly;Interval=2;byday=mo,FR;BYHOUR=8,17;byminute=15");
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.interval, 2);
        assert_eq!(
            rule.by_day,
            ["FR", "MO"].into_iter().map(String::from).collect()
        );
        assert_eq!(rule.by_hour, vec![8, 17]);
        assert_eq!(rule.by_minute, vec![15]);
    }

    #[test]
    fn test_parse_ignores_unknown_keys_and_garbage() {
        let rule = RecurrenceRule::parse("RRULE:FREQ=HOURLY;COUNT=5;nonsense;BYMINUTE=0,x,30");
        assert_eq!(rule.frequency, Frequency::Hourly);
        assert_eq!(rule.by_minute, vec![0, 30]);
    }

    #[test]
    fn test_parse_invalid_interval_defaults_to_one() {
        assert_eq!(RecurrenceRule::parse("INTERVAL=0").interval, 1);
        assert_eq!(RecurrenceRule::parse("INTERVAL=-3").interval, 1);
        assert_eq!(RecurrenceRule::parse("INTERVAL=abc").interval, 1);
    }

    #[test]
    fn test_hourly_by_minute() {
        let rule = RecurrenceRule::parse("FREQ=HOURLY;BYMINUTE=0,30");
        assert!(rule.is_due(&at("2024-01-01T10:30:00"), None));
        assert!(!rule.is_due(&at("2024-01-01T10:31:00"), None));
        assert!(rule.is_due(&at("2024-01-01T11:00:00"), None));
    }

    #[test]
    fn test_hourly_without_minutes_fires_every_minute() {
        let rule = RecurrenceRule::parse("FREQ=HOURLY");
        assert!(rule.is_due(&at("2024-01-01T10:17:00"), None));
        assert!(rule.is_due(&at("2024-01-01T10:18:00"), Some(&at("2024-01-01T10:17:00"))));
    }

    #[test]
    fn test_hourly_interval() {
        let rule = RecurrenceRule::parse("FREQ=HOURLY;INTERVAL=3;BYMINUTE=0");
        // 2024-01-01T00:00Z is epoch hour 473352, a multiple of 3.
        assert!(rule.is_due(&at("2024-01-01T00:00:00"), None));
        assert!(!rule.is_due(&at("2024-01-01T01:00:00"), None));
        assert!(!rule.is_due(&at("2024-01-01T02:00:00"), None));
        assert!(rule.is_due(&at("2024-01-01T03:00:00"), None));
    }

    #[test]
    fn test_same_minute_never_due() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;BYHOUR=9;BYMINUTE=0");
        let last = at("2024-01-01T09:00:30");
        assert!(!rule.is_due(&at("2024-01-01T09:00:45"), Some(&last)));
        assert!(rule.is_due(&at("2024-01-01T09:00:45"), None));
    }

    #[test]
    fn test_previous_day_run_does_not_block() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;BYHOUR=9;BYMINUTE=0");
        let last = at("2024-01-01T09:00:10");
        assert!(rule.is_due(&at("2024-01-02T09:00:05"), Some(&last)));
    }

    #[test]
    fn test_daily_default_time_is_nine() {
        let rule = RecurrenceRule::parse("FREQ=DAILY");
        assert!(rule.is_due(&at("2024-03-05T09:00:00"), None));
        assert!(!rule.is_due(&at("2024-03-05T09:01:00"), None));
        assert!(!rule.is_due(&at("2024-03-05T10:00:00"), None));
    }

    #[test]
    fn test_daily_interval_uses_epoch_days() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;INTERVAL=2");
        // 2024-01-01 is epoch day 19723 (odd).
        assert!(!rule.is_due(&at("2024-01-01T09:00:00"), None));
        assert!(rule.is_due(&at("2024-01-02T09:00:00"), None));
    }

    #[test]
    fn test_daily_by_day() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;BYDAY=MO,WE;BYHOUR=7;BYMINUTE=45");
        // 2024-01-01 is a Monday.
        assert!(rule.is_due(&at("2024-01-01T07:45:00"), None));
        assert!(!rule.is_due(&at("2024-01-02T07:45:00"), None));
        assert!(rule.is_due(&at("2024-01-03T07:45:00"), None));
    }

    #[test]
    fn test_weekly_interval() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO");
        // The week of 2024-01-01 has index 2817 and is skipped.
        assert!(!rule.is_due(&at("2024-01-01T09:00:00"), None));
        assert!(rule.is_due(&at("2024-01-08T09:00:00"), None));
        assert!(!rule.is_due(&at("2024-01-15T09:00:00"), None));
    }

    #[test]
    fn test_weekly_index_is_stable_across_the_week() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;INTERVAL=2;BYHOUR=12");
        // Sunday 2024-01-14 still belongs to the week starting 2024-01-08.
        assert!(rule.is_due(&at("2024-01-14T12:00:00"), None));
        assert!(!rule.is_due(&at("2024-01-15T12:00:00"), None));
    }

    #[test]
    fn test_unsupported_frequency_never_due() {
        let rule = RecurrenceRule::parse("FREQ=MONTHLY;BYHOUR=9;BYMINUTE=0");
        assert_eq!(rule.frequency, Frequency::Unsupported("MONTHLY".to_string()));
        assert!(!rule.is_due(&at("2024-01-01T09:00:00"), None));
    }

    #[test]
    fn test_local_time_is_used_for_hour_and_minute() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;BYHOUR=9;BYMINUTE=0");
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let nine_local = tz.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        assert!(rule.is_due(&nine_local, None));
        assert!(!rule.is_due(&nine_local.with_timezone(&Utc), None));
    }

    #[test]
    fn test_same_minute_compared_in_local_time() {
        let rule = RecurrenceRule::parse("FREQ=HOURLY");
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 6, 3, 9, 0, 50).unwrap();
        let last = now.with_timezone(&Utc) - Duration::seconds(20);
        assert!(!rule.is_due(&now, Some(&last)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn minute_of_2024() -> impl Strategy<Value = DateTime<Utc>> {
            (0i64..366 * 24 * 60).prop_map(|m| at("2024-01-01T00:00:00") + Duration::minutes(m))
        }

        proptest! {
            #[test]
            fn key_order_does_not_matter(
                hours in prop::collection::vec(0u32..24, 0..3),
                minutes in prop::collection::vec(0u32..60, 0..3),
                interval in 1u32..5,
                reverse in any::<bool>(),
            ) {
                let join = |v: &[u32]| v.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
                let mut parts = vec![
                    "FREQ=DAILY".to_string(),
                    format!("INTERVAL={}", interval),
                    format!("BYHOUR={}", join(&hours)),
                    format!("BYMINUTE={}", join(&minutes)),
                    "BYDAY=SA,MO".to_string(),
                ];
                let forward = RecurrenceRule::parse(&parts.join(";"));
                if reverse {
                    parts.reverse();
                } else {
                    parts.rotate_left(2);
                }
                let shuffled = RecurrenceRule::parse(&parts.join(";"));
                prop_assert_eq!(forward, shuffled);
            }

            #[test]
            fn daily_only_matches_target_time(now in minute_of_2024(), hour in 0u32..24, minute in 0u32..60) {
                let rule = RecurrenceRule::parse(&format!("FREQ=DAILY;BYHOUR={};BYMINUTE={}", hour, minute));
                let due = rule.is_due(&now, None);
                prop_assert_eq!(due, now.hour() == hour && now.minute() == minute);
            }

            #[test]
            fn daily_default_matches_nine(now in minute_of_2024()) {
                let rule = RecurrenceRule::parse("FREQ=DAILY");
                prop_assert_eq!(rule.is_due(&now, None), now.hour() == 9 && now.minute() == 0);
            }

            #[test]
            fn daily_fires_once_per_day(day in 0i64..365) {
                let rule = RecurrenceRule::parse("FREQ=DAILY");
                let start = at("2024-01-01T00:00:00") + Duration::days(day);
                let mut last_run: Option<DateTime<Utc>> = None;
                let mut fired = 0;
                // Tick every 15 seconds through the whole day.
                for tick in 0..(24 * 60 * 4) {
                    let now = start + Duration::seconds(tick * 15);
                    if rule.is_due(&now, last_run.as_ref()) {
                        fired += 1;
                        last_run = Some(now);
                    }
                }
                prop_assert_eq!(fired, 1);
            }

            #[test]
            fn due_check_is_idempotent_within_a_minute(now in minute_of_2024(), offset in 0i64..60) {
                let rule = RecurrenceRule::parse("FREQ=HOURLY");
                prop_assert!(rule.is_due(&now, None));
                let later = now + Duration::seconds(offset);
                if later.minute() == now.minute() {
                    prop_assert!(!rule.is_due(&later, Some(&now)));
                    prop_assert!(!rule.is_due(&later, Some(&now)));
                }
            }
        }
    }
}
