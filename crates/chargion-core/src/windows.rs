// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ChargION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Time-window service: block and activation windows for the night logic.
//!
//! All functions are pure in the reference instant, so tests drive them with
//! fixed clocks. Windows are recomputed per query and never cached across
//! calendar days.

use anyhow::{Context, Result};
use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone};
use chrono_tz::Tz;

use chargion_types::config::LocationConfig;
use chargion_types::decision::CarReadyPolicy;

use crate::solar;

// ============= Time Window =============

/// A resolved time span. Invariant: `start < end` after resolution; a span
/// that appears to cross midnight has been resolved by picking the correct
/// calendar occurrence of each endpoint, never by same-day comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl TimeWindow {
    /// Strict containment: endpoints themselves are outside
    pub fn contains(&self, t: DateTime<Tz>) -> bool {
        self.start < t && t < self.end
    }
}

// ============= Occurrence Resolution =============

/// How to pick the calendar day for a clock time relative to a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceDirection {
    /// Earliest instant at or after the reference with that clock time
    /// (today if not yet passed, otherwise tomorrow)
    NextFutureOrSame,
    /// Today's instant regardless of whether it has passed. Needed because a
    /// window boundary in the past relative to "now" can still be the
    /// correct boundary of a window that started yesterday.
    TodayEvenIfPast,
}

/// Resolve a clock time to a concrete instant near the reference
pub fn resolve_occurrence(
    clock_time: NaiveTime,
    reference: DateTime<Tz>,
    direction: OccurrenceDirection,
) -> Result<DateTime<Tz>> {
    let tz = reference.timezone();
    let today = reference.date_naive();

    let at = |date: chrono::NaiveDate| -> Result<DateTime<Tz>> {
        tz.from_local_datetime(&date.and_time(clock_time))
            .earliest()
            .with_context(|| format!("local time {clock_time} does not exist on {date} (DST gap)"))
    };

    match direction {
        OccurrenceDirection::TodayEvenIfPast => at(today),
        OccurrenceDirection::NextFutureOrSame => {
            let candidate = at(today)?;
            if candidate >= reference {
                Ok(candidate)
            } else {
                at(today + Duration::days(1))
            }
        }
    }
}

// ============= Window Calculator =============

/// Computes the nightly block window and the night-charge activation window
/// for a fixed observer location. Stateless apart from configuration.
#[derive(Resource, Debug, Clone)]
pub struct WindowCalculator {
    latitude: f64,
    longitude: f64,
    tz: Tz,
}

impl WindowCalculator {
    pub fn from_config(location: &LocationConfig) -> Result<Self> {
        Ok(Self {
            latitude: location.latitude,
            longitude: location.longitude,
            tz: location.tz()?,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Local sunrise on the given calendar date
    pub fn sunrise_on(&self, date: chrono::NaiveDate) -> Result<DateTime<Tz>> {
        Ok(solar::sunrise_utc(date, self.latitude, self.longitude)?.with_timezone(&self.tz))
    }

    /// Local sunset on the given calendar date
    pub fn sunset_on(&self, date: chrono::NaiveDate) -> Result<DateTime<Tz>> {
        Ok(solar::sunset_utc(date, self.latitude, self.longitude)?.with_timezone(&self.tz))
    }

    /// The window during which any charging is vetoed unless overridden.
    ///
    /// Start is the sunset that began the current night: yesterday's sunset
    /// while the reference is before today's sunrise, today's sunset after.
    /// End is the scheduled night-charge time when night charging is
    /// enabled, else the next sunrise.
    ///
    /// The occurrence direction for the end boundary is driven by the same
    /// before/after-today's-sunrise test as the start, NOT by whether the
    /// scheduled time itself has passed. Keying on the scheduled time
    /// resolves "tomorrow" for a reference shortly after the scheduled time
    /// and wrongly keeps the window open all night.
    pub fn nightly_block_window(
        &self,
        reference: DateTime<Tz>,
        scheduled_night_time: NaiveTime,
        night_charge_enabled: bool,
    ) -> Result<TimeWindow> {
        let today = reference.date_naive();
        let sunrise_today = self.sunrise_on(today)?;
        let before_sunrise = reference < sunrise_today;

        let start = if before_sunrise {
            self.sunset_on(today - Duration::days(1))?
        } else {
            self.sunset_on(today)?
        };

        let end = if night_charge_enabled {
            let direction = if before_sunrise {
                OccurrenceDirection::TodayEvenIfPast
            } else {
                OccurrenceDirection::NextFutureOrSame
            };
            resolve_occurrence(scheduled_night_time, reference, direction)?
        } else if before_sunrise {
            sunrise_today
        } else {
            self.sunrise_on(today + Duration::days(1))?
        };

        Ok(TimeWindow { start, end })
    }

    /// The window during which a scheduled overnight session may start.
    ///
    /// Start is the scheduled time of the *current* night - the same
    /// resolution as the block-window end, so a late arrival after the
    /// scheduled time still falls inside. End is the sunrise that closes
    /// that night, extended to the car-ready deadline when the morning is a
    /// car-ready day and the deadline lies past sunrise.
    pub fn activation_window(
        &self,
        reference: DateTime<Tz>,
        scheduled_night_time: NaiveTime,
        car_ready: &CarReadyPolicy,
    ) -> Result<TimeWindow> {
        let today = reference.date_naive();
        let sunrise_today = self.sunrise_on(today)?;
        let before_sunrise = reference < sunrise_today;

        let direction = if before_sunrise {
            OccurrenceDirection::TodayEvenIfPast
        } else {
            OccurrenceDirection::NextFutureOrSame
        };
        let mut start = resolve_occurrence(scheduled_night_time, reference, direction)?;

        let night_sunrise = if before_sunrise {
            sunrise_today
        } else {
            self.sunrise_on(today + Duration::days(1))?
        };

        let morning = night_sunrise.date_naive();
        let mut end = night_sunrise;
        if car_ready.applies_on(morning.weekday()) {
            let deadline = self
                .tz
                .from_local_datetime(&morning.and_time(car_ready.deadline))
                .earliest()
                .with_context(|| format!("car-ready deadline does not exist on {morning}"))?;
            if deadline > end {
                end = deadline;
            }
        }

        // A scheduled time in the late evening resolves to "today" even when
        // the night it belongs to began yesterday; step it back so the
        // window still describes the current night.
        if start >= end {
            start = start - Duration::days(1);
        }

        Ok(TimeWindow { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargion_types::config::WeekdayTable;
    use chrono::NaiveDate;

    // Prague mid-January: sunrise ~07:52 local, sunset ~16:24 local
    fn calculator() -> WindowCalculator {
        WindowCalculator::from_config(&LocationConfig {
            latitude: 50.08,
            longitude: 14.43,
            timezone: "Europe/Prague".to_string(),
        })
        .unwrap()
    }

    fn local(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Tz> {
        chrono_tz::Europe::Prague
            .with_ymd_and_hms(y, m, d, hh, mm, 0)
            .unwrap()
    }

    fn night_time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_future_or_same_rolls_to_tomorrow() {
        let reference = local(2025, 1, 15, 2, 20);
        let resolved =
            resolve_occurrence(night_time(1, 0), reference, OccurrenceDirection::NextFutureOrSame)
                .unwrap();
        assert_eq!(resolved, local(2025, 1, 16, 1, 0));
    }

    #[test]
    fn today_even_if_past_stays_on_today() {
        let reference = local(2025, 1, 15, 2, 20);
        let resolved =
            resolve_occurrence(night_time(1, 0), reference, OccurrenceDirection::TodayEvenIfPast)
                .unwrap();
        assert_eq!(resolved, local(2025, 1, 15, 1, 0));
    }

    #[test]
    fn next_future_or_same_keeps_today_when_still_ahead() {
        let reference = local(2025, 1, 15, 0, 30);
        let resolved =
            resolve_occurrence(night_time(1, 0), reference, OccurrenceDirection::NextFutureOrSame)
                .unwrap();
        assert_eq!(resolved, local(2025, 1, 15, 1, 0));
    }

    /// Regression for the documented late-arrival defect: shortly after the
    /// scheduled night time, the block-window end must be *today's*
    /// occurrence (already passed), not tomorrow's - 02:20 lies outside.
    #[test]
    fn block_window_end_is_today_after_scheduled_time() {
        let calc = calculator();
        let reference = local(2025, 1, 15, 2, 20);
        let window = calc
            .nightly_block_window(reference, night_time(1, 0), true)
            .unwrap();

        assert_eq!(window.end, local(2025, 1, 15, 1, 0));
        assert!(!window.contains(reference), "02:20 must not be blocked");
    }

    /// Shortly after midnight the window start must be *yesterday's* sunset.
    #[test]
    fn block_window_start_is_yesterdays_sunset_after_midnight() {
        let calc = calculator();
        let reference = local(2025, 1, 15, 0, 11);
        let window = calc
            .nightly_block_window(reference, night_time(1, 0), true)
            .unwrap();

        assert_eq!(window.start.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 14).unwrap());
        assert!(window.contains(reference), "00:11 must be blocked");
    }

    #[test]
    fn block_window_in_the_evening_spans_to_next_scheduled_time() {
        let calc = calculator();
        let reference = local(2025, 1, 15, 22, 0);
        let window = calc
            .nightly_block_window(reference, night_time(1, 0), true)
            .unwrap();

        // Tonight: starts at today's sunset, ends at tomorrow 01:00
        assert_eq!(window.start.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(window.end, local(2025, 1, 16, 1, 0));
        assert!(window.contains(reference));
    }

    #[test]
    fn block_window_without_night_charge_ends_at_sunrise() {
        let calc = calculator();

        let before_dawn = local(2025, 1, 15, 5, 0);
        let window = calc
            .nightly_block_window(before_dawn, night_time(1, 0), false)
            .unwrap();
        assert_eq!(window.end.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert!(window.contains(before_dawn), "pre-dawn must stay blocked");

        let evening = local(2025, 1, 15, 22, 0);
        let window = calc
            .nightly_block_window(evening, night_time(1, 0), false)
            .unwrap();
        assert_eq!(window.end.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
    }

    /// Exhaustive sweep across the midnight boundary, checked against an
    /// independently computed oracle: a reference is blocked exactly when it
    /// lies in the dark span of the current night that precedes the night's
    /// scheduled charge time.
    #[test]
    fn block_window_containment_across_midnight() {
        let calc = calculator();
        let scheduled = night_time(1, 0);
        let jan14 = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();
        let jan15 = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

        let sunrise_today = calc.sunrise_on(jan15).unwrap();
        let sunset_yesterday = calc.sunset_on(jan14).unwrap();
        let sunset_today = calc.sunset_on(jan15).unwrap();

        for minutes in (0..24 * 60).step_by(10) {
            let reference = local(2025, 1, 15, 0, 0) + Duration::minutes(i64::from(minutes));
            let window = calc.nightly_block_window(reference, scheduled, true).unwrap();

            assert!(window.start < window.end, "invariant start < end at {reference}");

            let expected = if reference < sunrise_today {
                // Night that began yesterday evening, up to today's 01:00
                reference > sunset_yesterday && reference < local(2025, 1, 15, 1, 0)
            } else {
                // Tonight, up to tomorrow's 01:00
                reference > sunset_today && reference < local(2025, 1, 16, 1, 0)
            };
            assert_eq!(
                window.contains(reference),
                expected,
                "containment mismatch at {reference}"
            );
        }
    }

    #[test]
    fn activation_window_covers_late_arrival() {
        let calc = calculator();
        let policy = CarReadyPolicy {
            days: WeekdayTable::uniform(false),
            deadline: night_time(7, 30),
        };

        // 02:20, scheduled 01:00: activation started at 01:00 *today* and
        // runs to sunrise, so a late arrival at 02:20 is inside.
        let reference = local(2025, 1, 15, 2, 20);
        let window = calc
            .activation_window(reference, night_time(1, 0), &policy)
            .unwrap();
        assert_eq!(window.start, local(2025, 1, 15, 1, 0));
        assert!(window.contains(reference));
        // Ends at sunrise (~07:52 local in mid-January)
        assert_eq!(window.end.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert!(window.end.time() > night_time(7, 0));
    }

    #[test]
    fn activation_window_extends_to_car_ready_deadline() {
        let calc = calculator();
        let policy = CarReadyPolicy {
            days: WeekdayTable::uniform(true),
            deadline: night_time(9, 0),
        };

        let reference = local(2025, 1, 15, 2, 20);
        let window = calc
            .activation_window(reference, night_time(1, 0), &policy)
            .unwrap();
        assert_eq!(window.end, local(2025, 1, 15, 9, 0));
    }

    #[test]
    fn activation_window_before_scheduled_time_is_not_open_yet() {
        let calc = calculator();
        let policy = CarReadyPolicy {
            days: WeekdayTable::uniform(false),
            deadline: night_time(7, 30),
        };

        // 00:30 with scheduled 01:00: tonight's activation hasn't begun
        let reference = local(2025, 1, 15, 0, 30);
        let window = calc
            .activation_window(reference, night_time(1, 0), &policy)
            .unwrap();
        assert!(!window.contains(reference));
        assert_eq!(window.start, local(2025, 1, 15, 1, 0));
    }

    #[test]
    fn evening_scheduled_time_still_describes_the_current_night() {
        let calc = calculator();
        let policy = CarReadyPolicy {
            days: WeekdayTable::uniform(false),
            deadline: night_time(7, 30),
        };

        // Scheduled 23:00, reference 00:30: the session of *this* night was
        // scheduled yesterday 23:00, and the window runs to today's sunrise.
        let reference = local(2025, 1, 15, 0, 30);
        let window = calc
            .activation_window(reference, night_time(23, 0), &policy)
            .unwrap();
        assert_eq!(window.start, local(2025, 1, 14, 23, 0));
        assert!(window.contains(reference));
    }
}
