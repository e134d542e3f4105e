//! Wall-clock helpers shared by the temporal rules.
//!
//! Everything here works on naive local time; conversion into a concrete zone
//! happens once, in `localize`.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Weekday,
};

/// Builds a wall-clock time, rolling out-of-range fields into the next unit
/// (month 13 → January next year, day 32 → next month, 25:00 → 01:00 next day).
pub fn wall(year: i64, month: i64, day: i64, hour: i64, minute: i64) -> Option<NaiveDateTime> {
    let m0 = month - 1;
    let y = i32::try_from(year + m0.div_euclid(12)).ok()?;
    let m = u32::try_from(m0.rem_euclid(12) + 1).ok()?;
    let first = NaiveDate::from_ymd_opt(y, m, 1)?.and_hms_opt(0, 0, 0)?;
    first
        .checked_add_signed(Duration::try_days(day - 1)?)?
        .checked_add_signed(Duration::try_hours(hour)?)?
        .checked_add_signed(Duration::try_minutes(minute)?)
}

/// Same calendar day as `reference`, at `hour:minute`.
pub fn on_day(reference: &NaiveDateTime, hour: i64, minute: i64) -> Option<NaiveDateTime> {
    shifted_day(reference, 0, hour, minute)
}

/// `days` after the reference's calendar day, at `hour:minute`.
pub fn shifted_day(
    reference: &NaiveDateTime,
    days: i64,
    hour: i64,
    minute: i64,
) -> Option<NaiveDateTime> {
    wall(
        reference.year() as i64,
        reference.month() as i64,
        reference.day() as i64 + days,
        hour,
        minute,
    )
}

/// Year for a month/day written without one: a month earlier than the
/// reference month means next year.
pub fn year_for(month: i64, reference: &NaiveDateTime) -> i64 {
    let year = reference.year() as i64;
    if month < reference.month() as i64 {
        year + 1
    } else {
        year
    }
}

/// Interprets `naive` in `tz`. Ambiguous local times take the earlier
/// instant; local times inside a forward gap keep the pre-gap offset, which
/// lands after the gap.
pub fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = naive - Duration::hours(3);
            let offset = tz
                .from_local_datetime(&before)
                .earliest()
                .map(|t| t.offset().fix().local_minus_utc())
                .unwrap_or(0);
            tz.from_utc_datetime(&(naive - Duration::seconds(offset as i64)))
        }
    }
}

/// Kanji weekday (`日`..`土`) → `Weekday`.
pub fn parse_weekday(kanji: &str) -> Option<Weekday> {
    match kanji {
        "日" => Some(Weekday::Sun),
        "月" => Some(Weekday::Mon),
        "火" => Some(Weekday::Tue),
        "水" => Some(Weekday::Wed),
        "木" => Some(Weekday::Thu),
        "金" => Some(Weekday::Fri),
        "土" => Some(Weekday::Sat),
        _ => None,
    }
}

/// Days forward from `current` to the next `target` (0 when equal).
pub fn days_until(current: Weekday, target: Weekday) -> i64 {
    (target.num_days_from_sunday() as i64 - current.num_days_from_sunday() as i64).rem_euclid(7)
}

/// "今週のX": the X of the Sunday-based week containing `current`, which may
/// lie in the past.
pub fn days_to_this_week(current: Weekday, target: Weekday) -> i64 {
    let days = days_until(current, target);
    if days > 0 && target.num_days_from_sunday() < current.num_days_from_sunday() {
        days - 7
    } else {
        days
    }
}

/// "今度のX": strictly upcoming X, a full week ahead when X is today.
pub fn days_to_coming(current: Weekday, target: Weekday) -> i64 {
    match days_until(current, target) {
        0 => 7,
        d => d,
    }
}

/// "来週X": the forward occurrence plus one week.
pub fn days_to_next_week(current: Weekday, target: Weekday) -> i64 {
    days_until(current, target) + 7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn wall_rolls_overflowing_fields() {
        assert_eq!(wall(2025, 13, 1, 0, 0), Some(dt(2026, 1, 1, 0, 0)));
        assert_eq!(wall(2025, 2, 30, 0, 0), Some(dt(2025, 3, 2, 0, 0)));
        assert_eq!(wall(2025, 10, 3, 25, 0), Some(dt(2025, 10, 4, 1, 0)));
        assert_eq!(wall(2025, 10, 3, 23, 75), Some(dt(2025, 10, 4, 0, 15)));
        assert_eq!(wall(2025, 0, 10, 0, 0), Some(dt(2024, 12, 10, 0, 0)));
    }

    #[test]
    fn year_rolls_forward_only_for_earlier_months() {
        let r = dt(2025, 10, 3, 12, 0);
        assert_eq!(year_for(1, &r), 2026);
        assert_eq!(year_for(10, &r), 2025);
        assert_eq!(year_for(12, &r), 2025);
    }

    #[test]
    fn weekday_offsets_from_friday() {
        let fri = Weekday::Fri;
        assert_eq!(days_to_this_week(fri, Weekday::Sat), 1);
        assert_eq!(days_to_this_week(fri, Weekday::Mon), -4);
        assert_eq!(days_to_this_week(fri, Weekday::Sun), -5);
        assert_eq!(days_to_this_week(fri, Weekday::Fri), 0);
        assert_eq!(days_to_coming(fri, Weekday::Fri), 7);
        assert_eq!(days_to_coming(fri, Weekday::Sat), 1);
        assert_eq!(days_to_next_week(fri, Weekday::Mon), 10);
        assert_eq!(days_to_next_week(fri, Weekday::Sat), 8);
    }

    #[test]
    fn localize_handles_gaps_and_folds() {
        let ny = chrono_tz::America::New_York;
        // 2025-03-09 02:30 does not exist in New York.
        let gap = localize(&ny, dt(2025, 3, 9, 2, 30));
        assert_eq!(gap.to_rfc3339(), "2025-03-09T03:30:00-04:00");
        // 2025-11-02 01:30 happens twice; the earlier (EDT) wins.
        let fold = localize(&ny, dt(2025, 11, 2, 1, 30));
        assert_eq!(fold.to_rfc3339(), "2025-11-02T01:30:00-04:00");
    }

    #[test]
    fn kanji_weekdays_parse() {
        assert_eq!(parse_weekday("日"), Some(Weekday::Sun));
        assert_eq!(parse_weekday("土"), Some(Weekday::Sat));
        assert_eq!(parse_weekday("x"), None);
    }
}
