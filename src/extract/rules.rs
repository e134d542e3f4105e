//! Ordered temporal rule table. Earlier rules are more specific; the first
//! rule that matches anywhere in the text decides the window.

use chrono::{Datelike, Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::calendar::{
    days_to_coming, days_to_next_week, days_to_this_week, on_day, parse_weekday, shifted_day,
    wall, year_for,
};

/// Where a window starts, before it is placed in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Start {
    /// The post's own timestamp.
    Reference,
    At(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum End {
    At(NaiveDateTime),
    /// Elapsed time after the start instant.
    After(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub start: Start,
    pub end: End,
}

impl Resolution {
    fn at(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Start::At(start),
            end: End::At(end),
        }
    }

    fn lasting(start: NaiveDateTime, length: Duration) -> Self {
        Self {
            start: Start::At(start),
            end: End::After(length),
        }
    }

    fn from_reference(end: End) -> Self {
        Self {
            start: Start::Reference,
            end,
        }
    }
}

type Resolver = fn(&Captures<'_>, &NaiveDateTime) -> Option<Resolution>;

pub(crate) struct Rule {
    pub name: &'static str,
    pub re: Regex,
    pub resolve: Resolver,
}

fn rule(name: &'static str, pattern: &str, resolve: Resolver) -> Rule {
    Rule {
        name,
        re: Regex::new(pattern).expect("temporal rule regex"),
        resolve,
    }
}

// Shared fragments. Digits are ASCII only; `\s` already covers U+3000.
const HM: &str = r"([0-9]{1,2}):([0-9]{2})";
const WD: &str = r"([月火水木金土日])";

fn hm_range() -> String {
    format!(r"{HM}\s*[-〜～]\s*{HM}")
}

pub(crate) static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let range = hm_range();
    let year = r"([0-9]{4})年([0-9]{1,2})月([0-9]{1,2})日";
    let slash = r"([0-9]{1,2})/([0-9]{1,2})";
    let slash_wd = r"([0-9]{1,2})/([0-9]{1,2})（[月火水木金土日]）";
    let kanji = r"([0-9]{1,2})月([0-9]{1,2})日";
    let kanji_wd = r"([0-9]{1,2})月([0-9]{1,2})日（[月火水木金土日]）";
    let jp_hm = r"([0-9]{1,2})時([0-9]{1,2})分";
    let jp_h = r"([0-9]{1,2})時";

    vec![
        rule("year_date_time_range", &format!(r"{year}\s*{range}"), year_date_time_range),
        rule("year_date_time", &format!(r"{year}\s*{HM}"), year_date_time),
        rule("year_date", year, year_date),
        rule("slash_weekday_until", &format!(r"{slash_wd}\s*{HM}\s*まで"), date_time_until),
        rule("slash_weekday_time_range", &format!(r"{slash_wd}\s*{range}"), date_time_range),
        rule("slash_weekday_time", &format!(r"{slash_wd}\s*{HM}"), date_time),
        rule("slash_weekday_date", slash_wd, date_only),
        rule("slash_until", &format!(r"{slash}\s+{HM}\s*まで"), date_time_until),
        rule("slash_time_range", &format!(r"{slash}\s+{range}"), date_time_range),
        rule("slash_time", &format!(r"{slash}\s+{HM}"), date_time),
        rule("slash_date", slash, date_only),
        rule("kanji_weekday_until", &format!(r"{kanji_wd}\s*{HM}\s*まで"), date_time_until),
        rule("kanji_weekday_time_range", &format!(r"{kanji_wd}\s*{range}"), date_time_range),
        rule("kanji_weekday_time", &format!(r"{kanji_wd}\s*{HM}"), date_time),
        rule("kanji_weekday_date", kanji_wd, date_only),
        rule("kanji_time_range", &format!(r"{kanji}\s*{range}"), date_time_range),
        rule("kanji_time", &format!(r"{kanji}\s*{HM}"), date_time),
        rule("time_range", &range, time_range),
        rule("jp_hm_range", &format!(r"{jp_hm}\s*[〜～]\s*{jp_hm}"), time_range),
        rule("jp_hm_from_to", &format!(r"{jp_hm}から\s*{jp_hm}"), time_range),
        rule("jp_hm_from", &format!(r"{jp_hm}から[！!]?"), time_only),
        rule("jp_hm_onward", &format!(r"{jp_hm}[〜～][！!]?"), time_only),
        rule("jp_hm", jp_hm, time_only),
        rule("jp_hour_range", &format!(r"{jp_h}\s*[〜～]\s*{jp_h}"), hour_range),
        rule("jp_hour_from_to", &format!(r"{jp_h}から\s*{jp_h}"), hour_range),
        rule("jp_hour_from", &format!(r"{jp_h}から[！!]?"), hour_only),
        rule("jp_hour_onward", &format!(r"{jp_h}[〜～][！!]?"), hour_only),
        rule("tomorrow_time", &format!(r"明日\s*{HM}"), |c, r| relative_day(c, r, 1)),
        rule("today_time", &format!(r"今日\s*{HM}"), |c, r| relative_day(c, r, 0)),
        rule("day_after_tomorrow_time", &format!(r"明後日\s*{HM}"), |c, r| {
            relative_day(c, r, 2)
        }),
        rule("am_time", &format!(r"AM\s*{HM}"), am_time),
        rule("pm_time", &format!(r"PM\s*{HM}"), pm_time),
        rule("alt_date_time", &format!(r"([0-9]{{1,2}})[-.]([0-9]{{1,2}})\s+{HM}"), date_time),
        rule("this_week_weekday_time", &format!(r"今週の?{WD}曜日\s*{HM}"), |c, r| {
            weekday_time(c, r, days_to_this_week)
        }),
        rule("coming_weekday_time", &format!(r"今度の{WD}曜日\s*{HM}"), |c, r| {
            weekday_time(c, r, days_to_coming)
        }),
        rule("next_week_weekday_time", &format!(r"来週の?{WD}曜日\s*{HM}"), |c, r| {
            weekday_time(c, r, days_to_next_week)
        }),
        rule("this_week_weekday", &format!(r"今週の?{WD}曜日"), |c, r| {
            weekday_only(c, r, days_to_this_week)
        }),
        rule("coming_weekday", &format!(r"今度の{WD}曜日"), |c, r| {
            weekday_only(c, r, days_to_coming)
        }),
        rule("next_week_weekday", &format!(r"来週の?{WD}曜日"), |c, r| {
            weekday_only(c, r, days_to_next_week)
        }),
        rule("time_only", HM, time_only),
        rule("kanji_date", kanji, date_only),
        rule("gozen_hour", r"午前([0-9]{1,2})時", |c, r| {
            let h = num(c, 1);
            hour_at(r, if h == 12 { 0 } else { h })
        }),
        rule("gogo_hour", r"午後([0-9]{1,2})時", |c, r| {
            let h = num(c, 1);
            hour_at(r, if h == 12 { h } else { h + 12 })
        }),
        rule("night_hour", r"夜([0-9]{1,2})時", |c, r| {
            let h = num(c, 1);
            hour_at(r, if h < 12 { h + 12 } else { h })
        }),
        rule("morning_hour", r"朝([0-9]{1,2})時", |c, r| hour_at(r, num(c, 1))),
        rule("noon_hour", r"昼([0-9]{1,2})時", |c, r| hour_at(r, num(c, 1))),
        rule("full_slash_date_time", &format!(r"([0-9]{{4}})/([0-9]{{1,2}})/([0-9]{{1,2}})\s*{HM}"), year_date_time),
        rule("evening", r"夕方", |_, r| daypart(r, 18, 2)),
        rule("around_noon", r"お昼頃|昼頃", |_, r| daypart(r, 12, 1)),
        rule("late_night", r"夜中|深夜", |_, r| daypart(r, 0, 2)),
        rule("early_morning", r"早朝", |_, r| daypart(r, 6, 2)),
        rule("hours_duration", r"([0-9]{1,2})時間", |c, _| {
            Some(Resolution::from_reference(End::After(Duration::try_hours(num(c, 1))?)))
        }),
        rule("minutes_duration", r"([0-9]{1,2})分間", |c, _| {
            Some(Resolution::from_reference(End::After(Duration::try_minutes(num(c, 1))?)))
        }),
    ]
});

/// Reference date at midnight, lasting one hour.
pub(crate) fn fallback(reference: &NaiveDateTime) -> Option<Resolution> {
    Some(Resolution::lasting(on_day(reference, 0, 0)?, Duration::hours(1)))
}

/// Numeric capture group; regex groups here are at most four ASCII digits.
fn num(caps: &Captures<'_>, i: usize) -> i64 {
    caps.get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn one_hour() -> Duration {
    Duration::hours(1)
}

fn year_date_time_range(c: &Captures<'_>, _: &NaiveDateTime) -> Option<Resolution> {
    let (y, m, d) = (num(c, 1), num(c, 2), num(c, 3));
    Some(Resolution::at(
        wall(y, m, d, num(c, 4), num(c, 5))?,
        wall(y, m, d, num(c, 6), num(c, 7))?,
    ))
}

fn year_date_time(c: &Captures<'_>, _: &NaiveDateTime) -> Option<Resolution> {
    let start = wall(num(c, 1), num(c, 2), num(c, 3), num(c, 4), num(c, 5))?;
    Some(Resolution::lasting(start, one_hour()))
}

fn year_date(c: &Captures<'_>, _: &NaiveDateTime) -> Option<Resolution> {
    let start = wall(num(c, 1), num(c, 2), num(c, 3), 0, 0)?;
    Some(Resolution::lasting(start, one_hour()))
}

fn date_time_until(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let (m, d) = (num(c, 1), num(c, 2));
    let end = wall(year_for(m, r), m, d, num(c, 3), num(c, 4))?;
    Some(Resolution::from_reference(End::At(end)))
}

fn date_time_range(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let (m, d) = (num(c, 1), num(c, 2));
    let y = year_for(m, r);
    Some(Resolution::at(
        wall(y, m, d, num(c, 3), num(c, 4))?,
        wall(y, m, d, num(c, 5), num(c, 6))?,
    ))
}

fn date_time(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let (m, d) = (num(c, 1), num(c, 2));
    let start = wall(year_for(m, r), m, d, num(c, 3), num(c, 4))?;
    Some(Resolution::lasting(start, one_hour()))
}

fn date_only(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let (m, d) = (num(c, 1), num(c, 2));
    let start = wall(year_for(m, r), m, d, 0, 0)?;
    Some(Resolution::lasting(start, one_hour()))
}

fn time_range(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    Some(Resolution::at(
        on_day(r, num(c, 1), num(c, 2))?,
        on_day(r, num(c, 3), num(c, 4))?,
    ))
}

fn time_only(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    Some(Resolution::lasting(on_day(r, num(c, 1), num(c, 2))?, one_hour()))
}

fn hour_range(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    Some(Resolution::at(on_day(r, num(c, 1), 0)?, on_day(r, num(c, 2), 0)?))
}

fn hour_only(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    hour_at(r, num(c, 1))
}

fn hour_at(r: &NaiveDateTime, hour: i64) -> Option<Resolution> {
    Some(Resolution::lasting(on_day(r, hour, 0)?, one_hour()))
}

fn relative_day(c: &Captures<'_>, r: &NaiveDateTime, days: i64) -> Option<Resolution> {
    let start = shifted_day(r, days, num(c, 1), num(c, 2))?;
    Some(Resolution::lasting(start, one_hour()))
}

fn am_time(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let h = num(c, 1);
    let h = if h == 12 { 0 } else { h };
    Some(Resolution::lasting(on_day(r, h, num(c, 2))?, one_hour()))
}

fn pm_time(c: &Captures<'_>, r: &NaiveDateTime) -> Option<Resolution> {
    let h = num(c, 1);
    let h = if h == 12 { h } else { h + 12 };
    Some(Resolution::lasting(on_day(r, h, num(c, 2))?, one_hour()))
}

fn weekday_time(
    c: &Captures<'_>,
    r: &NaiveDateTime,
    offset: fn(chrono::Weekday, chrono::Weekday) -> i64,
) -> Option<Resolution> {
    let target = parse_weekday(c.get(1)?.as_str())?;
    let days = offset(r.weekday(), target);
    let start = shifted_day(r, days, num(c, 2), num(c, 3))?;
    Some(Resolution::lasting(start, one_hour()))
}

fn weekday_only(
    c: &Captures<'_>,
    r: &NaiveDateTime,
    offset: fn(chrono::Weekday, chrono::Weekday) -> i64,
) -> Option<Resolution> {
    let target = parse_weekday(c.get(1)?.as_str())?;
    let days = offset(r.weekday(), target);
    Some(Resolution::lasting(shifted_day(r, days, 0, 0)?, one_hour()))
}

fn daypart(r: &NaiveDateTime, hour: i64, hours: i64) -> Option<Resolution> {
    Some(Resolution::lasting(on_day(r, hour, 0)?, Duration::try_hours(hours)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(name: &str) -> usize {
        RULES
            .iter()
            .position(|r| r.name == name)
            .unwrap_or_else(|| panic!("missing rule {name}"))
    }

    #[test]
    fn all_patterns_compile_and_names_are_unique() {
        let mut names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 53);
    }

    #[test]
    fn specific_rules_precede_generic_ones() {
        assert!(position("year_date_time_range") < position("slash_date"));
        assert!(position("slash_weekday_until") < position("slash_weekday_time"));
        assert!(position("time_range") < position("time_only"));
        assert!(position("tomorrow_time") < position("time_only"));
        assert!(position("next_week_weekday_time") < position("next_week_weekday"));
        assert!(position("kanji_time") < position("kanji_date"));
        assert!(position("time_only") < position("hours_duration"));
    }

    #[test]
    fn patterns_reject_full_width_digits() {
        let rule = &RULES[position("time_only")];
        assert!(rule.re.is_match("18:00"));
        assert!(!rule.re.is_match("１８:００"));
    }
}
