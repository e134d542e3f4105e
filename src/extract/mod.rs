//! # Temporal expression extraction
//! Infers an event window from free-form Japanese post text, relative to the
//! post's own timestamp.
//!
//! The rule table lives in [`rules`]; it is ordered from most to least
//! specific and the first rule that matches anywhere in the text wins. Text
//! that matches nothing still yields a window (reference day, 00:00 to 01:00)
//! with `matched == false` so callers can decide to skip it.

pub mod calendar;
mod rules;

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::models::CandidateWindow;
use rules::{End, Resolution, Start, RULES};

/// Result of scanning one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<Tz: TimeZone> {
    pub window: CandidateWindow<Tz>,
    pub matched: bool,
    /// Name of the rule that produced the window, `None` for the fallback.
    pub rule: Option<&'static str>,
}

impl<Tz: TimeZone> Extraction<Tz> {
    pub fn start(&self) -> &DateTime<Tz> {
        &self.window.start
    }

    pub fn end(&self) -> Option<&DateTime<Tz>> {
        self.window.end.as_ref()
    }
}

/// Extracts a candidate window from `content`. Never fails; all returned
/// instants are in `reference`'s zone.
pub fn extract<Tz: TimeZone>(content: &str, reference: &DateTime<Tz>) -> Extraction<Tz> {
    let local = reference.naive_local();

    for rule in RULES.iter() {
        let Some(caps) = rule.re.captures(content) else {
            continue;
        };
        match (rule.resolve)(&caps, &local) {
            Some(resolution) => {
                debug!(target: "extract", rule = rule.name, "temporal rule matched");
                return Extraction {
                    window: place(resolution, reference),
                    matched: true,
                    rule: Some(rule.name),
                };
            }
            // Field values past chrono's calendar range; try the next rule.
            None => debug!(target: "extract", rule = rule.name, "matched values out of range"),
        }
    }

    let window = match rules::fallback(&local) {
        Some(resolution) => place(resolution, reference),
        None => CandidateWindow {
            start: reference.clone(),
            end: Some(reference.clone() + chrono::Duration::hours(1)),
        },
    };
    Extraction {
        window,
        matched: false,
        rule: None,
    }
}

fn place<Tz: TimeZone>(resolution: Resolution, reference: &DateTime<Tz>) -> CandidateWindow<Tz> {
    let tz = reference.timezone();
    let start = match resolution.start {
        Start::Reference => reference.clone(),
        Start::At(naive) => calendar::localize(&tz, naive),
    };
    let end = match resolution.end {
        End::At(naive) => calendar::localize(&tz, naive),
        End::After(length) => start.clone() + length,
    };
    CandidateWindow {
        start,
        end: Some(end),
    }
}
