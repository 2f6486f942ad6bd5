//! Quiet-period interval evaluation.
//!
//! Two interval flavours are supported, both written as a comma-separated
//! list of `start-end` pairs (`–` is accepted as the separator too):
//!
//! - **absolute**: `YYYY[-MM[-DD[ HH[:MM[:SS]]]]]`, e.g.
//!   `2026-12-24-2026-12-26, 2027-01-01 08:00-2027-01-01 12:00`
//! - **daily**: `HH[:MM[:SS]]`, e.g. `22:00-23:00`
//!
//! Each bound may stop at any precision. A bound is compared against the
//! instant truncated to that bound's precision, so `22:00-23:00` contains
//! 23:00:59 but not 23:01, and `2026-12-24-2026-12-26` covers all three days.
//!
//! Daily ranges are evaluated as `start <= now <= end` on the same day; a range
//! that crosses midnight (`22:00-02:00`) never matches.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{ParseError, ParseResult};

/// Which of the two interval flavours a spec uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    /// Calendar timestamps.
    Absolute,
    /// Time of day, date ignored.
    Daily,
}

impl IntervalKind {
    fn from_daily(daily: bool) -> Self {
        if daily { Self::Daily } else { Self::Absolute }
    }

    /// Components of `instant` at full precision for this kind.
    fn components(&self, instant: NaiveDateTime) -> Vec<i64> {
        let time = [
            i64::from(instant.hour()),
            i64::from(instant.minute()),
            i64::from(instant.second()),
        ];
        match self {
            Self::Daily => time.to_vec(),
            Self::Absolute => {
                let mut parts = vec![
                    i64::from(instant.year()),
                    i64::from(instant.month()),
                    i64::from(instant.day()),
                ];
                parts.extend_from_slice(&time);
                parts
            }
        }
    }
}

/// One endpoint of a range, truncated to the precision it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    parts: Vec<i64>,
}

impl Bound {
    fn parse(text: &str, kind: IntervalKind) -> ParseResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::interval(text, "empty bound"));
        }
        let parts = match kind {
            IntervalKind::Daily => parse_time(text, text)?,
            IntervalKind::Absolute => parse_timestamp(text)?,
        };
        Ok(Self { parts })
    }
}

fn parse_number(field: &str, spec: &str, min: i64, max: i64, what: &str) -> ParseResult<i64> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::interval(spec, format!("invalid {}", what)));
    }
    let value: i64 = field
        .parse()
        .map_err(|_| ParseError::interval(spec, format!("invalid {}", what)))?;
    if value < min || value > max {
        return Err(ParseError::interval(
            spec,
            format!("{} {} out of range {}..={}", what, value, min, max),
        ));
    }
    Ok(value)
}

fn parse_time(text: &str, spec: &str) -> ParseResult<Vec<i64>> {
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() > 3 {
        return Err(ParseError::interval(spec, "too many time components"));
    }
    let limits = [(23, "hour"), (59, "minute"), (59, "second")];
    fields
        .iter()
        .zip(limits)
        .map(|(field, (max, what))| parse_number(field, spec, 0, max, what))
        .collect()
}

fn parse_timestamp(text: &str) -> ParseResult<Vec<i64>> {
    let (date, time) = match text.split_once([' ', 'T']) {
        Some((date, time)) => (date, Some(time.trim())),
        None => (text, None),
    };

    let fields: Vec<&str> = date.split('-').collect();
    if fields.len() > 3 {
        return Err(ParseError::interval(text, "too many date components"));
    }
    if fields[0].len() != 4 {
        return Err(ParseError::interval(text, "year must have four digits"));
    }
    let limits = [(0, 9999, "year"), (1, 12, "month"), (1, 31, "day")];
    let mut parts = fields
        .iter()
        .zip(limits)
        .map(|(field, (min, max, what))| parse_number(field, text, min, max, what))
        .collect::<ParseResult<Vec<i64>>>()?;

    if let [year, month, day] = parts[..]
        && NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).is_none()
    {
        return Err(ParseError::interval(text, "no such calendar date"));
    }

    if let Some(time) = time {
        if parts.len() != 3 {
            return Err(ParseError::interval(
                text,
                "a time of day requires a full date",
            ));
        }
        parts.extend(parse_time(time, text)?);
    }
    Ok(parts)
}

/// A single inclusive `start-end` range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    start: Bound,
    end: Bound,
}

impl Range {
    /// Split `text` at the first dash where both sides parse as bounds.
    ///
    /// Dates contain dashes themselves, so the separator cannot be found
    /// syntactically; trying each candidate resolves `2026-12-24-2026-12-26`.
    fn parse(text: &str, kind: IntervalKind) -> ParseResult<Self> {
        let text = text.trim();
        for (pos, sep) in text.char_indices().filter(|(_, c)| matches!(c, '-' | '–')) {
            let (left, right) = (&text[..pos], &text[pos + sep.len_utf8()..]);
            if let (Ok(start), Ok(end)) = (Bound::parse(left, kind), Bound::parse(right, kind)) {
                return Ok(Self { start, end });
            }
        }
        Err(ParseError::interval(text, "expected 'start-end'"))
    }

    fn contains(&self, instant: &[i64]) -> bool {
        let start_len = self.start.parts.len();
        let end_len = self.end.parts.len();
        self.start.parts.as_slice() <= &instant[..start_len]
            && &instant[..end_len] <= self.end.parts.as_slice()
    }
}

/// A parsed list of ranges of one [`IntervalKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSpec {
    kind: IntervalKind,
    ranges: Vec<Range>,
}

impl IntervalSpec {
    /// Parse a comma-separated list of ranges.
    ///
    /// Empty list items (e.g. a trailing comma) are skipped, but the list as
    /// a whole must contain at least one range.
    pub fn parse(spec: &str, daily: bool) -> ParseResult<Self> {
        let kind = IntervalKind::from_daily(daily);
        let ranges = spec
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Range::parse(item, kind))
            .collect::<ParseResult<Vec<_>>>()?;
        if ranges.is_empty() {
            return Err(ParseError::interval(spec, "no ranges given"));
        }
        Ok(Self { kind, ranges })
    }

    #[must_use]
    pub fn kind(&self) -> IntervalKind {
        self.kind
    }

    /// Number of ranges in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True if any range contains `instant`.
    #[must_use]
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        let parts = self.kind.components(instant);
        self.ranges.iter().any(|range| range.contains(&parts))
    }
}

/// Evaluate whether `instant` falls into any range of `spec`.
///
/// A malformed spec never matches.
///
/// ```
/// use chrono::NaiveDate;
/// use huemon_types::in_interval;
///
/// let at = |h, m| NaiveDate::from_ymd_opt(2026, 10, 18).unwrap().and_hms_opt(h, m, 0).unwrap();
/// assert!(in_interval(at(22, 30), "22:00-23:00", true));
/// assert!(!in_interval(at(23, 1), "22:00-23:00", true));
/// assert!(!in_interval(at(22, 30), "not an interval", true));
/// ```
#[must_use]
pub fn in_interval(instant: NaiveDateTime, spec: &str, daily: bool) -> bool {
    IntervalSpec::parse(spec, daily)
        .map(|parsed| parsed.contains(instant))
        .unwrap_or(false)
}
