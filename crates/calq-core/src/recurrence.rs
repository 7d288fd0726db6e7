//! Recurrence normalization and evaluation.
//!
//! Supported subset: `FREQ=DAILY|WEEKLY|MONTHLY|YEARLY` with `BYDAY`,
//! `BYMONTHDAY`, `BYMONTH` and `UNTIL`. Rule text is parsed with the `rrule`
//! crate; occurrences are decided here, not by `rrule` iteration. Raw input of any shape is resolved
//! exactly once into a [`NormalizedRecurrenceRule`]; evaluation never looks at
//! the raw input again.
//!
//! Normalization is fail-soft. A rule that cannot be understood comes back with
//! `is_valid() == false` and never occurs.

use crate::date::{normalize_date_only_string, CalendarDate, WeekdayCode};
use rrule::{Frequency as RRuleFrequency, NWeekday, RRule, Unvalidated};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Upper bound, in days, on the clamped span a single expansion will walk.
pub const MAX_EXPANSION_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(s.to_string()),
        }
    }
}

/// BYDAY given either as `"MO,WE"` or as `["MO", "WE"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WeekdayList {
    One(String),
    Many(Vec<String>),
}

impl WeekdayList {
    fn tokens(&self) -> Vec<&str> {
        match self {
            WeekdayList::One(s) => s.split(',').collect(),
            WeekdayList::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Object-shaped recurrence as stored by structured editors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredRecurrence {
    #[serde(alias = "freq", alias = "FREQ")]
    pub frequency: Option<String>,
    #[serde(alias = "byday", alias = "BYDAY")]
    pub by_day: Option<WeekdayList>,
    #[serde(alias = "bymonthday", alias = "BYMONTHDAY")]
    pub by_month_day: Option<i64>,
    #[serde(alias = "bymonth", alias = "BYMONTH")]
    pub by_month: Option<i64>,
    #[serde(alias = "UNTIL")]
    pub until: Option<String>,
}

/// Untrusted recurrence input exactly as it arrives from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawRecurrenceInput {
    #[default]
    Absent,
    Rule(String),
    /// The first rule that normalizes to a known frequency wins.
    Rules(Vec<String>),
    Structured(StructuredRecurrence),
}

impl RawRecurrenceInput {
    /// Decodes the `recurrence` text column.
    ///
    /// JSON arrays and objects are recognised; undecodable JSON is kept as a
    /// plain rule string, which then normalizes invalid.
    pub fn from_column(column: Option<&str>) -> Self {
        let raw = match column.map(str::trim) {
            None | Some("") | Some("null") => return RawRecurrenceInput::Absent,
            Some(raw) => raw,
        };

        if raw.starts_with('[') {
            if let Ok(rules) = serde_json::from_str::<Vec<String>>(raw) {
                return RawRecurrenceInput::Rules(rules);
            }
        } else if raw.starts_with('{') {
            if let Ok(structured) = serde_json::from_str::<StructuredRecurrence>(raw) {
                return RawRecurrenceInput::Structured(structured);
            }
        }

        RawRecurrenceInput::Rule(raw.to_string())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RawRecurrenceInput::Absent)
    }
}

/// Canonical, immutable form of a recurrence rule.
///
/// `is_valid()` holds iff the frequency is one of the four supported values and
/// the start date parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecurrenceRule {
    is_valid: bool,
    frequency: Option<Frequency>,
    by_day: BTreeSet<WeekdayCode>,
    by_month_day: Option<u32>,
    by_month: Option<u32>,
    start_date: Option<CalendarDate>,
    effective_end_date: Option<CalendarDate>,
    errors: Vec<String>,
}

impl NormalizedRecurrenceRule {
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    pub fn by_day(&self) -> &BTreeSet<WeekdayCode> {
        &self.by_day
    }

    pub fn by_month_day(&self) -> Option<u32> {
        self.by_month_day
    }

    pub fn by_month(&self) -> Option<u32> {
        self.by_month
    }

    pub fn start_date(&self) -> Option<CalendarDate> {
        self.start_date
    }

    pub fn effective_end_date(&self) -> Option<CalendarDate> {
        self.effective_end_date
    }

    /// Parse notes, including parts that were ignored on a valid rule.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn occurs_on(&self, target: CalendarDate) -> bool {
        occurs_on_date_normalized(self, target)
    }

    pub fn expand(&self, range_start: CalendarDate, range_end: CalendarDate) -> Vec<CalendarDate> {
        expand_occurrences_in_range(self, range_start, range_end)
    }
}

#[derive(Debug, Default)]
struct RuleParts {
    frequency: Option<Frequency>,
    by_day: BTreeSet<WeekdayCode>,
    by_month_day: Option<u32>,
    by_month: Option<u32>,
    until: Option<CalendarDate>,
    errors: Vec<String>,
}

/// Normalizes raw recurrence input against the todo's own scheduling fields.
///
/// The effective end is the earlier of the rule's UNTIL and
/// `recurrence_end_date` when both are present, otherwise whichever exists.
pub fn normalize_recurrence(
    raw: &RawRecurrenceInput,
    recurrence_end_date: Option<&str>,
    start_date: Option<&str>,
) -> NormalizedRecurrenceRule {
    let mut parts = match raw {
        RawRecurrenceInput::Absent => RuleParts {
            errors: vec!["no recurrence given".to_string()],
            ..Default::default()
        },
        RawRecurrenceInput::Rule(rule) => parse_rule_string(rule),
        RawRecurrenceInput::Rules(rules) => parse_rule_list(rules),
        RawRecurrenceInput::Structured(structured) => parse_structured(structured),
    };

    let start = start_date.and_then(normalize_date_only_string);
    if start.is_none() {
        parts
            .errors
            .push(format!("missing or invalid start date: {:?}", start_date));
    }

    let external_end = match recurrence_end_date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw_end) => {
            let parsed = normalize_date_only_string(raw_end);
            if parsed.is_none() {
                parts
                    .errors
                    .push(format!("ignored invalid recurrence end date '{}'", raw_end));
            }
            parsed
        }
        None => None,
    };

    let effective_end_date = match (parts.until, external_end) {
        (Some(until), Some(external)) => Some(until.min(external)),
        (until, external) => until.or(external),
    };

    NormalizedRecurrenceRule {
        is_valid: parts.frequency.is_some() && start.is_some(),
        frequency: parts.frequency,
        by_day: parts.by_day,
        by_month_day: parts.by_month_day,
        by_month: parts.by_month,
        start_date: start,
        effective_end_date,
        errors: parts.errors,
    }
}

fn parse_rule_list(rules: &[String]) -> RuleParts {
    let mut notes = Vec::new();
    for (idx, rule) in rules.iter().enumerate() {
        let parts = parse_rule_string(rule);
        if parts.frequency.is_some() {
            return parts;
        }
        notes.extend(parts.errors.into_iter().map(|e| format!("rule {}: {}", idx, e)));
    }
    notes.push(format!("no usable rule among {} candidates", rules.len()));
    RuleParts {
        errors: notes,
        ..Default::default()
    }
}

fn parse_rule_string(rule: &str) -> RuleParts {
    let mut parts = RuleParts::default();

    let line = rule
        .lines()
        .map(str::trim)
        .find(|line| line.to_uppercase().contains("FREQ="));
    let Some(line) = line else {
        parts.errors.push(format!("no FREQ in rule '{}'", rule.trim()));
        return parts;
    };

    let body = match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("RRULE:") => &line[6..],
        _ => line,
    };
    let parsed = match RRule::<Unvalidated>::from_str(body.trim().trim_end_matches(';')) {
        Ok(parsed) => parsed,
        Err(err) => {
            parts.errors.push(format!("rule '{}' rejected: {}", body, err));
            return parts;
        }
    };

    match parsed.get_freq() {
        RRuleFrequency::Daily => parts.frequency = Some(Frequency::Daily),
        RRuleFrequency::Weekly => parts.frequency = Some(Frequency::Weekly),
        RRuleFrequency::Monthly => parts.frequency = Some(Frequency::Monthly),
        RRuleFrequency::Yearly => parts.frequency = Some(Frequency::Yearly),
        other => parts.errors.push(format!("unsupported frequency {:?}", other)),
    }

    if parsed.get_interval() != 1 {
        parts
            .errors
            .push(format!("ignored unsupported INTERVAL={}", parsed.get_interval()));
    }
    if let Some(count) = parsed.get_count() {
        parts.errors.push(format!("ignored unsupported COUNT={}", count));
    }

    for weekday in parsed.get_by_weekday() {
        match weekday {
            NWeekday::Every(day) => {
                parts
                    .by_day
                    .insert(WeekdayCode::from_sunday_index(day.num_days_from_sunday()));
            }
            NWeekday::Nth(n, day) => parts
                .errors
                .push(format!("ignored ordinal BYDAY {}{:?}", n, day)),
        }
    }

    parts.by_month_day = first_in_range(
        &mut parts.errors,
        "BYMONTHDAY",
        parsed.get_by_month_day().iter().map(|&day| i64::from(day)),
        1,
        31,
    );
    parts.by_month = first_in_range(
        &mut parts.errors,
        "BYMONTH",
        parsed.get_by_month().iter().map(|&month| i64::from(month)),
        1,
        12,
    );
    parts.until = parsed.get_until().map(|until| CalendarDate::from(until.date_naive()));
    parts
}

fn parse_structured(structured: &StructuredRecurrence) -> RuleParts {
    let mut parts = RuleParts::default();

    match structured.frequency.as_deref().map(str::parse::<Frequency>) {
        Some(Ok(freq)) => parts.frequency = Some(freq),
        Some(Err(other)) => parts.errors.push(format!("unsupported frequency '{}'", other)),
        None => parts.errors.push("structured rule has no frequency".to_string()),
    }

    if let Some(list) = &structured.by_day {
        apply_by_day(&mut parts, list.tokens().into_iter());
    }
    if let Some(day) = structured.by_month_day {
        parts.by_month_day = checked_number(&mut parts.errors, "byMonthDay", day, 1, 31);
    }
    if let Some(month) = structured.by_month {
        parts.by_month = checked_number(&mut parts.errors, "byMonth", month, 1, 12);
    }
    if let Some(until) = structured.until.as_deref() {
        match normalize_date_only_string(until) {
            Some(date) => parts.until = Some(date),
            None => parts.errors.push(format!("ignored invalid until '{}'", until)),
        }
    }
    parts
}

fn apply_by_day<'a>(parts: &mut RuleParts, tokens: impl Iterator<Item = &'a str>) {
    for token in tokens.map(str::trim).filter(|t| !t.is_empty()) {
        match token.parse::<WeekdayCode>() {
            Ok(code) => {
                parts.by_day.insert(code);
            }
            Err(_) if has_ordinal_prefix(token) => parts
                .errors
                .push(format!("ignored ordinal BYDAY '{}'", token)),
            Err(_) => parts.errors.push(format!("ignored invalid BYDAY '{}'", token)),
        }
    }
}

/// `2MO`, `-1FR` and friends.
fn has_ordinal_prefix(token: &str) -> bool {
    if token.len() < 3 || !token.is_char_boundary(token.len() - 2) {
        return false;
    }
    let (ordinal, code) = token.split_at(token.len() - 2);
    let digits = ordinal.trim_start_matches(['+', '-']);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && code.parse::<WeekdayCode>().is_ok()
}

fn first_in_range(
    errors: &mut Vec<String>,
    name: &str,
    values: impl Iterator<Item = i64>,
    min: i64,
    max: i64,
) -> Option<u32> {
    let mut values = values;
    let first = values.next()?;
    let rest: Vec<i64> = values.collect();
    if !rest.is_empty() {
        errors.push(format!("ignored extra {} values {:?}", name, rest));
    }
    checked_number(errors, name, first, min, max)
}

fn checked_number(errors: &mut Vec<String>, name: &str, n: i64, min: i64, max: i64) -> Option<u32> {
    if (min..=max).contains(&n) {
        u32::try_from(n).ok()
    } else {
        errors.push(format!("ignored out-of-range {} {}", name, n));
        None
    }
}

/// Decides whether a normalized rule produces an occurrence on `target`.
///
/// Short months are not back-filled: a monthly rule on the 31st skips 30-day
/// months and February, and a yearly Feb-29 rule only fires in leap years.
pub fn occurs_on_date_normalized(rule: &NormalizedRecurrenceRule, target: CalendarDate) -> bool {
    if !rule.is_valid {
        return false;
    }
    let (Some(frequency), Some(start)) = (rule.frequency, rule.start_date) else {
        return false;
    };
    if target < start {
        return false;
    }
    if rule.effective_end_date.is_some_and(|end| target > end) {
        return false;
    }

    let month_gate = rule.by_month.map_or(true, |month| target.month() == month);

    match frequency {
        Frequency::Daily => true,
        Frequency::Weekly => {
            month_gate
                && if rule.by_day.is_empty() {
                    target.weekday() == start.weekday()
                } else {
                    rule.by_day.contains(&target.weekday())
                }
        }
        Frequency::Monthly => {
            month_gate && target.day() == rule.by_month_day.unwrap_or_else(|| start.day())
        }
        Frequency::Yearly => {
            target.month() == rule.by_month.unwrap_or_else(|| start.month())
                && target.day() == rule.by_month_day.unwrap_or_else(|| start.day())
        }
    }
}

/// String-input variant: an unparsable target never occurs.
pub fn occurs_on_date(rule: &NormalizedRecurrenceRule, target: &str) -> bool {
    normalize_date_only_string(target).is_some_and(|date| occurs_on_date_normalized(rule, date))
}

/// Lists every occurrence inside `[range_start, range_end]`, ascending.
///
/// The range is first clamped to the rule's own start and effective end. If
/// the clamped span is longer than [`MAX_EXPANSION_DAYS`] the call refuses and
/// returns an empty list, as it does for invalid rules and inverted ranges.
pub fn expand_occurrences_in_range(
    rule: &NormalizedRecurrenceRule,
    range_start: CalendarDate,
    range_end: CalendarDate,
) -> Vec<CalendarDate> {
    if !rule.is_valid || range_end < range_start {
        return Vec::new();
    }
    let Some(start) = rule.start_date else {
        return Vec::new();
    };

    let lo = range_start.max(start);
    let hi = match rule.effective_end_date {
        Some(end) => range_end.min(end),
        None => range_end,
    };
    if hi < lo {
        return Vec::new();
    }
    if lo.days_until(hi) + 1 > MAX_EXPANSION_DAYS {
        tracing::debug!(%lo, %hi, "refusing recurrence expansion beyond guard");
        return Vec::new();
    }

    let mut occurrences = Vec::new();
    let mut cursor = Some(lo);
    while let Some(day) = cursor.filter(|d| *d <= hi) {
        if occurs_on_date_normalized(rule, day) {
            occurrences.push(day);
        }
        cursor = day.succ();
    }
    occurrences
}

/// Length of the span an expansion over `[range_start, range_end]` would walk,
/// or `None` when the clamped span is empty.
pub fn clamped_span_days(
    rule: &NormalizedRecurrenceRule,
    range_start: CalendarDate,
    range_end: CalendarDate,
) -> Option<i64> {
    let start = rule.start_date?;
    let lo = range_start.max(start);
    let hi = rule.effective_end_date.map_or(range_end, |end| range_end.min(end));
    (lo <= hi).then(|| lo.days_until(hi) + 1)
}
