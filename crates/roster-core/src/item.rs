use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::datetime::compact_utc_serde;
use crate::window::{ClockTime, DaySpan, TimeWindow};

/// Rejections raised where an item is created or edited. Read paths assume
/// items already passed through here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed time {0:?}; expected HH:mm")]
    MalformedTime(String),

    #[error("start time {start} must be before end time {end}")]
    EmptyWindow { start: String, end: String },

    #[error("{kind} items need both a start and an end time")]
    MissingTimes { kind: ItemKind },

    #[error("duties cannot be full-day")]
    FullDayDuty,

    #[error("{kind} items need at least one date")]
    NoDates { kind: ItemKind },

    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("recipient {0:?} is not an email address")]
    MalformedRecipient(String),

    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("unknown item kind: {0}")]
    UnknownKind(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Duty,
    Event,
    Notice,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Duty => "duty",
            ItemKind::Event => "event",
            ItemKind::Notice => "notice",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duty" | "duties" => Ok(ItemKind::Duty),
            "event" | "events" => Ok(ItemKind::Event),
            "notice" | "notices" => Ok(ItemKind::Notice),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// A duty, event or notice with its dates and the people it is assigned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledItem {
    pub id: Uuid,

    pub kind: ItemKind,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Sorted, distinct. Empty only for dateless notices.
    #[serde(default)]
    pub dates: Vec<NaiveDate>,

    #[serde(default)]
    pub start_time: Option<ClockTime>,

    #[serde(default)]
    pub end_time: Option<ClockTime>,

    #[serde(default)]
    pub full_day: bool,

    pub recipients: Vec<String>,

    pub created_by: String,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(with = "compact_utc_serde")]
    pub entry: DateTime<Utc>,

    #[serde(with = "compact_utc_serde")]
    pub modified: DateTime<Utc>,
}

/// Raw input for a new item, as typed by a user.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub dates: Vec<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub full_day: bool,
    pub recipients: Vec<String>,
    pub created_by: String,
    pub location: Option<String>,
}

impl ItemDraft {
    pub fn new(kind: ItemKind, title: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: String::new(),
            dates: vec![],
            start_time: None,
            end_time: None,
            full_day: false,
            recipients: vec![],
            created_by: created_by.into(),
            location: None,
        }
    }
}

/// Field-wise edit. Touching dates, times or `full_day` replaces the whole
/// window set.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub dates: Option<Vec<NaiveDate>>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub full_day: Option<bool>,
    pub recipients: Option<Vec<String>>,
    pub location: Option<Option<String>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.dates.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.full_day.is_none()
            && self.recipients.is_none()
            && self.location.is_none()
    }
}

struct Schedule {
    dates: Vec<NaiveDate>,
    start_time: Option<ClockTime>,
    end_time: Option<ClockTime>,
    full_day: bool,
}

impl ScheduledItem {
    #[tracing::instrument(skip(draft, now), fields(kind = %draft.kind))]
    pub fn from_draft(draft: ItemDraft, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let title = normalize_title(&draft.title)?;
        let recipients = normalize_recipients(&draft.recipients)?;
        let schedule = validate_schedule(
            draft.kind,
            draft.dates,
            draft.start_time.as_deref(),
            draft.end_time.as_deref(),
            draft.full_day,
        )?;

        Ok(Self {
            id: Uuid::new_v4(),
            kind: draft.kind,
            title,
            description: draft.description.trim().to_string(),
            dates: schedule.dates,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            full_day: schedule.full_day,
            recipients,
            created_by: draft.created_by.trim().to_ascii_lowercase(),
            location: draft
                .location
                .map(|loc| loc.trim().to_string())
                .filter(|loc| !loc.is_empty()),
            entry: now,
            modified: now,
        })
    }

    /// Applies `patch` atomically: on error the item is left untouched.
    #[tracing::instrument(skip(self, patch, now), fields(id = %self.id))]
    pub fn apply_patch(&mut self, patch: ItemPatch, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let title = match &patch.title {
            Some(title) => normalize_title(title)?,
            None => self.title.clone(),
        };
        let recipients = match &patch.recipients {
            Some(list) => normalize_recipients(list)?,
            None => self.recipients.clone(),
        };

        let touches_times = patch.start_time.is_some() || patch.end_time.is_some();
        let full_day = match patch.full_day {
            Some(flag) => flag,
            None if touches_times => false,
            None => self.full_day,
        };
        let start = patch
            .start_time
            .or_else(|| self.start_time.map(|t| t.to_string()));
        let end = patch
            .end_time
            .or_else(|| self.end_time.map(|t| t.to_string()));
        let dates = patch.dates.unwrap_or_else(|| self.dates.clone());

        let schedule = validate_schedule(self.kind, dates, start.as_deref(), end.as_deref(), full_day)?;

        self.title = title;
        self.recipients = recipients;
        self.dates = schedule.dates;
        self.start_time = schedule.start_time;
        self.end_time = schedule.end_time;
        self.full_day = schedule.full_day;
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(location) = patch.location {
            self.location = location
                .map(|loc| loc.trim().to_string())
                .filter(|loc| !loc.is_empty());
        }
        self.modified = now;
        Ok(())
    }

    pub fn span(&self) -> Option<DaySpan> {
        if self.full_day {
            return Some(DaySpan::FullDay);
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(DaySpan::Timed { start, end }),
            _ => None,
        }
    }

    pub fn is_dateless(&self) -> bool {
        self.dates.is_empty()
    }

    /// One window per date, in date order.
    pub fn windows(&self) -> Vec<TimeWindow> {
        let Some(span) = self.span() else {
            return vec![];
        };
        self.dates
            .iter()
            .map(|&date| TimeWindow { date, span })
            .collect()
    }

    pub fn window_on(&self, date: NaiveDate) -> Option<TimeWindow> {
        if !self.dates.contains(&date) {
            return None;
        }
        self.span().map(|span| TimeWindow { date, span })
    }

    pub fn is_recipient(&self, who: &str) -> bool {
        let who = who.trim();
        self.recipients
            .iter()
            .any(|recipient| recipient.eq_ignore_ascii_case(who))
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

fn normalize_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn normalize_recipients(raw: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let email = entry.trim().to_ascii_lowercase();
        if email.is_empty() {
            continue;
        }
        let valid = email
            .split_once('@')
            .map(|(user, host)| !user.is_empty() && !host.is_empty() && !host.contains('@'))
            .unwrap_or(false);
        if !valid {
            return Err(ValidationError::MalformedRecipient(entry.trim().to_string()));
        }
        if !out.contains(&email) {
            out.push(email);
        }
    }

    if out.is_empty() {
        return Err(ValidationError::NoRecipients);
    }
    Ok(out)
}

fn validate_schedule(
    kind: ItemKind,
    mut dates: Vec<NaiveDate>,
    start: Option<&str>,
    end: Option<&str>,
    full_day: bool,
) -> Result<Schedule, ValidationError> {
    dates.sort();
    dates.dedup();

    if dates.is_empty() && kind != ItemKind::Notice {
        return Err(ValidationError::NoDates { kind });
    }

    if full_day {
        if kind == ItemKind::Duty {
            return Err(ValidationError::FullDayDuty);
        }
        return Ok(Schedule {
            dates,
            start_time: None,
            end_time: None,
            full_day: true,
        });
    }

    let start = start.map(str::trim).filter(|raw| !raw.is_empty());
    let end = end.map(str::trim).filter(|raw| !raw.is_empty());

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start.parse::<ClockTime>()?, end.parse::<ClockTime>()?),
        (None, None) if dates.is_empty() => {
            return Ok(Schedule {
                dates,
                start_time: None,
                end_time: None,
                full_day: false,
            });
        }
        _ => return Err(ValidationError::MissingTimes { kind }),
    };

    if start >= end {
        return Err(ValidationError::EmptyWindow {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    Ok(Schedule {
        dates,
        start_time: Some(start),
        end_time: Some(end),
        full_day: false,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ItemDraft, ItemKind, ItemPatch, ScheduledItem, ValidationError};
    use crate::window::DaySpan;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).expect("valid date")
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0)
            .single()
            .expect("valid now")
    }

    fn duty_draft() -> ItemDraft {
        let mut draft = ItemDraft::new(ItemKind::Duty, "Gate duty", "Admin@School.test");
        draft.dates = vec![date(21), date(19), date(21)];
        draft.start_time = Some("09:00".to_string());
        draft.end_time = Some("10:00".to_string());
        draft.recipients = vec![" Alice@X.test ".to_string(), "alice@x.test".to_string()];
        draft
    }

    #[test]
    fn draft_is_normalized() {
        let item = ScheduledItem::from_draft(duty_draft(), now()).expect("valid duty");
        assert_eq!(item.dates, vec![date(19), date(21)]);
        assert_eq!(item.recipients, vec!["alice@x.test".to_string()]);
        assert_eq!(item.created_by, "admin@school.test");
        assert_eq!(item.windows().len(), 2);
        assert!(item.is_recipient("ALICE@x.test"));
        assert_eq!(item.short_id().len(), 8);
    }

    #[test]
    fn rejects_bad_drafts() {
        let mut draft = duty_draft();
        draft.start_time = Some("9am".to_string());
        assert_eq!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::MalformedTime("9am".to_string()))
        );

        let mut draft = duty_draft();
        draft.end_time = Some("08:59".to_string());
        assert!(matches!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::EmptyWindow { .. })
        ));

        let mut draft = duty_draft();
        draft.full_day = true;
        assert_eq!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::FullDayDuty)
        );

        let mut draft = duty_draft();
        draft.dates.clear();
        assert_eq!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::NoDates { kind: ItemKind::Duty })
        );

        let mut draft = duty_draft();
        draft.recipients = vec!["  ".to_string()];
        assert_eq!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::NoRecipients)
        );

        let mut draft = duty_draft();
        draft.recipients = vec!["bob".to_string()];
        assert!(matches!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::MalformedRecipient(_))
        ));

        let mut draft = duty_draft();
        draft.end_time = None;
        assert_eq!(
            ScheduledItem::from_draft(draft, now()),
            Err(ValidationError::MissingTimes { kind: ItemKind::Duty })
        );
    }

    #[test]
    fn dateless_notice_is_allowed() {
        let mut draft = ItemDraft::new(ItemKind::Notice, "Library closed", "admin@x.test");
        draft.recipients = vec!["all@x.test".to_string()];
        let item = ScheduledItem::from_draft(draft, now()).expect("dateless notice");
        assert!(item.is_dateless());
        assert!(item.windows().is_empty());
        assert_eq!(item.span(), None);
    }

    #[test]
    fn full_day_event_drops_times() {
        let mut draft = ItemDraft::new(ItemKind::Event, "Sports day", "admin@x.test");
        draft.dates = vec![date(23)];
        draft.full_day = true;
        draft.start_time = Some("09:00".to_string());
        draft.recipients = vec!["all@x.test".to_string()];
        let item = ScheduledItem::from_draft(draft, now()).expect("full-day event");
        assert_eq!(item.start_time, None);
        assert_eq!(item.span(), Some(DaySpan::FullDay));
    }

    #[test]
    fn patch_replaces_window_set_or_leaves_item_untouched() {
        let mut item = ScheduledItem::from_draft(duty_draft(), now()).expect("valid duty");
        let before = item.clone();

        let bad = ItemPatch {
            start_time: Some("11:00".to_string()),
            ..ItemPatch::default()
        };
        assert!(item.apply_patch(bad, now()).is_err());
        assert_eq!(item, before);

        let later = now() + chrono::Duration::hours(1);
        let patch = ItemPatch {
            dates: Some(vec![date(22)]),
            start_time: Some("13:00".to_string()),
            end_time: Some("14:30".to_string()),
            location: Some(Some("Main gate".to_string())),
            ..ItemPatch::default()
        };
        item.apply_patch(patch, later).expect("valid patch");
        assert_eq!(item.dates, vec![date(22)]);
        assert_eq!(item.start_time.map(|t| t.to_string()), Some("13:00".to_string()));
        assert_eq!(item.location.as_deref(), Some("Main gate"));
        assert_eq!(item.id, before.id);
        assert_eq!(item.entry, before.entry);
        assert_eq!(item.modified, later);
    }

    #[test]
    fn kind_parses_plural_forms() {
        assert_eq!("Duties".parse::<ItemKind>(), Ok(ItemKind::Duty));
        assert_eq!("event".parse::<ItemKind>(), Ok(ItemKind::Event));
        assert!("meeting".parse::<ItemKind>().is_err());
    }
}
