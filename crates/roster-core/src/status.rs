use std::fmt;

use chrono::{
  DateTime,
  Duration,
  NaiveDateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

use crate::datetime::compact_utc_serde;
use crate::item::ScheduledItem;
use crate::window::TimeWindow;

/// Lead time for both the `urgent` label
/// and the reminder trigger.
pub const URGENT_LEAD_MINUTES: i64 = 60;
pub const UPCOMING_HORIZON_DAYS: i64 = 7;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
  Expired,
  Urgent,
  Ongoing,
  Today,
  Upcoming,
  Future
}

impl StatusLabel {
  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Expired => "expired",
      | Self::Urgent => "urgent",
      | Self::Ongoing => "ongoing",
      | Self::Today => "today",
      | Self::Upcoming => "upcoming",
      | Self::Future => "future"
    }
  }
}

impl fmt::Display for StatusLabel {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// First matching rule wins.
#[must_use]
pub fn classify_window(
  window: &TimeWindow,
  now: NaiveDateTime
) -> StatusLabel {
  let start = window.effective_start();

  if window.contains(now) {
    StatusLabel::Ongoing
  } else if start < now {
    StatusLabel::Expired
  } else if start - now
    <= Duration::minutes(
      URGENT_LEAD_MINUTES
    )
  {
    StatusLabel::Urgent
  } else if start.date() == now.date() {
    StatusLabel::Today
  } else if start - now
    <= Duration::days(
      UPCOMING_HORIZON_DAYS
    )
  {
    StatusLabel::Upcoming
  } else {
    StatusLabel::Future
  }
}

/// The occurrence that represents `item`
/// at `now`: the earliest window not yet
/// over, else the last one.
#[must_use]
pub fn current_window(
  item: &ScheduledItem,
  now: NaiveDateTime
) -> Option<TimeWindow> {
  let windows = item.windows();
  windows
    .iter()
    .find(|window| {
      window.effective_end() >= now
    })
    .or_else(|| windows.last())
    .copied()
}

/// `None` for dateless notices.
#[must_use]
pub fn classify(
  item: &ScheduledItem,
  now: NaiveDateTime
) -> Option<StatusLabel> {
  current_window(item, now).map(
    |window| classify_window(&window, now)
  )
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
)]
pub enum PriorityRank {
  RecipientUrgent,
  RecipientToday,
  Recipient,
  Other
}

#[must_use]
pub fn priority_rank(
  item: &ScheduledItem,
  status: Option<StatusLabel>,
  caller: Option<&str>
) -> PriorityRank {
  let tagged = caller
    .is_some_and(|who| {
      item.is_recipient(who)
    });
  match (tagged, status) {
    | (
      true,
      Some(StatusLabel::Urgent)
    ) => PriorityRank::RecipientUrgent,
    | (true, Some(StatusLabel::Today)) => {
      PriorityRank::RecipientToday
    }
    | (true, _) => PriorityRank::Recipient,
    | (false, _) => PriorityRank::Other
  }
}

#[derive(Debug, Clone)]
pub struct Classified<'a> {
  pub item:            &'a ScheduledItem,
  pub status:          Option<StatusLabel>,
  pub effective_start: Option<NaiveDateTime>,
  pub rank:            PriorityRank
}

/// Labels every item and orders the list
/// for `caller`: tagged-urgent, tagged
/// today, other tagged, the rest; each
/// group by effective start with dateless
/// items last.
pub fn prioritize<'a, I>(
  items: I,
  now: NaiveDateTime,
  caller: Option<&str>
) -> Vec<Classified<'a>>
where
  I: IntoIterator<
    Item = &'a ScheduledItem
  >
{
  let mut out = items
    .into_iter()
    .map(|item| {
      let window =
        current_window(item, now);
      let status = window.map(|w| {
        classify_window(&w, now)
      });
      Classified {
        item,
        status,
        effective_start: window
          .map(|w| w.effective_start()),
        rank: priority_rank(
          item, status, caller
        )
      }
    })
    .collect::<Vec<_>>();

  out.sort_by_key(|entry| {
    (
      entry.rank,
      entry.effective_start.is_none(),
      entry.effective_start
    )
  });

  tracing::debug!(
    count = out.len(),
    caller = caller.unwrap_or("-"),
    "prioritized items"
  );
  out
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ReminderSlot {
  pub item_id:    Uuid,
  pub occurrence: NaiveDateTime
}

/// The occurrence starting within the
/// reminder lead, regardless of who asks.
#[must_use]
pub fn upcoming_slot(
  item: &ScheduledItem,
  now: NaiveDateTime
) -> Option<ReminderSlot> {
  let lead =
    Duration::minutes(URGENT_LEAD_MINUTES);
  item
    .windows()
    .iter()
    .map(TimeWindow::effective_start)
    .find(|start| {
      let until = *start - now;
      until > Duration::zero()
        && until <= lead
    })
    .map(|occurrence| {
      ReminderSlot {
        item_id: item.id,
        occurrence
      }
    })
}

/// Whether `caller` should be reminded of
/// `item` now. Does not consult the ledger.
#[must_use]
pub fn reminder_due(
  item: &ScheduledItem,
  now: NaiveDateTime,
  caller: &str
) -> Option<ReminderSlot> {
  if !item.is_recipient(caller) {
    return None;
  }
  upcoming_slot(item, now)
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct ReminderMark {
  pub item_id:    Uuid,
  pub occurrence: NaiveDateTime,
  pub recipient:  String,
  #[serde(with = "compact_utc_serde")]
  pub sent_at:    DateTime<Utc>
}

/// Record of reminders already delivered,
/// one mark per occurrence and recipient.
#[derive(Debug, Clone, Default)]
pub struct ReminderLedger {
  marks: Vec<ReminderMark>
}

impl ReminderLedger {
  #[must_use]
  pub fn from_marks(
    marks: Vec<ReminderMark>
  ) -> Self {
    Self {
      marks
    }
  }

  #[must_use]
  pub fn marks(&self) -> &[ReminderMark] {
    &self.marks
  }

  #[must_use]
  pub fn has_sent(
    &self,
    slot: &ReminderSlot,
    recipient: &str
  ) -> bool {
    self.marks.iter().any(|mark| {
      mark.item_id == slot.item_id
        && mark.occurrence
          == slot.occurrence
        && mark
          .recipient
          .eq_ignore_ascii_case(recipient)
    })
  }

  pub fn mark(
    &mut self,
    slot: &ReminderSlot,
    recipient: &str,
    sent_at: DateTime<Utc>
  ) {
    if self.has_sent(slot, recipient) {
      return;
    }
    self.marks.push(ReminderMark {
      item_id: slot.item_id,
      occurrence: slot.occurrence,
      recipient: recipient
        .to_ascii_lowercase(),
      sent_at
    });
  }

  /// Drops every mark of `item_id`;
  /// returns how many were removed.
  pub fn forget_item(
    &mut self,
    item_id: Uuid
  ) -> usize {
    let before = self.marks.len();
    self
      .marks
      .retain(|mark| mark.item_id != item_id);
    before - self.marks.len()
  }

  /// Drops marks for occurrences before
  /// `cutoff`; they can never fire again.
  pub fn prune_before(
    &mut self,
    cutoff: NaiveDateTime
  ) -> usize {
    let before = self.marks.len();
    self
      .marks
      .retain(|mark| mark.occurrence >= cutoff);
    before - self.marks.len()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
  pub slot:       ReminderSlot,
  pub recipients: Vec<String>
}

/// Reminders due at `now` that the ledger
/// has not seen yet.
pub fn pending_reminders<'a, I>(
  items: I,
  now: NaiveDateTime,
  ledger: &ReminderLedger
) -> Vec<PendingReminder>
where
  I: IntoIterator<
    Item = &'a ScheduledItem
  >
{
  items
    .into_iter()
    .filter_map(|item| {
      let slot = upcoming_slot(item, now)?;
      let recipients = item
        .recipients
        .iter()
        .filter(|who| {
          !ledger.has_sent(&slot, who)
        })
        .cloned()
        .collect::<Vec<_>>();
      if recipients.is_empty() {
        None
      } else {
        Some(PendingReminder {
          slot,
          recipients
        })
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    NaiveDate,
    NaiveDateTime,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::item::{
    ItemDraft,
    ItemKind
  };

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19)
      .expect("valid date")
  }

  fn at(
    date: NaiveDate,
    h: u32,
    m: u32
  ) -> NaiveDateTime {
    date
      .and_hms_opt(h, m, 0)
      .expect("valid time")
  }

  fn created() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 10, 1, 0, 0, 0
      )
      .single()
      .expect("valid created")
  }

  fn event(
    dates: Vec<NaiveDate>,
    start: &str,
    end: &str,
    who: &[&str]
  ) -> ScheduledItem {
    let mut draft = ItemDraft::new(
      ItemKind::Event,
      "Assembly",
      "admin@x"
    );
    draft.dates = dates;
    draft.start_time =
      Some(start.to_string());
    draft.end_time = Some(end.to_string());
    draft.recipients = who
      .iter()
      .map(|w| (*w).to_string())
      .collect();
    ScheduledItem::from_draft(
      draft,
      created()
    )
    .expect("valid event")
  }

  fn full_day(
    date: NaiveDate
  ) -> ScheduledItem {
    let mut draft = ItemDraft::new(
      ItemKind::Event,
      "Sports day",
      "admin@x"
    );
    draft.dates = vec![date];
    draft.full_day = true;
    draft.recipients =
      vec!["all@x".to_string()];
    ScheduledItem::from_draft(
      draft,
      created()
    )
    .expect("valid full-day")
  }

  #[test]
  fn full_day_event_is_ongoing_at_noon()
  {
    let item = full_day(today());
    assert_eq!(
      classify(&item, at(today(), 12, 0)),
      Some(StatusLabel::Ongoing)
    );
    assert_eq!(
      classify(&item, at(today(), 0, 0)),
      Some(StatusLabel::Ongoing)
    );
  }

  #[test]
  fn urgent_then_today_around_one_hour()
  {
    let now = at(today(), 8, 0);
    let soon =
      event(vec![today()], "08:45", "09:30", &["a@x"]);
    let later =
      event(vec![today()], "09:01", "09:30", &["a@x"]);
    let edge =
      event(vec![today()], "09:00", "09:30", &["a@x"]);

    assert_eq!(
      classify(&soon, now),
      Some(StatusLabel::Urgent)
    );
    assert_eq!(
      classify(&later, now),
      Some(StatusLabel::Today)
    );
    assert_eq!(
      classify(&edge, now),
      Some(StatusLabel::Urgent)
    );
  }

  #[test]
  fn labels_follow_the_clock() {
    let item = event(
      vec![today() + Duration::days(10)],
      "10:00",
      "11:00",
      &["a@x"]
    );
    let start = at(
      today() + Duration::days(10),
      10,
      0
    );

    let cases = [
      (
        start - Duration::days(9),
        StatusLabel::Future
      ),
      (
        start - Duration::days(7),
        StatusLabel::Upcoming
      ),
      (
        start - Duration::hours(5),
        StatusLabel::Today
      ),
      (
        start - Duration::minutes(30),
        StatusLabel::Urgent
      ),
      (start, StatusLabel::Ongoing),
      (
        start + Duration::hours(1),
        StatusLabel::Ongoing
      ),
      (
        start + Duration::minutes(61),
        StatusLabel::Expired
      )
    ];
    for (now, expected) in cases {
      assert_eq!(
        classify(&item, now),
        Some(expected),
        "at {now}"
      );
    }
  }

  #[test]
  fn multi_date_item_uses_next_occurrence()
  {
    let wednesday =
      today() + Duration::days(2);
    let item = event(
      vec![today(), wednesday],
      "09:00",
      "10:00",
      &["a@x"]
    );

    let tuesday_noon =
      at(today() + Duration::days(1), 12, 0);
    assert_eq!(
      current_window(&item, tuesday_noon)
        .map(|w| w.date),
      Some(wednesday)
    );
    assert_eq!(
      classify(&item, tuesday_noon),
      Some(StatusLabel::Upcoming)
    );
    assert_eq!(
      classify(
        &item,
        at(wednesday, 11, 0)
      ),
      Some(StatusLabel::Expired)
    );
  }

  #[test]
  fn dateless_notice_has_no_status() {
    let mut draft = ItemDraft::new(
      ItemKind::Notice,
      "Uniform policy",
      "admin@x"
    );
    draft.recipients =
      vec!["all@x".to_string()];
    let notice = ScheduledItem::from_draft(
      draft,
      created()
    )
    .expect("notice");
    assert_eq!(
      classify(&notice, at(today(), 9, 0)),
      None
    );
  }

  #[test]
  fn priority_puts_callers_urgent_items_first()
  {
    let now = at(today(), 8, 0);
    let tomorrow_untagged = event(
      vec![today() + Duration::days(1)],
      "09:00",
      "10:00",
      &["bob@x"]
    );
    let later_today = event(
      vec![today()],
      "14:00",
      "15:00",
      &["alice@x"]
    );
    let in_thirty = event(
      vec![today()],
      "08:30",
      "09:00",
      &["alice@x", "bob@x"]
    );

    let items = vec![
      tomorrow_untagged.clone(),
      later_today.clone(),
      in_thirty.clone(),
    ];
    let ordered = prioritize(
      &items,
      now,
      Some("alice@x")
    );
    let ids = ordered
      .iter()
      .map(|entry| entry.item.id)
      .collect::<Vec<_>>();
    assert_eq!(
      ids,
      vec![
        in_thirty.id,
        later_today.id,
        tomorrow_untagged.id
      ]
    );
    assert_eq!(
      ordered[0].rank,
      PriorityRank::RecipientUrgent
    );
    assert_eq!(
      ordered[1].status,
      Some(StatusLabel::Today)
    );
    assert_eq!(
      ordered[2].rank,
      PriorityRank::Other
    );
  }

  #[test]
  fn reminder_due_only_inside_the_lead() {
    let now = at(today(), 8, 0);
    let item = event(
      vec![today()],
      "08:30",
      "09:00",
      &["alice@x"]
    );

    assert!(
      reminder_due(&item, now, "alice@x")
        .is_some()
    );
    assert!(
      reminder_due(&item, now, "bob@x")
        .is_none()
    );
    assert!(
      reminder_due(
        &item,
        at(today(), 8, 30),
        "alice@x"
      )
      .is_none()
    );
    assert!(
      reminder_due(
        &item,
        at(today(), 7, 29),
        "alice@x"
      )
      .is_none()
    );
  }

  #[test]
  fn ledger_suppresses_repeat_reminders()
  {
    let now = at(today(), 8, 0);
    let item = event(
      vec![today()],
      "08:30",
      "09:00",
      &["alice@x", "bob@x"]
    );
    let mut ledger =
      ReminderLedger::default();

    let first = pending_reminders(
      [&item],
      now,
      &ledger
    );
    assert_eq!(first.len(), 1);
    assert_eq!(
      first[0].recipients,
      vec![
        "alice@x".to_string(),
        "bob@x".to_string()
      ]
    );

    ledger.mark(
      &first[0].slot,
      "alice@x",
      created()
    );
    ledger.mark(
      &first[0].slot,
      "ALICE@x",
      created()
    );
    assert_eq!(ledger.marks().len(), 1);

    let second = pending_reminders(
      [&item],
      now + Duration::minutes(5),
      &ledger
    );
    assert_eq!(
      second[0].recipients,
      vec!["bob@x".to_string()]
    );

    ledger.mark(
      &first[0].slot,
      "bob@x",
      created()
    );
    assert!(
      pending_reminders(
        [&item],
        now + Duration::minutes(10),
        &ledger
      )
      .is_empty()
    );

    assert_eq!(
      ledger.prune_before(at(today(), 9, 0)),
      2
    );
    assert_eq!(ledger.forget_item(item.id), 0);
  }
}
