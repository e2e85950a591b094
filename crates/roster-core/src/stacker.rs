//! Lane assignment for items sharing a
//! day, and their placement inside hourly
//! cells.
//!
//! Items are placed first-fit in the order
//! they arrive: each takes the lowest lane
//! that holds nothing overlapping it.
//! Input is not sorted by start time, so
//! the result is stable for a given query
//! order but not a minimum colouring.

use std::collections::{
  BTreeMap,
  HashSet
};

use chrono::NaiveDate;
use tracing::trace;
use uuid::Uuid;

use crate::item::ScheduledItem;
use crate::window::TimeWindow;

pub type LevelMap = BTreeMap<Uuid, usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct StackedEntry {
  pub id:     Uuid,
  pub window: TimeWindow,
  pub level:  usize
}

/// Items present on one calendar day with
/// their lanes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapGroup {
  pub date:    NaiveDate,
  pub entries: Vec<StackedEntry>
}

impl OverlapGroup {
  #[must_use]
  pub fn lane_count(&self) -> usize {
    self
      .entries
      .iter()
      .map(|entry| entry.level + 1)
      .max()
      .unwrap_or(0)
  }

  #[must_use]
  pub fn levels(&self) -> LevelMap {
    self
      .entries
      .iter()
      .map(|entry| {
        (entry.id, entry.level)
      })
      .collect()
  }

  #[must_use]
  pub fn level_of(
    &self,
    id: Uuid
  ) -> Option<usize> {
    self
      .entries
      .iter()
      .find(|entry| entry.id == id)
      .map(|entry| entry.level)
  }
}

pub fn stack_day<'a, I>(
  items: I,
  day: NaiveDate
) -> OverlapGroup
where
  I: IntoIterator<
    Item = &'a ScheduledItem
  >
{
  let mut seen = HashSet::new();
  let mut entries: Vec<StackedEntry> =
    Vec::new();

  for item in items {
    if !seen.insert(item.id) {
      continue;
    }
    let Some(window) =
      item.window_on(day)
    else {
      continue;
    };

    let mut level = 0;
    while entries.iter().any(|placed| {
      placed.level == level
        && placed.window.overlaps(&window)
    }) {
      level += 1;
    }

    trace!(
      id = %item.id,
      %day,
      level,
      "assigned lane"
    );
    entries.push(StackedEntry {
      id: item.id,
      window,
      level
    });
  }

  OverlapGroup {
    date: day,
    entries
  }
}

pub fn assign_levels<'a, I>(
  items_on_same_day: I,
  day: NaiveDate
) -> LevelMap
where
  I: IntoIterator<
    Item = &'a ScheduledItem
  >
{
  stack_day(items_on_same_day, day)
    .levels()
}

/// Pixel geometry of a day row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct LaneLayout {
  pub block_height:   u32,
  pub gap:            u32,
  pub margin:         u32,
  pub min_row_height: u32
}

impl Default for LaneLayout {
  fn default() -> Self {
    Self {
      block_height:   24,
      gap:            4,
      margin:         2,
      min_row_height: 32
    }
  }
}

impl LaneLayout {
  #[must_use]
  pub fn row_height(
    &self,
    lane_count: usize
  ) -> u32 {
    let lanes = u32::try_from(lane_count)
      .unwrap_or(u32::MAX);
    self.min_row_height.max(
      lanes
        .saturating_mul(self.block_height)
    )
  }

  #[must_use]
  pub fn offset(
    &self,
    level: usize
  ) -> u32 {
    let level = u32::try_from(level)
      .unwrap_or(u32::MAX);
    self.margin.saturating_add(
      level.saturating_mul(
        self.block_height + self.gap
      )
    )
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq,
)]
pub struct CellPosition {
  pub left_percent:  f64,
  pub width_percent: f64
}

/// Horizontal placement of `window`
/// inside the cell `[hour:00, hour+1:00)`.
/// `None` when the window does not touch
/// that hour.
#[must_use]
pub fn cell_position(
  window: &TimeWindow,
  hour: u32
) -> Option<CellPosition> {
  let hour_start = hour * 60;
  let hour_end = hour_start + 60;
  if !window.intersects(hour_start, hour_end)
  {
    return None;
  }

  let start = window.start_minute();
  let end = window.end_minute();

  let left = if start > hour_start {
    percent_of_hour(start - hour_start)
  } else {
    0.0
  };
  let right_edge = if end < hour_end {
    100.0 - percent_of_hour(hour_end - end)
  } else {
    100.0
  };

  Some(CellPosition {
    left_percent:  round2(left),
    width_percent: round2(
      right_edge - left
    )
  })
}

fn percent_of_hour(minutes: u32) -> f64 {
  f64::from(minutes) / 60.0 * 100.0
}

fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    LaneLayout,
    assign_levels,
    cell_position,
    stack_day
  };
  use crate::item::{
    ItemDraft,
    ItemKind,
    ScheduledItem
  };

  fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19)
      .expect("valid date")
  }

  fn duty(
    title: &str,
    start: &str,
    end: &str,
    who: &str
  ) -> ScheduledItem {
    let mut draft = ItemDraft::new(
      ItemKind::Duty,
      title,
      "admin@x"
    );
    draft.dates = vec![monday()];
    draft.start_time =
      Some(start.to_string());
    draft.end_time = Some(end.to_string());
    draft.recipients =
      vec![who.to_string()];
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 1, 0, 0, 0
      )
      .single()
      .expect("valid now");
    ScheduledItem::from_draft(draft, now)
      .expect("valid duty")
  }

  #[test]
  fn overlapping_duties_get_distinct_levels()
  {
    let a =
      duty("A", "09:00", "10:00", "alice@x");
    let b =
      duty("B", "09:30", "10:30", "bob@x");

    let levels =
      assign_levels([&a, &b], monday());
    assert_eq!(levels.get(&a.id), Some(&0));
    assert_eq!(levels.get(&b.id), Some(&1));
  }

  #[test]
  fn free_lane_is_reused_first_fit() {
    let a =
      duty("A", "09:00", "10:00", "alice@x");
    let b =
      duty("B", "09:30", "10:30", "bob@x");
    let c =
      duty("C", "10:30", "11:00", "carol@x");
    let d =
      duty("D", "09:45", "10:45", "dan@x");

    let group =
      stack_day([&a, &b, &c, &d], monday());
    assert_eq!(group.level_of(c.id), Some(0));
    assert_eq!(group.level_of(d.id), Some(2));
    assert_eq!(group.lane_count(), 3);
  }

  #[test]
  fn duplicates_and_other_days_are_skipped()
  {
    let a =
      duty("A", "09:00", "10:00", "alice@x");
    let group =
      stack_day([&a, &a], monday());
    assert_eq!(group.entries.len(), 1);

    let tuesday = monday().succ_opt()
      .expect("tuesday");
    assert!(
      stack_day([&a], tuesday)
        .entries
        .is_empty()
    );
  }

  #[test]
  fn overlapping_items_never_share_a_level()
  {
    let mut seed: u32 = 7;
    let mut next = |modulo: u32| {
      seed = seed
        .wrapping_mul(1_103_515_245)
        .wrapping_add(12_345);
      (seed >> 16) % modulo
    };

    for _round in 0..50 {
      let mut items = Vec::new();
      for idx in 0..12 {
        let start = next(20) * 30 + 360;
        let len = next(6) * 15 + 15;
        let end = start + len;
        items.push(duty(
          &format!("item {idx}"),
          &format!(
            "{:02}:{:02}",
            start / 60,
            start % 60
          ),
          &format!(
            "{:02}:{:02}",
            end / 60,
            end % 60
          ),
          "x@x"
        ));
      }

      let group =
        stack_day(&items, monday());
      for a in &group.entries {
        for b in &group.entries {
          if a.id != b.id
            && a.window.overlaps(&b.window)
          {
            assert_ne!(a.level, b.level);
          }
        }
      }
    }
  }

  #[test]
  fn exact_hour_fills_cell() {
    let a =
      duty("A", "09:00", "10:00", "alice@x");
    let window = a
      .window_on(monday())
      .expect("window");
    let pos = cell_position(&window, 9)
      .expect("in cell");
    assert_eq!(pos.left_percent, 0.0);
    assert_eq!(pos.width_percent, 100.0);
    assert!(
      cell_position(&window, 10).is_none()
    );
    assert!(
      cell_position(&window, 8).is_none()
    );
  }

  #[test]
  fn partial_hours_are_positioned() {
    let b =
      duty("B", "09:30", "10:30", "bob@x");
    let window = b
      .window_on(monday())
      .expect("window");

    let nine = cell_position(&window, 9)
      .expect("nine");
    assert_eq!(nine.left_percent, 50.0);
    assert_eq!(nine.width_percent, 50.0);

    let ten = cell_position(&window, 10)
      .expect("ten");
    assert_eq!(ten.left_percent, 0.0);
    assert_eq!(ten.width_percent, 50.0);

    let short =
      duty("S", "09:15", "09:35", "s@x");
    let pos = cell_position(
      &short
        .window_on(monday())
        .expect("window"),
      9
    )
    .expect("short");
    assert_eq!(pos.left_percent, 25.0);
    assert_eq!(pos.width_percent, 33.33);
  }

  #[test]
  fn layout_grows_with_lanes() {
    let layout = LaneLayout::default();
    assert_eq!(layout.row_height(0), 32);
    assert_eq!(layout.row_height(1), 32);
    assert_eq!(layout.row_height(3), 72);
    assert_eq!(layout.offset(0), 2);
    assert_eq!(layout.offset(2), 58);
  }
}
