use std::collections::HashMap;
use std::ops::Range;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::item::{
  ItemKind,
  ScheduledItem
};
use crate::stacker::{
  LaneLayout,
  cell_position,
  stack_day
};
use crate::week::WeekRange;

pub const DEFAULT_PALETTE: [&str; 8] = [
  "#4e79a7", "#f28e2b", "#e15759",
  "#76b7b2", "#59a14f", "#edc948",
  "#b07aa1", "#ff9da7"
];

/// Hours shown in the grid, end exclusive:
/// `9..16` yields cells 09:00 to 15:00.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct HourRange {
  pub start: u32,
  pub end:   u32
}

impl Default for HourRange {
  fn default() -> Self {
    Self {
      start: 9,
      end:   16
    }
  }
}

impl HourRange {
  #[must_use]
  pub fn new(
    start: u32,
    end: u32
  ) -> Option<Self> {
    (start < end && end <= 24).then_some(
      Self {
        start,
        end
      }
    )
  }

  #[must_use]
  pub fn hours(&self) -> Range<u32> {
    self.start..self.end
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
  colors: Vec<String>
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      colors: DEFAULT_PALETTE
        .iter()
        .map(|c| (*c).to_string())
        .collect()
    }
  }
}

impl Palette {
  /// Falls back to the default palette
  /// when `colors` is empty.
  #[must_use]
  pub fn new(colors: Vec<String>) -> Self {
    if colors.is_empty() {
      Self::default()
    } else {
      Self {
        colors
      }
    }
  }

  #[must_use]
  pub fn color(
    &self,
    index: usize
  ) -> &str {
    &self.colors[index % self.colors.len()]
  }
}

/// Colors handed out so far, by first
/// encounter. Callers own this and may
/// carry it across passes to keep colors
/// stable.
#[derive(Debug, Clone, Default)]
pub struct ColorAssignments {
  order: HashMap<Uuid, usize>
}

impl ColorAssignments {
  pub fn color_for(
    &mut self,
    id: Uuid,
    palette: &Palette
  ) -> String {
    let next = self.order.len();
    let index =
      *self.order.entry(id).or_insert(next);
    palette.color(index).to_string()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.order.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedItem {
  pub id:            Uuid,
  pub title:         String,
  pub kind:          ItemKind,
  pub level:         usize,
  pub top_offset:    u32,
  pub left_percent:  f64,
  pub width_percent: f64,
  pub color:         String
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourCell {
  pub hour:  u32,
  pub items: Vec<PositionedItem>
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridDay {
  pub date:       NaiveDate,
  pub lane_count: usize,
  pub row_height: u32,
  pub hours:      Vec<HourCell>
}

impl GridDay {
  #[must_use]
  pub fn cell(
    &self,
    hour: u32
  ) -> Option<&HourCell> {
    self
      .hours
      .iter()
      .find(|cell| cell.hour == hour)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekGrid {
  pub week:  WeekRange,
  pub range: HourRange,
  pub days:  Vec<GridDay>
}

impl WeekGrid {
  #[must_use]
  pub fn day(
    &self,
    date: NaiveDate
  ) -> Option<&GridDay> {
    self
      .days
      .iter()
      .find(|day| day.date == date)
  }
}

/// Lays `items` out on a day-by-hour grid
/// for `week`. Lanes are computed once per
/// day and shared by every hour of it.
#[tracing::instrument(skip_all, fields(week_start = %week.start, items = items.len()))]
pub fn build_grid(
  items: &[ScheduledItem],
  week: &WeekRange,
  range: HourRange,
  layout: &LaneLayout,
  palette: &Palette,
  colors: &mut ColorAssignments
) -> WeekGrid {
  let by_id = items
    .iter()
    .map(|item| (item.id, item))
    .collect::<HashMap<_, _>>();

  let mut days = Vec::with_capacity(7);
  for date in week.days() {
    let group = stack_day(items, date);
    let lane_count = group.lane_count();

    let mut hours = Vec::new();
    for hour in range.hours() {
      let mut cell_items = Vec::new();
      for entry in &group.entries {
        let Some(pos) =
          cell_position(&entry.window, hour)
        else {
          continue;
        };
        let Some(item) = by_id.get(&entry.id)
        else {
          continue;
        };
        cell_items.push(PositionedItem {
          id:            entry.id,
          title:         item.title.clone(),
          kind:          item.kind,
          level:         entry.level,
          top_offset:    layout
            .offset(entry.level),
          left_percent:  pos.left_percent,
          width_percent: pos.width_percent,
          color:         colors
            .color_for(entry.id, palette)
        });
      }
      hours.push(HourCell {
        hour,
        items: cell_items
      });
    }

    tracing::trace!(
      %date,
      lane_count,
      entries = group.entries.len(),
      "grid day built"
    );
    days.push(GridDay {
      date,
      lane_count,
      row_height: layout
        .row_height(lane_count),
      hours
    });
  }

  WeekGrid {
    week: *week,
    range,
    days
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::item::ItemDraft;
  use crate::week::week_range;

  fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19)
      .expect("valid date")
  }

  fn item(
    kind: ItemKind,
    title: &str,
    dates: Vec<NaiveDate>,
    times: Option<(&str, &str)>,
    who: &str
  ) -> ScheduledItem {
    let mut draft =
      ItemDraft::new(kind, title, "admin@x");
    draft.dates = dates;
    match times {
      | Some((start, end)) => {
        draft.start_time =
          Some(start.to_string());
        draft.end_time =
          Some(end.to_string());
      }
      | None => draft.full_day = true
    }
    draft.recipients = vec![who.to_string()];
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 1, 0, 0, 0
      )
      .single()
      .expect("valid now");
    ScheduledItem::from_draft(draft, now)
      .expect("valid item")
  }

  fn build(
    items: &[ScheduledItem],
    colors: &mut ColorAssignments
  ) -> WeekGrid {
    build_grid(
      items,
      &week_range(monday()),
      HourRange::default(),
      &LaneLayout::default(),
      &Palette::default(),
      colors
    )
  }

  #[test]
  fn two_overlapping_duties_on_monday() {
    let a = item(
      ItemKind::Duty,
      "A",
      vec![monday()],
      Some(("09:00", "10:00")),
      "alice@x"
    );
    let b = item(
      ItemKind::Duty,
      "B",
      vec![monday()],
      Some(("09:30", "10:30")),
      "bob@x"
    );
    let mut colors =
      ColorAssignments::default();
    let grid =
      build(&[a.clone(), b.clone()], &mut colors);

    let day = grid
      .day(monday())
      .expect("monday row");
    assert_eq!(day.lane_count, 2);
    assert_eq!(day.row_height, 48);

    let nine =
      day.cell(9).expect("09:00 cell");
    assert_eq!(nine.items.len(), 2);
    let pa = &nine.items[0];
    let pb = &nine.items[1];
    assert_eq!(pa.id, a.id);
    assert_eq!(pa.level, 0);
    assert_eq!(pa.left_percent, 0.0);
    assert_eq!(pa.width_percent, 100.0);
    assert_eq!(pb.id, b.id);
    assert_eq!(pb.level, 1);
    assert_eq!(pb.top_offset, 30);
    assert_eq!(pb.left_percent, 50.0);
    assert_eq!(pb.width_percent, 50.0);
    assert_ne!(pa.color, pb.color);

    let ten =
      day.cell(10).expect("10:00 cell");
    assert_eq!(ten.items.len(), 1);
    assert_eq!(ten.items[0].level, 1);
    assert_eq!(ten.items[0].width_percent, 50.0);
  }

  #[test]
  fn grid_covers_week_and_hour_range() {
    let mut colors =
      ColorAssignments::default();
    let grid = build(&[], &mut colors);
    assert_eq!(grid.days.len(), 7);
    assert_eq!(grid.days[0].date, monday());
    for day in &grid.days {
      assert_eq!(day.hours.len(), 7);
      assert_eq!(day.hours[0].hour, 9);
      assert_eq!(day.hours[6].hour, 15);
      assert_eq!(day.lane_count, 0);
      assert_eq!(day.row_height, 32);
    }
    assert!(colors.is_empty());
  }

  #[test]
  fn same_id_keeps_its_color_across_days()
  {
    let wednesday =
      monday() + Duration::days(2);
    let multi = item(
      ItemKind::Event,
      "Exams",
      vec![monday(), wednesday],
      Some(("11:00", "12:00")),
      "all@x"
    );
    let other = item(
      ItemKind::Event,
      "Choir",
      vec![wednesday],
      Some(("09:00", "10:00")),
      "all@x"
    );
    let mut colors =
      ColorAssignments::default();
    let grid = build(
      &[multi.clone(), other.clone()],
      &mut colors
    );

    let monday_color = grid
      .day(monday())
      .and_then(|d| d.cell(11))
      .map(|c| c.items[0].color.clone())
      .expect("monday exam");
    let wednesday_color = grid
      .day(wednesday)
      .and_then(|d| d.cell(11))
      .map(|c| c.items[0].color.clone())
      .expect("wednesday exam");
    assert_eq!(monday_color, wednesday_color);
    assert_eq!(monday_color, DEFAULT_PALETTE[0]);
    assert_eq!(colors.len(), 2);

    // carried state keeps assignments
    let again = build(
      &[other.clone(), multi.clone()],
      &mut colors
    );
    let choir = again
      .day(wednesday)
      .and_then(|d| d.cell(9))
      .map(|c| c.items[0].color.clone())
      .expect("choir");
    assert_eq!(choir, DEFAULT_PALETTE[1]);
  }

  #[test]
  fn full_day_event_fills_every_hour() {
    let sports = item(
      ItemKind::Event,
      "Sports day",
      vec![monday() + Duration::days(4)],
      None,
      "all@x"
    );
    let mut colors =
      ColorAssignments::default();
    let grid =
      build(&[sports.clone()], &mut colors);
    let friday = grid
      .day(monday() + Duration::days(4))
      .expect("friday");
    for cell in &friday.hours {
      assert_eq!(cell.items.len(), 1);
      assert_eq!(cell.items[0].left_percent, 0.0);
      assert_eq!(
        cell.items[0].width_percent,
        100.0
      );
    }
  }

  #[test]
  fn items_outside_the_week_are_ignored()
  {
    let next_week = item(
      ItemKind::Duty,
      "Late",
      vec![monday() + Duration::days(7)],
      Some(("09:00", "10:00")),
      "a@x"
    );
    let mut colors =
      ColorAssignments::default();
    let grid =
      build(&[next_week], &mut colors);
    assert!(grid.days.iter().all(|day| {
      day
        .hours
        .iter()
        .all(|cell| cell.items.is_empty())
    }));
  }

  #[test]
  fn palette_cycles() {
    let palette = Palette::new(vec![
      "red".to_string(),
      "blue".to_string(),
    ]);
    assert_eq!(palette.color(0), "red");
    assert_eq!(palette.color(3), "blue");
    assert_eq!(
      Palette::new(vec![]),
      Palette::default()
    );
    assert_eq!(
      HourRange::new(16, 9),
      None
    );
  }
}
