use anyhow::Context;
use chrono::NaiveDateTime;
use roster_shared::{
  GridDayDto,
  HourCellDto,
  ItemDto,
  ItemKindDto,
  PositionedItemDto,
  StatusDto,
  WeekGridDto,
  WeekQuery
};

use crate::grid::{
  GridDay,
  PositionedItem,
  WeekGrid
};
use crate::item::{
  ItemKind,
  ScheduledItem
};
use crate::status::StatusLabel;
use crate::week::{
  WeekRange,
  week_range
};

/// ISO-8601 local datetime with
/// millisecond precision.
pub const ISO_LOCAL_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%.3f";

impl From<ItemKind> for ItemKindDto {
  fn from(kind: ItemKind) -> Self {
    match kind {
      | ItemKind::Duty => Self::Duty,
      | ItemKind::Event => Self::Event,
      | ItemKind::Notice => Self::Notice
    }
  }
}

impl From<StatusLabel> for StatusDto {
  fn from(label: StatusLabel) -> Self {
    match label {
      | StatusLabel::Expired => {
        Self::Expired
      }
      | StatusLabel::Urgent => Self::Urgent,
      | StatusLabel::Ongoing => {
        Self::Ongoing
      }
      | StatusLabel::Today => Self::Today,
      | StatusLabel::Upcoming => {
        Self::Upcoming
      }
      | StatusLabel::Future => Self::Future
    }
  }
}

#[must_use]
pub fn item_dto(
  item: &ScheduledItem,
  status: Option<StatusLabel>
) -> ItemDto {
  ItemDto {
    id:                  item.id,
    kind:                item.kind.into(),
    title:               item.title.clone(),
    description:         item
      .description
      .clone(),
    dates:               item
      .dates
      .iter()
      .map(|d| {
        d.format("%Y-%m-%d").to_string()
      })
      .collect(),
    start_time:          item
      .start_time
      .map(|t| t.to_string()),
    end_time:            item
      .end_time
      .map(|t| t.to_string()),
    is_full_day:         item.full_day,
    assigned_recipients: item
      .recipients
      .clone(),
    created_by:          item
      .created_by
      .clone(),
    location:            item
      .location
      .clone(),
    status:              status
      .map(StatusDto::from)
  }
}

#[must_use]
pub fn week_query(
  week: &WeekRange
) -> WeekQuery {
  WeekQuery {
    week_start: week
      .start
      .format(ISO_LOCAL_FORMAT)
      .to_string(),
    week_end:   week
      .end
      .format(ISO_LOCAL_FORMAT)
      .to_string()
  }
}

/// Reads the week back from a query.
/// Only `weekStart` decides the week, so a
/// mid-week start snaps to its Monday.
pub fn week_from_query(
  query: &WeekQuery
) -> anyhow::Result<WeekRange> {
  let start = parse_iso_local(
    &query.week_start
  )
  .with_context(|| {
    format!(
      "invalid weekStart {:?}",
      query.week_start
    )
  })?;
  Ok(week_range(start.date()))
}

fn parse_iso_local(
  raw: &str
) -> Result<NaiveDateTime, chrono::ParseError>
{
  NaiveDateTime::parse_from_str(
    raw.trim(),
    "%Y-%m-%dT%H:%M:%S%.f"
  )
}

fn positioned_dto(
  item: &PositionedItem
) -> PositionedItemDto {
  PositionedItemDto {
    id:            item.id,
    title:         item.title.clone(),
    level:         item.level,
    top_offset:    item.top_offset,
    left_percent:  item.left_percent,
    width_percent: item.width_percent,
    color:         item.color.clone()
  }
}

fn day_dto(day: &GridDay) -> GridDayDto {
  GridDayDto {
    date:       day
      .date
      .format("%Y-%m-%d")
      .to_string(),
    lane_count: day.lane_count,
    row_height: day.row_height,
    hours:      day
      .hours
      .iter()
      .map(|cell| {
        HourCellDto {
          hour:  cell.hour,
          items: cell
            .items
            .iter()
            .map(positioned_dto)
            .collect()
        }
      })
      .collect()
  }
}

#[must_use]
pub fn week_grid_dto(
  grid: &WeekGrid
) -> WeekGridDto {
  WeekGridDto {
    query: week_query(&grid.week),
    days:  grid
      .days
      .iter()
      .map(day_dto)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::item::ItemDraft;

  #[test]
  fn week_query_uses_iso_bounds() {
    let week = week_range(
      NaiveDate::from_ymd_opt(2026, 10, 22)
        .expect("valid date")
    );
    let query = week_query(&week);
    assert_eq!(
      query.week_start,
      "2026-10-19T00:00:00.000"
    );
    assert_eq!(
      query.week_end,
      "2026-10-25T23:59:59.999"
    );
    assert_eq!(
      week_from_query(&query)
        .expect("parse query"),
      week
    );

    let loose = WeekQuery {
      week_start: "2026-10-21T00:00:00"
        .to_string(),
      week_end:   String::new()
    };
    assert_eq!(
      week_from_query(&loose)
        .expect("parse loose query"),
      week
    );
    assert!(
      week_from_query(&WeekQuery {
        week_start: "monday".to_string(),
        week_end:   String::new()
      })
      .is_err()
    );
  }

  #[test]
  fn item_dto_carries_status_and_times() {
    let mut draft = ItemDraft::new(
      ItemKind::Event,
      "Open evening",
      "head@x"
    );
    draft.dates = vec![
      NaiveDate::from_ymd_opt(2026, 10, 23)
        .expect("valid date"),
    ];
    draft.start_time =
      Some("18:00".to_string());
    draft.end_time =
      Some("20:30".to_string());
    draft.recipients =
      vec!["staff@x".to_string()];
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 1, 0, 0, 0
      )
      .single()
      .expect("valid now");
    let item =
      ScheduledItem::from_draft(draft, now)
        .expect("valid item");

    let dto = item_dto(
      &item,
      Some(StatusLabel::Upcoming)
    );
    assert_eq!(dto.kind, ItemKindDto::Event);
    assert_eq!(dto.dates, vec!["2026-10-23"]);
    assert_eq!(
      dto.start_time.as_deref(),
      Some("18:00")
    );
    assert_eq!(
      dto.end_time.as_deref(),
      Some("20:30")
    );
    assert!(!dto.is_full_day);
    assert_eq!(
      dto.status,
      Some(StatusDto::Upcoming)
    );
  }
}
