use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum ItemKindDto {
  Duty,
  Event,
  Notice
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusDto {
  Expired,
  Urgent,
  Ongoing,
  Today,
  Upcoming,
  Future
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
  pub id:                  Uuid,
  pub kind:                ItemKindDto,
  pub title:               String,
  #[serde(default)]
  pub description:         String,
  pub dates:               Vec<String>,
  pub start_time:          Option<String>,
  pub end_time:            Option<String>,
  #[serde(default)]
  pub is_full_day:         bool,
  pub assigned_recipients: Vec<String>,
  pub created_by:          String,
  pub location:            Option<String>,
  #[serde(default)]
  pub status:              Option<StatusDto>
}

/// Bounds of a weekly view as ISO-8601
/// local datetimes.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct WeekQuery {
  pub week_start: String,
  pub week_end:   String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct PositionedItemDto {
  pub id:            Uuid,
  pub title:         String,
  pub level:         usize,
  pub top_offset:    u32,
  pub left_percent:  f64,
  pub width_percent: f64,
  pub color:         String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct HourCellDto {
  pub hour:  u32,
  pub items: Vec<PositionedItemDto>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct GridDayDto {
  pub date:       String,
  pub lane_count: usize,
  pub row_height: u32,
  pub hours:      Vec<HourCellDto>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct WeekGridDto {
  pub query: WeekQuery,
  pub days:  Vec<GridDayDto>
}
