use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Weekday
};

use crate::window::{
  end_of_day,
  start_of_day
};

/// Weekly views always begin on Monday,
/// independent of the host locale.
pub const WEEK_START: Weekday =
  Weekday::Mon;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct WeekRange {
  pub start: NaiveDateTime,
  pub end:   NaiveDateTime
}

#[must_use]
pub fn week_range(
  reference: NaiveDate
) -> WeekRange {
  let monday = start_of_week(reference);
  WeekRange {
    start: start_of_day(monday),
    end:   end_of_day(
      monday + Duration::days(6)
    )
  }
}

fn start_of_week(
  day: NaiveDate
) -> NaiveDate {
  let day_idx = i64::from(
    day.weekday().num_days_from_monday()
  );
  let start_idx = i64::from(
    WEEK_START.num_days_from_monday()
  );
  let diff =
    (7 + day_idx - start_idx) % 7;
  day - Duration::days(diff)
}

impl WeekRange {
  #[must_use]
  pub fn containing_instant(
    instant: NaiveDateTime
  ) -> Self {
    week_range(instant.date())
  }

  #[must_use]
  pub fn first_day(&self) -> NaiveDate {
    self.start.date()
  }

  #[must_use]
  pub fn last_day(&self) -> NaiveDate {
    self.end.date()
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = NaiveDate> + use<>
  {
    let first = self.first_day();
    (0_i64..7_i64).map(move |offset| {
      first + Duration::days(offset)
    })
  }

  #[must_use]
  pub fn contains_date(
    &self,
    date: NaiveDate
  ) -> bool {
    self.first_day() <= date
      && date <= self.last_day()
  }

  #[must_use]
  pub fn next(&self) -> Self {
    week_range(
      self.first_day() + Duration::days(7)
    )
  }

  #[must_use]
  pub fn previous(&self) -> Self {
    week_range(
      self.first_day() - Duration::days(7)
    )
  }
}
