use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike
};
use regex::Regex;
use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer
};

use crate::item::ValidationError;

pub const MINUTES_PER_DAY: u32 = 1_440;

/// A time of day with minute precision,
/// written as `HH:mm`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
  #[must_use]
  pub fn from_hm(
    hour: u32,
    minute: u32
  ) -> Option<Self> {
    NaiveTime::from_hms_opt(
      hour, minute, 0
    )
    .map(Self)
  }

  #[must_use]
  pub fn as_naive(self) -> NaiveTime {
    self.0
  }

  #[must_use]
  pub fn minute_of_day(self) -> u32 {
    self.0.hour() * 60 + self.0.minute()
  }
}

impl FromStr for ClockTime {
  type Err = ValidationError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    parse_hhmm(s)
      .and_then(|(hour, minute)| {
        Self::from_hm(hour, minute)
      })
      .ok_or_else(|| {
        ValidationError::MalformedTime(
          s.to_string()
        )
      })
  }
}

impl fmt::Display for ClockTime {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}", self.0.format("%H:%M"))
  }
}

impl Serialize for ClockTime {
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer
      .serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for ClockTime {
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    raw
      .parse()
      .map_err(serde::de::Error::custom)
  }
}

fn hhmm_regex()
-> Option<&'static Regex> {
  static HHMM_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  HHMM_RE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<hour>\d{2}):(?P<minute>\d{2})$"
      )
      .ok()
    })
    .as_ref()
}

fn parse_hhmm(
  raw: &str
) -> Option<(u32, u32)> {
  let caps =
    hhmm_regex()?.captures(raw.trim())?;
  let hour = caps
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = caps
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if hour > 23 || minute > 59 {
    return None;
  }
  Some((hour, minute))
}

#[must_use]
pub fn start_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// 23:59:59.999 on `date`.
#[must_use]
pub fn end_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  start_of_day(date) + Duration::days(1)
    - Duration::milliseconds(1)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DaySpan {
  FullDay,
  Timed {
    start: ClockTime,
    end:   ClockTime
  }
}

impl DaySpan {
  /// Half-open minute interval covered on
  /// the day, `[0, 1440)` for a full day.
  #[must_use]
  pub fn minutes(self) -> (u32, u32) {
    match self {
      | Self::FullDay => {
        (0, MINUTES_PER_DAY)
      }
      | Self::Timed {
        start,
        end
      } => {
        (
          start.minute_of_day(),
          end.minute_of_day()
        )
      }
    }
  }
}

/// One calendar day of a scheduled item.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct TimeWindow {
  pub date: NaiveDate,
  pub span: DaySpan
}

impl TimeWindow {
  pub fn timed(
    date: NaiveDate,
    start: ClockTime,
    end: ClockTime
  ) -> Result<Self, ValidationError> {
    if start >= end {
      return Err(
        ValidationError::EmptyWindow {
          start: start.to_string(),
          end:   end.to_string()
        }
      );
    }
    Ok(Self {
      date,
      span: DaySpan::Timed {
        start,
        end
      }
    })
  }

  #[must_use]
  pub fn full_day(
    date: NaiveDate
  ) -> Self {
    Self {
      date,
      span: DaySpan::FullDay
    }
  }

  #[must_use]
  pub fn is_full_day(&self) -> bool {
    matches!(self.span, DaySpan::FullDay)
  }

  #[must_use]
  pub fn start_minute(&self) -> u32 {
    self.span.minutes().0
  }

  #[must_use]
  pub fn end_minute(&self) -> u32 {
    self.span.minutes().1
  }

  #[must_use]
  pub fn effective_start(
    &self
  ) -> NaiveDateTime {
    match self.span {
      | DaySpan::FullDay => {
        start_of_day(self.date)
      }
      | DaySpan::Timed {
        start, ..
      } => {
        self
          .date
          .and_time(start.as_naive())
      }
    }
  }

  #[must_use]
  pub fn effective_end(
    &self
  ) -> NaiveDateTime {
    match self.span {
      | DaySpan::FullDay => {
        end_of_day(self.date)
      }
      | DaySpan::Timed {
        end, ..
      } => {
        self.date.and_time(end.as_naive())
      }
    }
  }

  /// Closed-interval containment of an
  /// instant.
  #[must_use]
  pub fn contains(
    &self,
    instant: NaiveDateTime
  ) -> bool {
    self.effective_start() <= instant
      && instant <= self.effective_end()
  }

  #[must_use]
  pub fn intersects(
    &self,
    from_minute: u32,
    to_minute: u32
  ) -> bool {
    self.start_minute() < to_minute
      && self.end_minute() > from_minute
  }

  #[must_use]
  pub fn overlaps(
    &self,
    other: &TimeWindow
  ) -> bool {
    self.date == other.date
      && self.intersects(
        other.start_minute(),
        other.end_minute()
      )
  }
}
