use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::grid::WeekGrid;
use crate::item::ScheduledItem;
use crate::status::{Classified, StatusLabel};

const GRID_CELL_WIDTH: usize = 14;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_item_table(&mut self, rows: &[Classified<'_>]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_item_table(&mut out, rows)
    }

    fn write_item_table<W: Write>(&self, out: W, rows: &[Classified<'_>]) -> anyhow::Result<()> {
        let headers = ["ID", "Status", "Kind", "When", "Title", "To"]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let rows = rows
            .iter()
            .map(|entry| {
                let item = entry.item;
                let when = entry
                    .effective_start
                    .map(|start| when_label(item, start.date()))
                    .unwrap_or_else(|| "-".to_string());
                vec![
                    self.paint(&item.short_id(), "33"),
                    self.status_badge(entry.status),
                    item.kind.to_string(),
                    when,
                    item.title.clone(),
                    item.recipients.join(", "),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, item))]
    pub fn print_item_info(
        &mut self,
        item: &ScheduledItem,
        status: Option<StatusLabel>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", item.id)?;
        writeln!(out, "kind      {}", item.kind)?;
        writeln!(out, "title     {}", item.title)?;
        writeln!(out, "status    {}", self.status_badge(status))?;
        if !item.description.is_empty() {
            writeln!(out, "desc      {}", item.description)?;
        }
        if item.dates.is_empty() {
            writeln!(out, "dates     -")?;
        } else {
            let dates = item
                .dates
                .iter()
                .map(|d| d.format("%a %Y-%m-%d").to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "dates     {dates}")?;
        }
        writeln!(out, "time      {}", span_label(item))?;
        writeln!(
            out,
            "location  {}",
            item.location.clone().unwrap_or_default()
        )?;
        writeln!(out, "to        {}", item.recipients.join(", "))?;
        writeln!(out, "by        {}", item.created_by)?;
        writeln!(out, "entry     {}", item.entry.format("%Y%m%dT%H%M%SZ"))?;
        writeln!(out, "modified  {}", item.modified.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self, grid))]
    pub fn print_week_grid(&mut self, grid: &WeekGrid) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "Week of {} to {}",
            grid.week.first_day().format("%Y-%m-%d"),
            grid.week.last_day().format("%Y-%m-%d")
        )?;
        self.write_week_grid(&mut out, grid)
    }

    /// One row per lane and day; a cell shows the title of the item holding
    /// that lane during the hour, `~` marking a partial hour.
    fn write_week_grid<W: Write>(&self, out: W, grid: &WeekGrid) -> anyhow::Result<()> {
        let mut headers = vec!["Day".to_string()];
        headers.extend(grid.range.hours().map(|hour| format!("{hour:02}:00")));

        let mut rows = Vec::new();
        for day in &grid.days {
            let lanes = day.lane_count.max(1);
            for lane in 0..lanes {
                let mut row = Vec::with_capacity(headers.len());
                row.push(if lane == 0 {
                    day.date.format("%a %m-%d").to_string()
                } else {
                    String::new()
                });

                for cell in &day.hours {
                    let text = cell
                        .items
                        .iter()
                        .find(|placed| placed.level == lane)
                        .map(|placed| {
                            let marker = if placed.width_percent < 100.0 { "~" } else { "" };
                            let label = truncate_to_width(
                                &format!("{marker}{}", placed.title),
                                GRID_CELL_WIDTH,
                            );
                            self.paint_hex(&label, &placed.color)
                        })
                        .unwrap_or_default();
                    row.push(text);
                }
                rows.push(row);
            }
        }

        write_table(out, headers, rows)
    }

    fn status_badge(&self, status: Option<StatusLabel>) -> String {
        let Some(status) = status else {
            return "-".to_string();
        };
        let code = match status {
            StatusLabel::Expired => "90",
            StatusLabel::Urgent => "1;31",
            StatusLabel::Ongoing => "32",
            StatusLabel::Today => "33",
            StatusLabel::Upcoming => "36",
            StatusLabel::Future => "37",
        };
        self.paint(status.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_hex(&self, text: &str, hex: &str) -> String {
        match parse_hex(hex) {
            Some((r, g, b)) => self.paint(text, &format!("38;2;{r};{g};{b}")),
            None => text.to_string(),
        }
    }
}

fn when_label(item: &ScheduledItem, date: NaiveDate) -> String {
    let mut label = format!("{} {}", date.format("%a %m-%d"), span_label(item));
    if item.dates.len() > 1 {
        label.push_str(&format!(" (+{})", item.dates.len() - 1));
    }
    label
}

fn span_label(item: &ScheduledItem) -> String {
    match (item.full_day, item.start_time, item.end_time) {
        (true, _, _) => "all day".to_string(),
        (false, Some(start), Some(end)) => format!("{start}-{end}"),
        _ => "-".to_string(),
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if UnicodeWidthStr::width(text) <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = row.get(idx).map(String::as_str).unwrap_or("");
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
