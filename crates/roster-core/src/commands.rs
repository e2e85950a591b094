use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::{Config, GridSettings};
use crate::datastore::{DataStore, ItemStore};
use crate::datetime::{parse_date_expr, parse_date_list, parse_weekday_name, to_local};
use crate::filter::Filter;
use crate::grid::{ColorAssignments, build_grid};
use crate::item::{ItemDraft, ItemKind, ItemPatch, ScheduledItem};
use crate::notify::{Notification, Notifier, dispatch as notify_all, send_due_reminders};
use crate::render::Renderer;
use crate::status::{classify, prioritize};
use crate::week::week_range;
use crate::wire::{item_dto, week_grid_dto};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "edit", "delete", "list", "info", "week", "remind", "export", "show", "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Clock readings taken once per invocation.
#[derive(Debug, Clone, Copy)]
struct Clock {
    utc: DateTime<Utc>,
    local: NaiveDateTime,
}

impl Clock {
    fn now() -> Self {
        let utc = Utc::now();
        Self {
            utc,
            local: to_local(utc),
        }
    }

    fn today(&self) -> NaiveDate {
        self.local.date()
    }
}

#[instrument(skip(store, cfg, renderer, notifier, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    notifier: &dyn Notifier,
    caller: Option<&str>,
    inv: Invocation,
) -> anyhow::Result<()> {
    let clock = Clock::now();
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        now = %clock.local,
        "dispatching command"
    );

    match command {
        "add" => cmd_add(store, notifier, caller, &inv.command_args, clock),
        "edit" => cmd_edit(store, notifier, &inv.command_args, clock),
        "delete" => cmd_delete(store, &inv.command_args),
        "list" => cmd_list(store, renderer, caller, &inv.filter_terms, clock),
        "info" => cmd_info(store, renderer, &inv.command_args, clock),
        "week" => cmd_week(
            store,
            cfg,
            renderer,
            &inv.filter_terms,
            &inv.command_args,
            clock,
        ),
        "remind" => cmd_remind(store, notifier, clock),
        "export" => cmd_export(store, &inv.filter_terms, clock),
        "show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, notifier, args, clock))]
fn cmd_add(
    store: &DataStore,
    notifier: &dyn Notifier,
    caller: Option<&str>,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command add");

    let created_by = caller.ok_or_else(|| {
        anyhow!("add: no identity; set user.email in rosterrc or pass --as EMAIL")
    })?;
    let (kind_token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("add: kind is required (duty, event or notice)"))?;
    let kind: ItemKind = kind_token.parse()?;

    let (title, mods) = parse_title_and_mods(rest, clock.today())?;
    let mut draft = ItemDraft::new(kind, title, created_by);
    apply_mods_to_draft(&mut draft, mods);

    let item = ScheduledItem::from_draft(draft, clock.utc)?;
    store.insert(item.clone())?;
    println!("Created {} {}.", item.kind, item.short_id());

    report_notification(notifier, &Notification::assigned(&item), &item.recipients);
    Ok(())
}

#[instrument(skip(store, notifier, args, clock))]
fn cmd_edit(
    store: &DataStore,
    notifier: &dyn Notifier,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command edit");

    let (id_token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("edit: item id is required"))?;
    let mut item = store.resolve(id_token)?;

    let patch = patch_from_mods(parse_mods(rest, clock.today())?);
    if patch.is_empty() {
        return Err(anyhow!("edit: no modifications given"));
    }

    item.apply_patch(patch, clock.utc)
        .with_context(|| format!("edit {} rejected", item.short_id()))?;
    store.update(item.clone())?;
    println!("Modified {} {}.", item.kind, item.short_id());

    report_notification(notifier, &Notification::updated(&item), &item.recipients);
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_delete(store: &DataStore, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    let id_token = args
        .first()
        .ok_or_else(|| anyhow!("delete: item id is required"))?;
    let item = store.resolve(id_token)?;
    match store.delete(item.id)? {
        Some(removed) => println!("Deleted {} {}.", removed.kind, removed.short_id()),
        None => println!("Nothing deleted."),
    }
    Ok(())
}

#[instrument(skip(store, renderer, filter_terms, clock))]
fn cmd_list(
    store: &DataStore,
    renderer: &mut Renderer,
    caller: Option<&str>,
    filter_terms: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command list");

    let filter = Filter::parse(filter_terms)?;
    let items = store.all(&filter)?;
    if items.is_empty() {
        println!("No matching items.");
        return Ok(());
    }

    let rows = prioritize(&items, clock.local, caller);
    renderer.print_item_table(&rows)?;
    println!();
    println!("{} item{}", rows.len(), if rows.len() == 1 { "" } else { "s" });
    Ok(())
}

#[instrument(skip(store, renderer, args, clock))]
fn cmd_info(
    store: &DataStore,
    renderer: &mut Renderer,
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command info");

    let id_token = args
        .first()
        .ok_or_else(|| anyhow!("info: item id is required"))?;
    let item = store.resolve(id_token)?;
    renderer.print_item_info(&item, classify(&item, clock.local))
}

#[instrument(skip(store, cfg, renderer, filter_terms, args, clock))]
fn cmd_week(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    filter_terms: &[String],
    args: &[String],
    clock: Clock,
) -> anyhow::Result<()> {
    info!("command week");

    let mut as_json = false;
    let mut reference = clock.today();
    for arg in args {
        if arg.eq_ignore_ascii_case("json") {
            as_json = true;
        } else {
            reference = week_reference(arg, clock.today())?;
        }
    }

    let week = week_range(reference);
    let filter = Filter::parse(filter_terms)?;
    let items = store.query_in_range(week.start, week.end, &filter)?;
    let settings = GridSettings::from_config(cfg)?;

    let mut colors = ColorAssignments::default();
    let grid = build_grid(
        &items,
        &week,
        settings.range,
        &settings.layout,
        &settings.palette,
        &mut colors,
    );
    debug!(items = items.len(), colors = colors.len(), "week grid built");

    if as_json {
        println!("{}", serde_json::to_string_pretty(&week_grid_dto(&grid))?);
        return Ok(());
    }
    renderer.print_week_grid(&grid)
}

/// Today's own weekday name keeps the current week. Other names and date
/// expressions resolve as they do for `date:`.
fn week_reference(arg: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    if parse_weekday_name(&arg.trim().to_ascii_lowercase()) == Some(today.weekday()) {
        return Ok(today);
    }
    parse_date_expr(arg, today)
}

#[instrument(skip(store, notifier, clock))]
fn cmd_remind(store: &DataStore, notifier: &dyn Notifier, clock: Clock) -> anyhow::Result<()> {
    info!("command remind");

    let items = store.all(&Filter::default())?;
    let mut ledger = store.load_ledger()?;
    let pruned = ledger.prune_before(clock.local);
    if pruned > 0 {
        debug!(pruned, "dropped marks for past occurrences");
    }

    let sweep = send_due_reminders(notifier, &items, clock.local, clock.utc, &mut ledger);
    store.save_ledger(&ledger)?;

    println!(
        "Sent {} reminder(s) for {} item(s); {} failed.",
        sweep.sent, sweep.reminders, sweep.failed
    );
    Ok(())
}

#[instrument(skip(store, filter_terms, clock))]
fn cmd_export(store: &DataStore, filter_terms: &[String], clock: Clock) -> anyhow::Result<()> {
    info!("command export");

    let filter = Filter::parse(filter_terms)?;
    let rows = store
        .all(&filter)?
        .iter()
        .map(|item| item_dto(item, classify(item, clock.local)))
        .collect::<Vec<_>>();

    println!("{}", serde_json::to_string(&rows)?);
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut pairs = cfg.iter().collect::<Vec<_>>();
    pairs.sort();
    for (k, v) in pairs {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: roster [-v|-q] [--rc k=v] [--rosterrc PATH] [--data DIR] [--as EMAIL] [filter...] <command> [args...]

commands:
  add <duty|event|notice> <title...> [date:D[,D]] [start:HH:mm] [end:HH:mm] [allday:yes] [to:a,b] [at:LOC] [desc:TEXT]
  edit <id> <mods...>
  delete <id>
  list
  info <id>
  week [date] [json]
  remind
  export
  show
  help, version

dates: today, tomorrow, yesterday, +Nd, -Nw, YYYY-MM-DD or a weekday name.
  In date: a weekday name is its next occurrence, a week ahead when it names today.
  For week, today's own weekday name shows the current week.

filters: id:PREFIX to:EMAIL by:EMAIL kind:KIND at:LOC dateless TEXT"
    );
    Ok(())
}

fn report_notification(notifier: &dyn Notifier, notification: &Notification, recipients: &[String]) {
    let report = notify_all(notifier, notification, recipients);
    if report.failed.is_empty() {
        println!("Notified {} recipient(s).", report.sent.len());
    } else {
        warn!(failed = ?report.failed, "some recipients were not notified");
        println!(
            "Notified {} of {} recipient(s); failed: {}.",
            report.sent.len(),
            recipients.len(),
            report.failed.join(", ")
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Title(String),
    Description(String),
    Dates(Vec<NaiveDate>),
    Start(String),
    End(String),
    AllDay(bool),
    Recipients(Vec<String>),
    Location(Option<String>),
}

fn parse_title_and_mods(args: &[String], today: NaiveDate) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    let has_title_mod = mods.iter().any(|m| matches!(m, Mod::Title(_)));
    if title_parts.is_empty() && !has_title_mod {
        return Err(anyhow!("add: title is required"));
    }

    Ok((title_parts.join(" "), mods))
}

#[instrument(skip(args, today))]
fn parse_mods(args: &[String], today: NaiveDate) -> anyhow::Result<Vec<Mod>> {
    let mut mods = Vec::new();
    for arg in args {
        if let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
        } else {
            warn!(arg = %arg, "unrecognized modifier token ignored");
        }
    }
    Ok(mods)
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };
    let value = value.trim();

    let one_mod = match key.to_ascii_lowercase().as_str() {
        "title" => Mod::Title(value.to_string()),
        "desc" | "description" => Mod::Description(value.to_string()),
        "date" | "dates" => {
            if value.is_empty() {
                Mod::Dates(vec![])
            } else {
                Mod::Dates(parse_date_list(value, today)?)
            }
        }
        "start" => Mod::Start(value.to_string()),
        "end" => Mod::End(value.to_string()),
        "allday" => Mod::AllDay(parse_flag(value)?),
        "to" => Mod::Recipients(
            value
                .split(',')
                .map(str::trim)
                .filter(|who| !who.is_empty())
                .map(ToString::to_string)
                .collect(),
        ),
        "at" | "location" => Mod::Location(if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }),
        _ => return Ok(None),
    };
    Ok(Some(one_mod))
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "1" | "y" | "yes" | "on" | "true" => Ok(true),
        "0" | "n" | "no" | "off" | "false" => Ok(false),
        other => Err(anyhow!("expected yes or no, got {other:?}")),
    }
}

fn apply_mods_to_draft(draft: &mut ItemDraft, mods: Vec<Mod>) {
    for one_mod in mods {
        match one_mod {
            Mod::Title(title) => draft.title = title,
            Mod::Description(desc) => draft.description = desc,
            Mod::Dates(dates) => draft.dates = dates,
            Mod::Start(start) => draft.start_time = Some(start),
            Mod::End(end) => draft.end_time = Some(end),
            Mod::AllDay(flag) => draft.full_day = flag,
            Mod::Recipients(list) => draft.recipients = list,
            Mod::Location(location) => draft.location = location,
        }
    }
}

fn patch_from_mods(mods: Vec<Mod>) -> ItemPatch {
    let mut patch = ItemPatch::default();
    for one_mod in mods {
        match one_mod {
            Mod::Title(title) => patch.title = Some(title),
            Mod::Description(desc) => patch.description = Some(desc),
            Mod::Dates(dates) => patch.dates = Some(dates),
            Mod::Start(start) => patch.start_time = Some(start),
            Mod::End(end) => patch.end_time = Some(end),
            Mod::AllDay(flag) => patch.full_day = Some(flag),
            Mod::Recipients(list) => patch.recipients = Some(list),
            Mod::Location(location) => patch.location = Some(location),
        }
    }
    patch
}
