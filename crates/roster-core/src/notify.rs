use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::item::ScheduledItem;
use crate::status::{ReminderLedger, ReminderSlot, pending_reminders};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Assigned,
    Updated,
    Reminder,
}

/// A rendered message about one item, independent of who receives it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub item_id: Uuid,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<NaiveDateTime>,
}

impl Notification {
    pub fn assigned(item: &ScheduledItem) -> Self {
        Self {
            kind: NotificationKind::Assigned,
            item_id: item.id,
            subject: format!("New {}: {}", item.kind, item.title),
            body: describe(item),
            occurrence: None,
        }
    }

    pub fn updated(item: &ScheduledItem) -> Self {
        Self {
            kind: NotificationKind::Updated,
            item_id: item.id,
            subject: format!("Updated {}: {}", item.kind, item.title),
            body: describe(item),
            occurrence: None,
        }
    }

    pub fn reminder(item: &ScheduledItem, slot: &ReminderSlot) -> Self {
        Self {
            kind: NotificationKind::Reminder,
            item_id: item.id,
            subject: format!(
                "Reminder: {} starts at {}",
                item.title,
                slot.occurrence.format("%H:%M")
            ),
            body: describe(item),
            occurrence: Some(slot.occurrence),
        }
    }
}

fn describe(item: &ScheduledItem) -> String {
    let mut out = item.title.clone();
    if item.dates.is_empty() {
        out.push_str(" (no date)");
    } else {
        let dates = item
            .dates
            .iter()
            .map(|d| d.format("%a %Y-%m-%d").to_string())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(" on {dates}"));
        match (item.full_day, item.start_time, item.end_time) {
            (true, _, _) => out.push_str(", all day"),
            (false, Some(start), Some(end)) => out.push_str(&format!(", {start}-{end}")),
            _ => {}
        }
    }
    if let Some(location) = &item.location {
        out.push_str(&format!(" at {location}"));
    }
    if !item.description.is_empty() {
        out.push_str("\n\n");
        out.push_str(&item.description);
    }
    out
}

/// Delivery of one message to one address.
pub trait Notifier {
    fn send(&self, notification: &Notification, recipient: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}

/// Sends to every recipient. A failure is logged and does not stop the
/// remaining sends.
#[instrument(skip(notifier, notification, recipients), fields(kind = ?notification.kind, item = %notification.item_id))]
pub fn dispatch(
    notifier: &dyn Notifier,
    notification: &Notification,
    recipients: &[String],
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for recipient in recipients {
        match notifier.send(notification, recipient) {
            Ok(()) => {
                debug!(recipient = %recipient, "notification sent");
                report.sent.push(recipient.clone());
            }
            Err(err) => {
                warn!(recipient = %recipient, error = %format!("{err:#}"), "notification failed");
                report.failed.push(recipient.clone());
            }
        }
    }
    report
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderSweep {
    pub reminders: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Sends every reminder due at `now` that the ledger has not recorded, and
/// records the successful sends. Failed recipients stay pending.
#[instrument(skip_all, fields(now = %now))]
pub fn send_due_reminders(
    notifier: &dyn Notifier,
    items: &[ScheduledItem],
    now: NaiveDateTime,
    sent_at: DateTime<Utc>,
    ledger: &mut ReminderLedger,
) -> ReminderSweep {
    let mut sweep = ReminderSweep::default();
    for pending in pending_reminders(items, now, ledger) {
        let Some(item) = items.iter().find(|item| item.id == pending.slot.item_id) else {
            continue;
        };
        let notification = Notification::reminder(item, &pending.slot);
        let report = dispatch(notifier, &notification, &pending.recipients);
        for recipient in &report.sent {
            ledger.mark(&pending.slot, recipient, sent_at);
        }
        sweep.reminders += 1;
        sweep.sent += report.sent.len();
        sweep.failed += report.failed.len();
    }
    info!(
        reminders = sweep.reminders,
        sent = sweep.sent,
        failed = sweep.failed,
        "reminder sweep finished"
    );
    sweep
}

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);
const HOOK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Hands notifications to executable `on-notify.*` scripts in the hooks
/// directory, one JSON line on stdin per send. With no scripts installed the
/// message is only logged.
///
/// Each script is killed once `hooks.timeout` seconds pass. A send counts as
/// delivered when at least one script accepts it.
#[derive(Debug, Clone)]
pub struct HookNotifier {
    enabled: bool,
    hooks_dir: PathBuf,
    timeout: Duration,
}

#[derive(Serialize)]
struct HookPayload<'a> {
    recipient: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl HookNotifier {
    pub fn new(cfg: &Config, data_dir: &Path) -> Self {
        let enabled = cfg.get_bool("hooks").unwrap_or(true);
        let hooks_dir = data_dir.join("hooks");
        let timeout = match cfg.get_u32("hooks.timeout") {
            Ok(Some(secs)) => Duration::from_secs(u64::from(secs.max(1))),
            Ok(None) => DEFAULT_HOOK_TIMEOUT,
            Err(err) => {
                warn!(error = %err, "ignoring invalid hooks.timeout");
                DEFAULT_HOOK_TIMEOUT
            }
        };
        debug!(
            enabled,
            hooks_dir = %hooks_dir.display(),
            timeout_secs = timeout.as_secs(),
            "initialized notification hooks"
        );
        Self {
            enabled,
            hooks_dir,
            timeout,
        }
    }

    #[instrument(skip(self))]
    fn list_scripts(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.enabled || !self.hooks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&self.hooks_dir)
            .with_context(|| format!("failed to read hooks dir {}", self.hooks_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with("on-notify.") {
                continue;
            }

            if !is_executable(&path)? {
                debug!(path = %path.display(), "skipping non-executable hook");
                continue;
            }

            scripts.push(path);
        }

        scripts.sort();
        Ok(scripts)
    }
}

impl Notifier for HookNotifier {
    fn send(&self, notification: &Notification, recipient: &str) -> anyhow::Result<()> {
        let scripts = self.list_scripts()?;
        if scripts.is_empty() {
            info!(
                recipient,
                subject = %notification.subject,
                "notification (no delivery hook installed)"
            );
            return Ok(());
        }

        let payload = serde_json::to_string(&HookPayload {
            recipient,
            notification,
        })?;

        let mut delivered = 0usize;
        let mut errors = Vec::new();
        for script in &scripts {
            match run_hook_with_line(script, &payload, self.timeout) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        hook = %script.display(),
                        recipient,
                        error = %err,
                        "notify hook failed"
                    );
                    errors.push(format!("{err:#}"));
                }
            }
        }

        if delivered == 0 {
            return Err(anyhow!(
                "no notify hook accepted the message for {recipient}: {}",
                errors.join("; ")
            ));
        }
        debug!(recipient, delivered, failed = errors.len(), "notification delivered");
        Ok(())
    }
}

fn run_hook_with_line(path: &Path, line: &str, timeout: Duration) -> anyhow::Result<()> {
    info!(hook = %path.display(), "running notify hook");
    let mut child = Command::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to run hook {}", path.display()))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = writeln!(stdin, "{line}") {
            debug!(hook = %path.display(), error = %err, "hook did not read its payload");
        }
    }

    let Some(status) = wait_with_deadline(&mut child, timeout)
        .with_context(|| format!("failed to wait for hook {}", path.display()))?
    else {
        if let Err(err) = child.kill().and_then(|()| child.wait().map(drop)) {
            warn!(hook = %path.display(), error = %err, "failed to stop timed out hook");
        }
        return Err(anyhow!(
            "notify hook {} timed out after {}s",
            path.display(),
            timeout.as_secs()
        ));
    };

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)
            .with_context(|| format!("failed to read stderr of hook {}", path.display()))?;
    }
    let stderr = stderr.trim();

    if !status.success() {
        return Err(anyhow!(
            "notify hook {} failed with status {}: {}",
            path.display(),
            status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            stderr
        ));
    }
    if !stderr.is_empty() {
        warn!(hook = %path.display(), stderr = %stderr, "hook wrote stderr");
    }

    Ok(())
}

/// Polls the child until it exits or `timeout` passes. `None` means the
/// deadline was reached with the child still running.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(HOOK_POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    Ok(path.is_file())
}
