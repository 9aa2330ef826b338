//! Cron schedule evaluation and the manual "backup now" trigger

use crate::config::ConfigError;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Flag file that requests a backup at the next scheduler tick
pub const TRIGGER_FILE_NAME: &str = "backup-now";

/// Set of allowed values for one cron field, as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }
}

/// A five-field cron expression: minute hour day-of-month month day-of-week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        let minutes = parse_field(fields[0], 0, 59).map_err(|e| invalid(format!("minute: {}", e)))?;
        let hours = parse_field(fields[1], 0, 23).map_err(|e| invalid(format!("hour: {}", e)))?;
        let days_of_month =
            parse_field(fields[2], 1, 31).map_err(|e| invalid(format!("day of month: {}", e)))?;
        let months = parse_field(fields[3], 1, 12).map_err(|e| invalid(format!("month: {}", e)))?;
        let mut days_of_week =
            parse_field(fields[4], 0, 7).map_err(|e| invalid(format!("day of week: {}", e)))?;

        // 7 is another name for Sunday
        if days_of_week.contains(7) {
            days_of_week.0 = (days_of_week.0 & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// True if the schedule fires in the minute containing `at`
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        if !self.minutes.contains(at.minute())
            || !self.hours.contains(at.hour())
            || !self.months.contains(at.month())
        {
            return false;
        }

        let dom = self.days_of_month.contains(at.day());
        let dow = self.days_of_week.contains(at.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted either may match
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Start of the first matching minute strictly after `after`, within a year
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start = after.clone().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        (0..366 * 24 * 60)
            .map(|offset| start.clone() + Duration::minutes(offset))
            .find(|candidate| self.matches(candidate))
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<FieldSet, String> {
    let mut set = 0u64;

    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step must be greater than zero".to_string());
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let value = parse_value(range, min, max)?;
            // `5/15` runs from 5 to the end of the range
            (value, if step.is_some() { max } else { value })
        };

        if start > end {
            return Err(format!("range {}-{} is reversed", start, end));
        }

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            set |= 1u64 << value;
        }
    }

    Ok(FieldSet(set))
}

fn parse_value(text: &str, min: u32, max: u32) -> std::result::Result<u32, String> {
    let value: u32 = text
        .trim()
        .parse()
        .map_err(|_| format!("invalid value '{}'", text))?;
    if value < min || value > max {
        return Err(format!("{} is outside {}-{}", value, min, max));
    }
    Ok(value)
}

/// Flag file that asks a running daemon for an immediate backup
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    path: PathBuf,
}

impl ManualTrigger {
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            path: temp_dir.join(TRIGGER_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request a backup
    pub fn fire(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        fs::write(&self.path, chrono::Utc::now().to_rfc3339())
            .with_context(|| format!("Failed to create trigger file {:?}", self.path))?;
        info!("Backup requested via {:?}", self.path);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    /// Consume a pending request
    pub fn take(&self) -> bool {
        self.is_pending() && fs::remove_file(&self.path).is_ok()
    }
}

/// Decides, once per tick, whether a backup is due
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: CronSchedule,
    trigger: Option<ManualTrigger>,
    last_run_minute: Option<i64>,
}

impl Scheduler {
    pub fn new(schedule: CronSchedule, trigger: Option<ManualTrigger>) -> Self {
        Self {
            schedule,
            trigger,
            last_run_minute: None,
        }
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// True when the schedule matches `now` or a manual trigger is pending.
    ///
    /// Returns true at most once per minute; a trigger arriving in a minute
    /// that already ran stays pending for the next one.
    pub fn should_run<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let minute = now.timestamp().div_euclid(60);
        if self.last_run_minute == Some(minute) {
            return false;
        }

        let due = self.schedule.matches(now);
        let triggered = self.trigger.as_ref().is_some_and(ManualTrigger::take);
        if triggered {
            debug!("Manual trigger consumed");
        }

        if due || triggered {
            self.last_run_minute = Some(minute);
            return true;
        }
        false
    }
}
