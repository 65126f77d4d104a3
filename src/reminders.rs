//! Daily reminders
//!
//! A coarse timer re-checks the schedule every [`CHECK_INTERVAL`]. Each
//! (date, HH:MM) slot fires at most once, however many checks land in it.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ReminderConfig};
use crate::speech::Speaker;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub time: NaiveTime,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    date: NaiveDate,
    hour: u32,
    minute: u32,
}

impl Slot {
    fn of(now: NaiveDateTime) -> Self {
        Self {
            date: now.date(),
            hour: now.hour(),
            minute: now.minute(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReminderSchedule {
    reminders: Vec<Reminder>,
    last_fired: Option<Slot>,
}

impl ReminderSchedule {
    pub fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            reminders,
            last_fired: None,
        }
    }

    pub fn from_config(configs: &[ReminderConfig]) -> Result<Self, ConfigError> {
        let reminders = configs
            .iter()
            .map(|c| {
                Ok(Reminder {
                    time: c.parsed_time()?,
                    message: c.message.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self::new(reminders))
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    /// Messages due in the minute containing `now`, unless that minute has
    /// already fired
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<String> {
        let slot = Slot::of(now);
        if self.last_fired == Some(slot) {
            return Vec::new();
        }

        let due: Vec<String> = self
            .reminders
            .iter()
            .filter(|r| r.time.hour() == slot.hour && r.time.minute() == slot.minute)
            .map(|r| r.message.clone())
            .collect();

        if !due.is_empty() {
            self.last_fired = Some(slot);
        }
        due
    }
}

/// Speak due reminders until cancelled
pub async fn run(mut schedule: ReminderSchedule, speaker: Arc<Speaker>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(count = schedule.reminders().len(), "⏰ Reminders scheduled");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for message in schedule.due(Local::now().naive_local()) {
            tracing::info!(%message, "Reminder due");
            if let Err(e) = speaker.speak(&message).await {
                tracing::warn!(error = %e, "Failed to speak reminder");
            }
        }
    }
    tracing::debug!("Reminder loop stopped");
}
