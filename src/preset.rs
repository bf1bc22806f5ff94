use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

use crate::console::{Console, SendOutcome};

pub const ABORT_NOTICE: &str = "Preset run aborted. Toggling pins.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("Must set preset time as a number (seconds).")]
    InvalidInterval(String),
}

/// The four operator fields that define a preset run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetFields {
    pub interval: String,
    pub pins: String,
    pub test_name: String,
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetJob {
    pub interval_secs: u64,
    pub fields: PresetFields,
}

/// Result of leaving the armed state, either on the deadline or on cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetOutcome {
    pub job: PresetJob,
    pub cancelled: bool,
    /// Outgoing half of the second toggle.
    pub send: SendOutcome,
}

/// Whole seconds, surrounding whitespace allowed. Zero fires on the next poll.
pub fn parse_interval(text: &str) -> Result<u64, PresetError> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| PresetError::InvalidInterval(text.to_string()))
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Armed {
        job: PresetJob,
        deadline: Instant,
    },
}

/// Toggle, wait, toggle. The wait is a deadline checked by the event loop.
#[derive(Debug, Default)]
pub struct PresetSequencer {
    state: State,
}

impl PresetSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// While armed, the defining fields are read-only.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed { .. })
    }

    pub fn job(&self) -> Option<&PresetJob> {
        match &self.state {
            State::Armed { job, .. } => Some(job),
            State::Idle => None,
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            State::Armed { deadline, .. } => Some(deadline.saturating_duration_since(now)),
            State::Idle => None,
        }
    }

    /// Validate the interval, send the first toggle and arm the deadline.
    ///
    /// There is no guard against starting while armed; the caller locks the
    /// fields instead.
    pub fn start(
        &mut self,
        fields: &PresetFields,
        now: Instant,
        console: &mut Console,
    ) -> Result<SendOutcome, PresetError> {
        let interval_secs = parse_interval(&fields.interval)?;
        // Resolve the deadline before anything goes on the wire.
        let deadline = now
            .checked_add(Duration::from_secs(interval_secs))
            .ok_or_else(|| PresetError::InvalidInterval(fields.interval.clone()))?;
        let outcome = console.exchange(&fields.pins);
        info!("preset armed: pins {:?}, {interval_secs}s", fields.pins);
        self.state = State::Armed {
            job: PresetJob {
                interval_secs,
                fields: fields.clone(),
            },
            deadline,
        };
        Ok(outcome)
    }

    /// Fire the second toggle once the deadline has passed.
    pub fn poll(&mut self, now: Instant, console: &mut Console) -> Option<PresetOutcome> {
        match &self.state {
            State::Armed { deadline, .. } if now >= *deadline => self.finish(console, false),
            _ => None,
        }
    }

    /// Abort an armed run. The pins are still toggled back.
    pub fn cancel(&mut self, console: &mut Console) -> Option<PresetOutcome> {
        if !self.is_armed() {
            return None;
        }
        console.transcript_mut().record(ABORT_NOTICE);
        self.finish(console, true)
    }

    /// Shared tail of completion and cancel: second toggle, then back to idle.
    fn finish(&mut self, console: &mut Console, cancelled: bool) -> Option<PresetOutcome> {
        let State::Armed { job, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        let send = console.exchange(&job.fields.pins);
        info!("preset finished (cancelled: {cancelled})");
        Some(PresetOutcome {
            job,
            cancelled,
            send,
        })
    }
}
