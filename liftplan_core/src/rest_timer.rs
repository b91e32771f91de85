//! Single-slot rest countdown.
//!
//! At most one countdown exists at a time: starting a new one replaces the
//! previous one. When the countdown reaches zero the alert is fired through an
//! [`AlertSink`] and the slot is cleared. Stopping never fires the alert.

use serde::Serialize;

/// Preset used until a start call supplies its own duration
pub const DEFAULT_REST_SECONDS: u32 = 90;

/// Vibration pattern fired on expiry (on, off, on, off, on) in milliseconds
pub const VIBRATION_PATTERN_MS: [u32; 5] = [200, 100, 200, 100, 300];

/// One synthesized tone of the expiry chime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Tone {
    pub frequency_hz: u32,
    /// Offset from the start of the chime
    pub start_ms: u32,
    pub duration_ms: u32,
}

/// Three-tone chime: two short 880 Hz beeps then a longer 1320 Hz tone
pub const REST_CHIME: [Tone; 3] = [
    Tone {
        frequency_hz: 880,
        start_ms: 0,
        duration_ms: 150,
    },
    Tone {
        frequency_hz: 880,
        start_ms: 200,
        duration_ms: 150,
    },
    Tone {
        frequency_hz: 1320,
        start_ms: 400,
        duration_ms: 300,
    },
];

/// Device side effects for rest expiry
pub trait AlertSink {
    fn vibrate(&mut self, pattern_ms: &[u32]);
    fn play_tones(&mut self, tones: &[Tone]);
}

/// Sink that only logs, for headless use
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn vibrate(&mut self, pattern_ms: &[u32]) {
        tracing::info!("Rest alert vibration {:?}", pattern_ms);
    }

    fn play_tones(&mut self, tones: &[Tone]) {
        let freqs: Vec<u32> = tones.iter().map(|t| t.frequency_hz).collect();
        tracing::info!("Rest alert chime {:?} Hz", freqs);
    }
}

/// Snapshot of the rest timer for rendering
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestTimerState {
    pub active: bool,
    pub seconds_remaining: u32,
    pub preset_seconds: u32,
    pub after_set_id: Option<String>,
}

/// Result of advancing the countdown by one second
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestTick {
    Idle,
    Counting { seconds_remaining: u32 },
    Expired { after_set_id: String },
}

#[derive(Clone, Debug)]
struct Countdown {
    after_set_id: String,
    seconds_remaining: u32,
}

/// The process-wide rest timer register
#[derive(Debug)]
pub struct RestTimer {
    slot: Option<Countdown>,
    preset_seconds: u32,
}

impl Default for RestTimer {
    fn default() -> Self {
        Self::new(DEFAULT_REST_SECONDS)
    }
}

impl RestTimer {
    pub fn new(preset_seconds: u32) -> Self {
        Self {
            slot: None,
            preset_seconds,
        }
    }

    /// Start a countdown, cancelling any running one
    ///
    /// An explicit duration also becomes the preset for later starts.
    pub fn start(&mut self, after_set_id: &str, seconds: Option<u32>) -> RestTimerState {
        if let Some(previous) = self.slot.take() {
            tracing::debug!(
                "Rest countdown after set {} replaced with {}s left",
                previous.after_set_id,
                previous.seconds_remaining
            );
        }
        if let Some(seconds) = seconds {
            self.preset_seconds = seconds;
        }
        self.slot = Some(Countdown {
            after_set_id: after_set_id.to_string(),
            seconds_remaining: self.preset_seconds,
        });
        tracing::debug!(
            "Rest countdown started after set {} ({}s)",
            after_set_id,
            self.preset_seconds
        );
        self.state()
    }

    /// Cancel without alerting; returns whether a countdown was running
    pub fn stop(&mut self) -> bool {
        match self.slot.take() {
            Some(countdown) => {
                tracing::debug!("Rest countdown after set {} stopped", countdown.after_set_id);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self, alerts: &mut dyn AlertSink) -> RestTick {
        let Some(countdown) = self.slot.as_mut() else {
            return RestTick::Idle;
        };

        countdown.seconds_remaining = countdown.seconds_remaining.saturating_sub(1);
        if countdown.seconds_remaining > 0 {
            return RestTick::Counting {
                seconds_remaining: countdown.seconds_remaining,
            };
        }

        let after_set_id = countdown.after_set_id.clone();
        self.slot = None;
        alerts.vibrate(&VIBRATION_PATTERN_MS);
        alerts.play_tones(&REST_CHIME);
        tracing::info!("Rest over after set {}", after_set_id);
        RestTick::Expired { after_set_id }
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    pub fn preset_seconds(&self) -> u32 {
        self.preset_seconds
    }

    pub fn state(&self) -> RestTimerState {
        match &self.slot {
            Some(countdown) => RestTimerState {
                active: true,
                seconds_remaining: countdown.seconds_remaining,
                preset_seconds: self.preset_seconds,
                after_set_id: Some(countdown.after_set_id.clone()),
            },
            None => RestTimerState {
                active: false,
                seconds_remaining: 0,
                preset_seconds: self.preset_seconds,
                after_set_id: None,
            },
        }
    }
}
