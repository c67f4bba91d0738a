//! Keystroke stream decoding.
//!
//! A keyboard-emulating RFID reader delivers tag IDs as a burst of
//! single-character key events followed by a terminator (Enter). The
//! [`KeystrokeDecoder`] reconstructs discrete candidate strings from that
//! stream using an inactivity timeout and a length bound. It knows
//! nothing about persistence or duplicates; format filtering is the
//! validator's job downstream.
//!
//! The decoder is single-owner: one instance per physical reader, fed
//! events in strict arrival order. Time is passed in explicitly so the
//! state machine is deterministic under test.

use std::time::{Duration, Instant};

use crate::config::ScanConfig;

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No partial scan buffered.
    Idle,
    /// Characters accumulated, awaiting more input or a terminator.
    Accumulating,
}

/// State machine turning raw key events into candidate tag strings.
pub struct KeystrokeDecoder {
    buffer: String,
    last_input: Option<Instant>,
    input_timeout: Duration,
    max_buffer_length: usize,
}

impl KeystrokeDecoder {
    /// Creates a decoder with explicit timing and length bounds.
    #[must_use]
    pub const fn new(input_timeout: Duration, max_buffer_length: usize) -> Self {
        Self {
            buffer: String::new(),
            last_input: None,
            input_timeout,
            max_buffer_length,
        }
    }

    /// Creates a decoder from the shared configuration.
    #[must_use]
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.input_timeout, config.max_buffer_length)
    }

    /// Returns the current state, derived from the buffer.
    #[must_use]
    pub fn state(&self) -> DecoderState {
        if self.buffer.is_empty() {
            DecoderState::Idle
        } else {
            DecoderState::Accumulating
        }
    }

    /// Returns the current buffer contents.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Handles a single character event.
    ///
    /// If the gap since the previous character exceeds the inactivity
    /// timeout, the stale buffer is discarded first; the decoder
    /// self-heals from abandoned partial scans without outside help.
    /// The character is upper-cased and appended. When the buffer would
    /// exceed its length bound, the oldest characters are dropped so the
    /// most recent terminator-aligned data survives.
    ///
    /// Characters outside the tag alphabet are accepted here and fail
    /// validation downstream.
    pub fn handle_char(&mut self, c: char, now: Instant) {
        if let Some(last) = self.last_input {
            if !self.buffer.is_empty() && now.duration_since(last) > self.input_timeout {
                tracing::debug!(discarded = %self.buffer, "Discarding stale scan buffer");
                self.buffer.clear();
            }
        }

        self.buffer.push(c.to_ascii_uppercase());
        while self.buffer.chars().count() > self.max_buffer_length {
            self.buffer.remove(0);
        }
        self.last_input = Some(now);
    }

    /// Handles a terminator event.
    ///
    /// Returns the trimmed candidate and resets the buffer. An empty
    /// buffer (or one holding only whitespace) is a no-op and returns
    /// `None`; a flood of bare Enter presses is not an error.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let candidate = self.buffer.trim().to_string();
        self.buffer.clear();
        self.last_input = None;
        if candidate.is_empty() {
            None
        } else {
            Some(candidate)
        }
    }

    /// Clears the buffer manually, returning the discarded content.
    pub fn clear(&mut self) -> String {
        self.last_input = None;
        std::mem::take(&mut self.buffer)
    }

    /// Updates timing and length bounds from the shared configuration.
    ///
    /// Takes effect for subsequent events; the current buffer is kept.
    pub fn apply_config(&mut self, config: &ScanConfig) {
        self.input_timeout = config.input_timeout;
        self.max_buffer_length = config.max_buffer_length;
        while self.buffer.chars().count() > self.max_buffer_length {
            self.buffer.remove(0);
        }
    }
}
