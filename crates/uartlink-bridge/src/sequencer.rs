use std::time::Instant;

use uartlink_transport::{Level, McuPins};

use crate::config::ResetTiming;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Idle,
    /// Reset is low, ISP goes low next.
    EntryReset,
    /// ISP is low, reset goes high next.
    EntryIsp,
    /// Reset released, waiting for the bootloader to come up.
    EntrySettle,
    /// Release pulse: reset is low, goes high next.
    ReleaseReset,
}

/// Timed pin sequence that puts the MCU into its bootloader, and the pulse
/// that takes it back out.
///
/// Entry: reset low, ISP low, reset high, settle. Release: ISP high, reset
/// low, reset high. The sequencer never sleeps; the caller polls it at
/// [`deadline`](Self::deadline).
#[derive(Debug)]
pub struct ResetSequencer {
    timing: ResetTiming,
    step: Step,
    deadline: Option<Instant>,
}

impl ResetSequencer {
    pub fn new(timing: ResetTiming) -> Self {
        Self {
            timing,
            step: Step::Idle,
            deadline: None,
        }
    }

    /// Begin the bootloader entry sequence.
    pub fn start<P: McuPins + ?Sized>(&mut self, pins: &mut P, now: Instant) {
        tracing::debug!("bootloader entry: reset low");
        drive(pins.set_reset(Level::Low), "reset");
        self.step = Step::EntryReset;
        self.deadline = Some(now + self.timing.reset_hold);
    }

    /// Begin the release pulse, abandoning any entry in progress.
    pub fn release<P: McuPins + ?Sized>(&mut self, pins: &mut P, now: Instant) {
        tracing::debug!("bootloader release: isp high, reset pulse");
        drive(pins.set_isp(Level::High), "isp");
        drive(pins.set_reset(Level::Low), "reset");
        self.step = Step::ReleaseReset;
        self.deadline = Some(now + self.timing.reset_hold);
    }

    /// Advance through every step whose deadline has passed.
    ///
    /// Returns `true` exactly once, when the entry sequence finishes.
    pub fn poll<P: McuPins + ?Sized>(&mut self, pins: &mut P, now: Instant) -> bool {
        while let Some(deadline) = self.deadline {
            if now < deadline {
                return false;
            }
            match self.step {
                Step::EntryReset => {
                    drive(pins.set_isp(Level::Low), "isp");
                    self.step = Step::EntryIsp;
                    self.deadline = Some(deadline + self.timing.isp_hold);
                }
                Step::EntryIsp => {
                    drive(pins.set_reset(Level::High), "reset");
                    self.step = Step::EntrySettle;
                    self.deadline = Some(deadline + self.timing.settle);
                }
                Step::EntrySettle => {
                    tracing::debug!("bootloader entry complete");
                    self.finish();
                    return true;
                }
                Step::ReleaseReset => {
                    drive(pins.set_reset(Level::High), "reset");
                    self.finish();
                }
                Step::Idle => self.finish(),
            }
        }
        false
    }

    pub fn is_busy(&self) -> bool {
        self.step != Step::Idle
    }

    /// Bootloader entry is underway (bytes must be held back).
    pub fn is_entering(&self) -> bool {
        matches!(
            self.step,
            Step::EntryReset | Step::EntryIsp | Step::EntrySettle
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn finish(&mut self) {
        self.step = Step::Idle;
        self.deadline = None;
    }
}

fn drive(result: uartlink_transport::Result<()>, pin: &'static str) {
    if let Err(err) = result {
        tracing::warn!(error = %err, pin, "pin change failed");
    }
}
