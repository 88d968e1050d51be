//! Platform traits: clock, system control, LED and display indicators
//!
//! These are the remaining seams to the board support code. The core never
//! touches a register; it asks the platform for time, sleep and pixels.

/// Monotonic millisecond clock with a blocking delay
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn delay_ms(&mut self, ms: u32);
}

/// Reset/sleep control surfaced by the platform
pub trait System {
    /// Cause of the most recent reset, latched at boot
    fn reset_cause(&self) -> ResetCause;

    /// Enter deep sleep; wake-up is a fresh boot
    fn deep_sleep(&mut self, seconds: u32) -> !;
}

/// Reset cause latched by the boot handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetCause {
    #[default]
    Unknown,
    PowerOn,
    Software,
    DeepSleepWake,
    Watchdog,
    Brownout,
}

impl ResetCause {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::PowerOn,
            2 => Self::Software,
            3 => Self::DeepSleepWake,
            4 => Self::Watchdog,
            5 => Self::Brownout,
            _ => Self::Unknown,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::PowerOn => 1,
            Self::Software => 2,
            Self::DeepSleepWake => 3,
            Self::Watchdog => 4,
            Self::Brownout => 5,
        }
    }
}

/// Raw RGB status LED (true = lit)
pub trait StatusLed {
    fn set(&mut self, red: bool, green: bool, blue: bool);

    fn off(&mut self) {
        self.set(false, false, false);
    }
}

/// Summary values shown on the gateway display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplaySummary {
    pub hello_count: u32,
    pub telemetry_count: u32,
    pub node_id: u8,
    pub cycle: u32,
    pub soil_mean: u16,
    pub vbat_mean: u16,
    pub rssi: i8,
}

/// Two-line status display on the gateway
pub trait StatusDisplay {
    fn status(&mut self, line1: &str, line2: &str);
    fn summary(&mut self, summary: &DisplaySummary);
}

#[cfg(test)]
pub mod mock {
    //! Mock platform pieces for unit testing

    use super::*;

    /// Manually advanced clock; `delay_ms` advances time so timed logic
    /// stays deterministic in tests
    #[derive(Default)]
    pub struct MockClock {
        now: u32,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn advance(&mut self, ms: u32) {
            self.now = self.now.wrapping_add(ms);
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u32 {
            self.now
        }

        fn delay_ms(&mut self, ms: u32) {
            self.advance(ms);
        }
    }

    /// Records every LED state change
    #[derive(Default)]
    pub struct MockLed {
        pub history: std::vec::Vec<(bool, bool, bool)>,
    }

    impl MockLed {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last(&self) -> Option<(bool, bool, bool)> {
            self.history.last().copied()
        }
    }

    impl StatusLed for MockLed {
        fn set(&mut self, red: bool, green: bool, blue: bool) {
            self.history.push((red, green, blue));
        }
    }

    /// Records status lines and summaries
    #[derive(Default)]
    pub struct MockDisplay {
        pub lines: std::vec::Vec<(std::string::String, std::string::String)>,
        pub summaries: std::vec::Vec<DisplaySummary>,
    }

    impl MockDisplay {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl StatusDisplay for MockDisplay {
        fn status(&mut self, line1: &str, line2: &str) {
            self.lines.push((line1.into(), line2.into()));
        }

        fn summary(&mut self, summary: &DisplaySummary) {
            self.summaries.push(*summary);
        }
    }

    #[test]
    fn test_mock_clock_delay_advances_time() {
        let mut clock = MockClock::new();
        clock.delay_ms(150);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 200);
    }

    #[test]
    fn test_reset_cause_round_trip() {
        for cause in [
            ResetCause::Unknown,
            ResetCause::PowerOn,
            ResetCause::Software,
            ResetCause::DeepSleepWake,
            ResetCause::Watchdog,
            ResetCause::Brownout,
        ] {
            assert_eq!(ResetCause::from_byte(cause.as_byte()), cause);
        }
    }
}
