//! Analog front-end trait and burst acquisition
//!
//! Sensor energisation and raw ADC reads belong to the board support code;
//! the burst sequencing and timing live here. A channel is energised only
//! for the duration of its burst and always de-energised before returning.

use crate::config::adc::{DEFAULT_NUM_SAMPLES, MAX_SAMPLES};
use crate::platform::Clock;
use crate::stats::BurstStats;

/// The three measurement channels, in burst order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    Soil,
    Vbat,
    Ntc,
}

impl SensorChannel {
    /// Burst order within one measurement cycle
    pub const ALL: [SensorChannel; 3] = [Self::Soil, Self::Vbat, Self::Ntc];
}

/// Abstract analog front-end: per-channel power switches plus raw reads
pub trait AnalogFrontEnd {
    fn energize(&mut self, channel: SensorChannel);
    fn de_energize(&mut self, channel: SensorChannel);
    fn read_raw(&mut self, channel: SensorChannel) -> u16;

    /// Cut power to every channel
    fn all_off(&mut self) {
        for channel in SensorChannel::ALL {
            self.de_energize(channel);
        }
    }
}

/// Timing parameters for one burst
#[derive(Debug, Clone, Copy)]
pub struct BurstTiming {
    pub settle_ms: u16,
    pub sample_interval_ms: u16,
    pub num_samples: u8,
}

impl BurstTiming {
    /// Zero sample counts fall back to the default; oversized ones are
    /// capped at the sample buffer size
    fn effective_samples(&self) -> usize {
        match self.num_samples {
            0 => DEFAULT_NUM_SAMPLES as usize,
            n => (n as usize).min(MAX_SAMPLES),
        }
    }
}

/// Acquire one burst: energise, settle, discard one read, sample, cut power.
///
/// The inter-sample delay is applied between samples, not after the last
/// one. The channel is de-energised on every exit path.
pub fn read_burst<A: AnalogFrontEnd, C: Clock>(
    frontend: &mut A,
    clock: &mut C,
    channel: SensorChannel,
    timing: &BurstTiming,
) -> BurstStats {
    let n = timing.effective_samples();
    let mut samples = [0u16; MAX_SAMPLES];

    frontend.energize(channel);
    clock.delay_ms(u32::from(timing.settle_ms));
    let _ = frontend.read_raw(channel); // first reading after power-up is unreliable

    for i in 0..n {
        samples[i] = frontend.read_raw(channel);
        if i + 1 < n {
            clock.delay_ms(u32::from(timing.sample_interval_ms));
        }
    }

    frontend.de_energize(channel);
    BurstStats::compute(&samples[..n])
}
