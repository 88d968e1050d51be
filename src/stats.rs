//! Integer statistics over one ADC burst

use crate::config::adc::MAX_SAMPLES;
use crate::proto::ChannelStats;

/// Statistics derived from one burst of raw 12-bit samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BurstStats {
    pub mean: u16,
    pub median: u16,
    pub min: u16,
    pub max: u16,
    /// Integer square root of the population variance
    pub stddev: u16,
    pub count: u8,
}

impl BurstStats {
    /// Compute statistics over at most [`MAX_SAMPLES`] samples.
    ///
    /// Mean uses integer division. Median is the middle element of a sorted
    /// copy for odd counts and the integer mean of the two middle elements
    /// for even counts.
    pub fn compute(samples: &[u16]) -> Self {
        let count = samples.len().min(MAX_SAMPLES);
        if count == 0 {
            return Self::default();
        }
        let samples = &samples[..count];

        let mut acc: u32 = 0;
        let mut min = u16::MAX;
        let mut max = 0u16;
        for &v in samples {
            acc += u32::from(v);
            min = min.min(v);
            max = max.max(v);
        }
        let mean = (acc / count as u32) as u16;

        let mut sorted: heapless::Vec<u16, MAX_SAMPLES> = heapless::Vec::new();
        // Cannot fail: count is bounded by MAX_SAMPLES
        let _ = sorted.extend_from_slice(samples);
        sorted.sort_unstable();
        let median = if count % 2 == 0 {
            let mid = count / 2;
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[count / 2]
        };

        let mut var_acc: u32 = 0;
        for &v in samples {
            let diff = i32::from(v) - i32::from(mean);
            var_acc += (diff * diff) as u32;
        }
        let variance = var_acc / count as u32;

        Self {
            mean,
            median,
            min,
            max,
            stddev: isqrt(variance) as u16,
            count: count as u8,
        }
    }

    /// The five wire statistics in transmission order
    pub fn channel_stats(&self) -> ChannelStats {
        ChannelStats {
            mean: self.mean,
            median: self.median,
            min: self.min,
            max: self.max,
            stddev: self.stddev,
        }
    }
}

/// Largest r with r * r <= value
fn isqrt(value: u32) -> u32 {
    if value < 2 {
        return value;
    }
    let mut low = 1u32;
    let mut high = value.min(65_535);
    while low < high {
        let mid = (low + high + 1) / 2;
        if mid * mid <= value {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}
