//! In-call quality metrics
//!
//! The SDK client pushes ready-made [`StatsFrame`]s. The SIP device only
//! reports raw samples, so the MOS estimate and the quality label are
//! derived here with a simplified E-model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Latest quality figures of the current call
///
/// `jitter` and `rtt` are in seconds, as the SDKs report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsFrame {
    pub jitter: f64,
    pub rtt: f64,
    pub mos: f64,
    pub quality: String,
}

impl Default for StatsFrame {
    fn default() -> Self {
        Self {
            jitter: 0.0,
            rtt: 0.0,
            mos: 0.0,
            quality: CallQuality::Bad.to_string(),
        }
    }
}

impl StatsFrame {
    /// Frame computed from a raw SIP sample
    pub fn from_sample(sample: &StatsSample) -> Self {
        let mos = estimate_mos(sample.jitter, sample.rtt, sample.packets_lost);
        Self {
            jitter: sample.jitter,
            rtt: sample.rtt,
            mos,
            quality: CallQuality::from_mos(mos).to_string(),
        }
    }

    pub fn jitter_display(&self) -> String {
        format_ms(self.jitter)
    }

    pub fn rtt_display(&self) -> String {
        format_ms(self.rtt)
    }

    pub fn mos_display(&self) -> String {
        format!("{:.2}", self.mos)
    }
}

/// Raw audio statistics of a SIP call
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsSample {
    /// Inbound audio jitter, seconds
    pub jitter: f64,
    /// Current round trip time, seconds
    pub rtt: f64,
    pub packets_lost: f64,
}

/// Quality label for a MOS value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl CallQuality {
    pub fn from_mos(mos: f64) -> Self {
        if mos >= 4.0 {
            Self::Excellent
        } else if mos >= 3.5 {
            Self::Good
        } else if mos >= 3.0 {
            Self::Fair
        } else if mos >= 2.5 {
            Self::Poor
        } else {
            Self::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Bad => "bad",
        }
    }
}

impl fmt::Display for CallQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MOS estimate in `[1.0, 4.5]` from jitter and rtt (seconds) and lost packets
pub fn estimate_mos(jitter: f64, rtt: f64, packets_lost: f64) -> f64 {
    let delay_ms = rtt * 1000.0;
    let jitter_ms = jitter * 1000.0;

    let mut delay_impairment = 0.024 * delay_ms;
    if delay_ms > 177.3 {
        delay_impairment += 0.11 * (delay_ms - 177.3);
    }
    let equipment_impairment = 10.0 * (1.0 + packets_lost.max(0.0)).log10() + jitter_ms * 0.5;

    let r = (93.2 - delay_impairment - equipment_impairment).clamp(0.0, 100.0);
    let mos = 1.0 + 0.035 * r + r * (r - 60.0) * (100.0 - r) * 7e-6;
    mos.clamp(1.0, 4.5)
}

/// Seconds as milliseconds with two decimals, `0.0123` → `"12.30ms"`
pub fn format_ms(seconds: f64) -> String {
    format!("{:.2}ms", seconds * 1000.0)
}
