pub mod audio;
pub mod chunk;
pub mod codec;
pub mod demodulation;
pub mod error;
pub mod modulation;
pub mod signal;
pub mod uef;

pub use audio::*;
pub use chunk::*;
pub use codec::*;
pub use demodulation::*;
pub use error::*;
pub use modulation::*;
pub use signal::*;
pub use uef::*;

pub const SAMPLE_RATE: u32 = 44100;
pub const SUPPORTED_SAMPLE_RATES: [u32; 3] = [11025, 22050, 44100];
pub const DEFAULT_BASE_FREQUENCY: f32 = 1200.0;
pub const DEFAULT_PHASE_DEGREES: u16 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            _ => None,
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    /// Peak sample value of a full-scale cycle.
    pub fn amplitude(&self) -> f64 {
        match self {
            BitDepth::Eight => 127.0,
            BitDepth::Sixteen => 32767.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
}

impl Config {
    pub fn check_modulation(&self) -> Result<()> {
        if SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            Ok(())
        } else {
            Err(TapeError::UnsupportedFormat(format!(
                "cannot record at {} Hz",
                self.sample_rate
            )))
        }
    }

    pub fn check_demodulation(&self) -> Result<()> {
        if self.sample_rate == SAMPLE_RATE {
            Ok(())
        } else {
            Err(TapeError::UnsupportedFormat(format!(
                "cannot decode at {} Hz, only {} Hz",
                self.sample_rate, SAMPLE_RATE
            )))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            bit_depth: BitDepth::Sixteen,
        }
    }
}

/// Running tone parameters. Changes only affect cycles produced or read after them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecState {
    pub base_frequency: f32,
    pub phase_degrees: u16,
}

impl CodecState {
    pub fn slow_frequency(&self) -> f64 {
        self.base_frequency as f64
    }

    pub fn fast_frequency(&self) -> f64 {
        2.0 * self.base_frequency as f64
    }

    pub fn phase_radians(&self) -> f64 {
        (self.phase_degrees as f64).to_radians()
    }

    /// Polarity of the first half of every cycle at the current phase.
    pub fn leading_polarity(&self) -> Polarity {
        if (self.phase_radians() + std::f64::consts::FRAC_PI_2).sin() < 0.0 {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }
}

impl Default for CodecState {
    fn default() -> Self {
        Self {
            base_frequency: DEFAULT_BASE_FREQUENCY,
            phase_degrees: DEFAULT_PHASE_DEGREES,
        }
    }
}
