use std::f64::consts::PI;
use thiserror::Error;

/// Longest/shortest pulse ratio still accepted as one clean cycle.
pub const PULSE_RATIO_LIMIT: f64 = 1.6;
/// Maximum distance in Hz between a measured and an expected cycle frequency.
pub const FREQUENCY_TOLERANCE: f64 = 500.0;
/// Pulse lengths (at 44100 Hz) that may open a carrier while hunting for sync.
pub const HUNT_PULSE_LENGTHS: [usize; 7] = [8, 9, 10, 16, 17, 18, 19];
pub const HUNT_PULSE_LIMIT: usize = 19;

/// Recoverable failures while classifying samples. The cursor is left where
/// it was before the attempt.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ClassifyError {
    #[error("Pulses of a cycle have the same polarity")]
    PhaseMismatch,

    #[error("Pulse lengths {longer} and {shorter} are too asymmetric")]
    RatioMismatch { longer: usize, shorter: usize },

    #[error("Measured {measured:.1} Hz, expected {expected:.1} Hz")]
    FrequencyMismatch { measured: f64, expected: f64 },

    #[error("End of sample stream")]
    EndOfStream,
}

pub fn cycle_length(sample_rate: u32, frequency: f64) -> usize {
    (sample_rate as f64 / frequency).round().max(2.0) as usize
}

/// One full cycle of samples; the low pulse is the first half, the high pulse the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleShape {
    samples: Vec<i16>,
}

impl CycleShape {
    pub fn new(sample_rate: u32, frequency: f64, phase: f64, amplitude: f64) -> Self {
        let n = cycle_length(sample_rate, frequency);
        let samples = (0..n)
            .map(|t| {
                let y = (phase + 2.0 * PI * t as f64 / n as f64).sin();
                (amplitude * y).trunc() as i16
            })
            .collect();

        Self { samples }
    }

    pub fn silent(sample_rate: u32, frequency: f64) -> Self {
        Self {
            samples: vec![0; cycle_length(sample_rate, frequency)],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn low_pulse(&self) -> &[i16] {
        &self.samples[..self.samples.len() / 2]
    }

    pub fn high_pulse(&self) -> &[i16] {
        &self.samples[self.samples.len() / 2..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Negative,
    Positive,
}

impl Polarity {
    pub fn of(sample: i16) -> Option<Self> {
        match sample {
            0 => None,
            s if s < 0 => Some(Polarity::Negative),
            _ => Some(Polarity::Positive),
        }
    }
}

/// A half-wave: leading zero samples plus a run of one polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub polarity: Polarity,
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub first: Pulse,
    pub second: Pulse,
}

impl Cycle {
    pub fn len(&self) -> usize {
        self.first.len + self.second.len
    }

    pub fn frequency(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / self.len() as f64
    }
}

/// Read position over a fully buffered sample region, with rewind.
pub struct SampleCursor<'a> {
    samples: &'a [i16],
    position: usize,
    sample_rate: u32,
}

impl<'a> SampleCursor<'a> {
    pub fn new(samples: &'a [i16], sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.samples.len()
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.samples.len());
    }

    pub fn advance(&mut self, count: usize) {
        self.seek(self.position + count);
    }

    /// Measures the pulse at the cursor without moving it. Gives up once the
    /// pulse grows past `limit` samples.
    pub fn peek_pulse(&self, limit: usize) -> Option<Pulse> {
        let end = self.samples.len().min(self.position + limit + 1);
        let window = &self.samples[self.position..end];

        let lead = window.iter().take_while(|&&s| s == 0).count();
        let polarity = Polarity::of(*window.get(lead)?)?;
        let run = window[lead..]
            .iter()
            .take_while(|&&s| Polarity::of(s) == Some(polarity))
            .count();

        let len = lead + run;
        if len > limit {
            return None;
        }
        Some(Pulse { polarity, len })
    }

    /// Consumes leading zeros and the following run of one polarity. The
    /// sample that ends the run is left for the next pulse.
    pub fn read_pulse(&mut self) -> Result<Pulse, ClassifyError> {
        let start = self.position;
        let rest = &self.samples[start..];

        let lead = rest.iter().take_while(|&&s| s == 0).count();
        let polarity = rest
            .get(lead)
            .and_then(|&s| Polarity::of(s))
            .ok_or(ClassifyError::EndOfStream)?;
        let run = rest[lead..]
            .iter()
            .take_while(|&&s| Polarity::of(s) == Some(polarity))
            .count();

        self.position = start + lead + run;
        Ok(Pulse {
            polarity,
            len: lead + run,
        })
    }

    /// Reads two pulses and checks they form one cycle near `expected` Hz.
    /// On failure the cursor is rewound to where it started.
    pub fn read_cycle(&mut self, expected: f64) -> Result<Cycle, ClassifyError> {
        let mark = self.position;
        let result = self.classify_cycle(expected);
        if result.is_err() {
            self.position = mark;
        }
        result
    }

    fn classify_cycle(&mut self, expected: f64) -> Result<Cycle, ClassifyError> {
        let first = self.read_pulse()?;
        let second = self.read_pulse()?;

        if first.polarity == second.polarity {
            return Err(ClassifyError::PhaseMismatch);
        }

        let longer = first.len.max(second.len);
        let shorter = first.len.min(second.len);
        if longer as f64 / shorter as f64 > PULSE_RATIO_LIMIT {
            return Err(ClassifyError::RatioMismatch { longer, shorter });
        }

        let cycle = Cycle { first, second };
        let measured = cycle.frequency(self.sample_rate);
        if (measured - expected).abs() > FREQUENCY_TOLERANCE {
            return Err(ClassifyError::FrequencyMismatch { measured, expected });
        }

        Ok(cycle)
    }
}
