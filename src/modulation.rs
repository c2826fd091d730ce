use crate::chunk::{Block, Chunk, ChunkSpan, Diagnostics, Parity, PulseMode, DUMMY_BYTE};
use crate::error::{Result, Truncated};
use crate::signal::CycleShape;
use crate::{CodecState, Config};
use log::{debug, info, warn};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speed {
    Slow,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    Low,
    High,
}

struct CycleShapes {
    slow: CycleShape,
    fast: CycleShape,
    slow_silent: CycleShape,
    fast_silent: CycleShape,
}

impl CycleShapes {
    fn new(config: &Config, state: &CodecState) -> Self {
        let phase = state.phase_radians();
        let amplitude = config.bit_depth.amplitude();
        let rate = config.sample_rate;

        Self {
            slow: CycleShape::new(rate, state.slow_frequency(), phase, amplitude),
            fast: CycleShape::new(rate, state.fast_frequency(), phase, amplitude),
            slow_silent: CycleShape::silent(rate, state.slow_frequency()),
            fast_silent: CycleShape::silent(rate, state.fast_frequency()),
        }
    }

    fn get(&self, speed: Speed, silent: bool) -> &CycleShape {
        match (speed, silent) {
            (Speed::Slow, false) => &self.slow,
            (Speed::Fast, false) => &self.fast,
            (Speed::Slow, true) => &self.slow_silent,
            (Speed::Fast, true) => &self.fast_silent,
        }
    }
}

/// Playback position of a tape file's first block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub microseconds: u64,
    pub description: String,
}

impl Marker {
    pub fn timestamp(&self) -> String {
        let seconds = self.microseconds / 1_000_000;
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    }

    pub fn printable(&self) -> String {
        self.description
            .chars()
            .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
            .collect()
    }
}

/// Parses the `*`-prefixed header of an Acorn tape block into its file name
/// and block number.
pub fn parse_block_header(data: &[u8]) -> Option<(String, u16)> {
    if data.first() != Some(&b'*') {
        return None;
    }

    let name_len = data[1..]
        .iter()
        .take(10)
        .take_while(|&&b| b != 0)
        .count();
    let name: String = data[1..1 + name_len].iter().map(|&b| b as char).collect();

    // name, NUL, load address, execution address
    let offset = 1 + name_len + 1 + 8;
    let block = data.get(offset..offset + 2)?;
    Some((name, u16::from_le_bytes([block[0], block[1]])))
}

#[derive(Debug, Default)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub diagnostics: Diagnostics,
    pub encountered: BTreeSet<u16>,
    pub markers: Vec<Marker>,
}

/// Renders chunks into PCM samples, one chunk at a time.
///
/// Samples appended by earlier chunks are kept when a later chunk fails to
/// decode, so a truncated tape can still be written out.
pub struct Modulator {
    config: Config,
    state: CodecState,
    shapes: Option<CycleShapes>,
    samples: Vec<i16>,
    diagnostics: Diagnostics,
    encountered: BTreeSet<u16>,
    markers: Vec<Marker>,
}

impl Modulator {
    pub fn new(config: Config) -> Result<Self> {
        config.check_modulation()?;

        Ok(Self {
            config,
            state: CodecState::default(),
            shapes: None,
            samples: Vec::new(),
            diagnostics: Diagnostics::default(),
            encountered: BTreeSet::new(),
            markers: Vec::new(),
        })
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn microseconds(&self) -> u64 {
        self.samples.len() as u64 * 1_000_000 / self.config.sample_rate as u64
    }

    pub fn record(&mut self, chunk: &Chunk) -> Result<()> {
        debug!("{}", chunk);
        let start = self.samples.len();

        match chunk.decode()? {
            Block::ImplicitData(data) => {
                if let Some((name, 0)) = parse_block_header(&data) {
                    self.markers.push(Marker {
                        microseconds: self.microseconds(),
                        description: name,
                    });
                }
                for &byte in &data {
                    self.framed_byte(byte, 8, Parity::None, 1);
                }
            }
            Block::DefinedData {
                data_bits,
                parity,
                stop_bits,
                data,
            } => {
                for &byte in &data {
                    self.framed_byte(byte, data_bits, parity, stop_bits);
                }
            }
            Block::Carrier { cycles } => self.cycles(Speed::Fast, cycles as u64, false),
            Block::DummyByteCarrier { before, after } => {
                self.cycles(Speed::Fast, before as u64, false);
                self.framed_byte(DUMMY_BYTE, 8, Parity::None, 1);
                self.cycles(Speed::Fast, after as u64, false);
            }
            Block::IntegerGap { cycles } => self.cycles(Speed::Fast, cycles as u64, true),
            Block::BaseFrequency(frequency) => {
                self.state.base_frequency = frequency;
                self.shapes = None;
            }
            Block::SecurityCycles {
                cycles,
                first,
                last,
                bits,
            } => self.security_cycles(cycles as usize, first, last, &bits),
            Block::PhaseChange(degrees) => {
                self.state.phase_degrees = degrees;
                self.shapes = None;
            }
            Block::FloatGap(seconds) => {
                // Saturating cast: negative durations give no cycles.
                let count = (seconds as f64 * self.state.fast_frequency()) as u64;
                self.cycles(Speed::Fast, count, true);
            }
            Block::Unrecognized { id, .. } => {
                debug!("Ignoring chunk &{:04x}", id);
                self.diagnostics.ignored.insert(id);
                return Ok(());
            }
        }

        self.encountered.insert(chunk.id);
        self.diagnostics.spans.push(ChunkSpan {
            id: chunk.id,
            start,
            end: self.samples.len(),
        });
        Ok(())
    }

    pub fn finish(self) -> Recording {
        Recording {
            samples: self.samples,
            diagnostics: self.diagnostics,
            encountered: self.encountered,
            markers: self.markers,
        }
    }

    fn pulse(&mut self, speed: Speed, half: Half, silent: bool) {
        let state = self.state;
        let config = &self.config;
        let shape = self
            .shapes
            .get_or_insert_with(|| CycleShapes::new(config, &state))
            .get(speed, silent);

        let samples = match half {
            Half::Low => shape.low_pulse(),
            Half::High => shape.high_pulse(),
        };
        self.samples.extend_from_slice(samples);
    }

    fn cycle(&mut self, speed: Speed, silent: bool) {
        self.pulse(speed, Half::Low, silent);
        self.pulse(speed, Half::High, silent);
    }

    fn cycles(&mut self, speed: Speed, count: u64, silent: bool) {
        for _ in 0..count {
            self.cycle(speed, silent);
        }
    }

    fn bit(&mut self, one: bool) {
        if one {
            self.cycles(Speed::Fast, 2, false);
        } else {
            self.cycle(Speed::Slow, false);
        }
    }

    fn framed_byte(&mut self, byte: u8, data_bits: u8, parity: Parity, stop_bits: i8) {
        let bits: Vec<bool> = (0..data_bits.min(8)).map(|i| byte & (1 << i) != 0).collect();

        self.bit(false);
        for &bit in &bits {
            self.bit(bit);
        }
        if let Some(parity_bit) = parity.bit(&bits) {
            self.bit(parity_bit);
        }
        for _ in 0..stop_bits.unsigned_abs() {
            self.bit(true);
        }
        if stop_bits < 0 {
            self.cycle(Speed::Fast, false);
        }
    }

    fn security_cycles(&mut self, count: usize, first: PulseMode, last: PulseMode, bits: &[u8]) {
        let bits: Vec<bool> = bits
            .iter()
            .flat_map(|&byte| (0..8).map(move |i| byte & (1 << i) != 0))
            .take(count)
            .collect();
        let last_index = bits.len().saturating_sub(1);

        for (i, &bit) in bits.iter().enumerate() {
            let speed = if bit { Speed::Fast } else { Speed::Slow };
            if i == last_index && last == PulseMode::Pulse {
                self.pulse(speed, Half::Low, false);
            } else if i == 0 && first == PulseMode::Pulse {
                self.pulse(speed, Half::High, false);
            } else {
                self.cycle(speed, false);
            }
        }
    }
}

/// Renders a whole chunk sequence. A chunk that fails to decode stops
/// rendering; the samples of the chunks before it come back with the error.
pub fn modulate(
    chunks: &[Chunk],
    config: &Config,
) -> std::result::Result<Recording, Truncated<Recording>> {
    let mut modulator =
        Modulator::new(config.clone()).map_err(|e| Truncated::new(Recording::default(), e))?;
    for chunk in chunks {
        if let Err(e) = modulator.record(chunk) {
            warn!("Stopped at {}: {}", chunk, e);
            return Err(Truncated::new(modulator.finish(), e));
        }
    }

    let recording = modulator.finish();
    info!(
        "Recorded {} samples from {} chunks",
        recording.samples.len(),
        chunks.len()
    );
    Ok(recording)
}
