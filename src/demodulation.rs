use crate::chunk::{Block, Chunk, ChunkSpan, Diagnostics, MAX_GAP_SECONDS};
use crate::error::Result;
use crate::signal::{SampleCursor, HUNT_PULSE_LENGTHS, HUNT_PULSE_LIMIT};
use crate::{CodecState, Config};
use log::{debug, info, warn};

/// Fast cycles needed before a run counts as carrier rather than the
/// one-bits and stop bit of a single 0xFF byte.
pub const CARRIER_MIN_CYCLES: usize = 19;
/// Fast cycles that must precede a start bit when framing is picked up
/// without a carrier.
pub const RESYNC_MIN_CYCLES: usize = 1;
/// Nominal carrier tone used to turn a carrier's duration into a cycle count.
pub const CARRIER_FREQUENCY: f64 = 2400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync,
    Carrier,
    StartBit,
    Byte,
    StopBit,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Gap,
    Carrier,
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    segment: Segment,
    start: usize,
    end: usize,
}

/// Recovers carrier, data and gap chunks from a buffered PCM sample region.
pub struct Demodulator<'a> {
    cursor: SampleCursor<'a>,
    sample_rate: u32,
    state: CodecState,
    entries: Vec<Entry>,
    /// Start of the span skipped while out of sync, if one is open.
    gap_start: Option<usize>,
    /// Where a new data chunk begins when the current byte completes.
    data_start: usize,
    /// Start of the current byte's start bit.
    bit_start: usize,
}

impl<'a> Demodulator<'a> {
    pub fn new(samples: &'a [i16], config: &Config) -> Result<Self> {
        config.check_demodulation()?;

        Ok(Self {
            cursor: SampleCursor::new(samples, config.sample_rate),
            sample_rate: config.sample_rate,
            state: CodecState::default(),
            entries: Vec::new(),
            gap_start: None,
            data_start: 0,
            bit_start: 0,
        })
    }

    pub fn run(mut self) -> (Vec<Chunk>, Diagnostics) {
        let mut state = State::Sync;
        loop {
            state = match state {
                State::Sync => match self.sync() {
                    Some(next) => next,
                    None => break,
                },
                State::Carrier => self.carrier(),
                State::StartBit => self.start_bit(),
                State::Byte => self.byte(),
                State::StopBit => self.stop_bit(),
            };
        }

        self.into_chunks()
    }

    /// Scans forward one sample at a time until a pulse could open a carrier.
    fn sync(&mut self) -> Option<State> {
        let here = self.cursor.position();
        self.gap_start.get_or_insert(here);

        while !self.cursor.is_at_end() {
            if self.at_carrier_candidate() {
                return Some(State::Carrier);
            }
            self.cursor.advance(1);
        }

        let end = self.cursor.position();
        self.close_gap(end);
        None
    }

    fn at_carrier_candidate(&self) -> bool {
        match self.cursor.peek_pulse(HUNT_PULSE_LIMIT) {
            Some(pulse) => {
                pulse.polarity == self.state.leading_polarity()
                    && HUNT_PULSE_LENGTHS.contains(&pulse.len)
            }
            None => false,
        }
    }

    fn carrier(&mut self) -> State {
        let start = self.cursor.position();
        let fast = self.state.fast_frequency();

        let mut cycles = 0;
        while self.cursor.read_cycle(fast).is_ok() {
            cycles += 1;
        }

        if cycles >= CARRIER_MIN_CYCLES {
            self.close_gap(start);
            let end = self.cursor.position();
            self.push(Segment::Carrier, start, end);
            return State::StartBit;
        }

        // Too short for carrier: the tail of a byte if a start bit follows.
        if cycles >= RESYNC_MIN_CYCLES {
            let bit_start = self.cursor.position();
            if self.cursor.read_cycle(self.state.slow_frequency()).is_ok() {
                self.data_start = start;
                self.bit_start = bit_start;
                return State::Byte;
            }
        }

        self.gap_start.get_or_insert(start);
        self.cursor.seek(start + 1);
        State::Sync
    }

    fn start_bit(&mut self) -> State {
        let bit_start = self.cursor.position();
        if self.cursor.read_cycle(self.state.slow_frequency()).is_ok() {
            self.data_start = bit_start;
            self.bit_start = bit_start;
            State::Byte
        } else {
            State::Sync
        }
    }

    fn byte(&mut self) -> State {
        let mut value = 0u8;
        for i in 0..8 {
            match self.read_bit() {
                Some(true) => value |= 1 << i,
                Some(false) => {}
                None => {
                    debug!("Lost framing at sample {}", self.cursor.position());
                    self.cursor.seek(self.bit_start);
                    self.gap_start.get_or_insert(self.bit_start);
                    return State::Sync;
                }
            }
        }

        self.push_byte(value);
        State::StopBit
    }

    fn stop_bit(&mut self) -> State {
        let byte_end = self.cursor.position();
        if self.read_bit() != Some(true) {
            // a 0-bit here belongs to whatever follows the byte
            self.cursor.seek(byte_end);
            return State::Sync;
        }
        let end = self.cursor.position();
        if let Some(entry) = self.entries.last_mut() {
            entry.end = end;
        }

        let bit_start = end;
        if self.cursor.read_cycle(self.state.slow_frequency()).is_ok() {
            self.data_start = bit_start;
            self.bit_start = bit_start;
            return State::Byte;
        }

        if self.cursor.read_cycle(self.state.fast_frequency()).is_ok() {
            self.cursor.seek(bit_start);
            return State::Carrier;
        }

        State::Sync
    }

    /// Reads one slow cycle as a 0-bit or two fast cycles as a 1-bit.
    fn read_bit(&mut self) -> Option<bool> {
        if self.cursor.read_cycle(self.state.slow_frequency()).is_ok() {
            return Some(false);
        }

        let mark = self.cursor.position();
        let fast = self.state.fast_frequency();
        if self.cursor.read_cycle(fast).is_ok() {
            if self.cursor.read_cycle(fast).is_ok() {
                return Some(true);
            }
            self.cursor.seek(mark);
        }
        None
    }

    /// Appends to the previous data chunk unless something was emitted after it.
    fn push_byte(&mut self, value: u8) {
        let end = self.cursor.position();
        let start = self.data_start;
        self.close_gap(start);

        if let Some(Entry {
            segment: Segment::Data(bytes),
            end: data_end,
            ..
        }) = self.entries.last_mut()
        {
            bytes.push(value);
            *data_end = end;
            return;
        }

        self.push(Segment::Data(vec![value]), start, end);
    }

    fn close_gap(&mut self, end: usize) {
        if let Some(start) = self.gap_start.take() {
            if end > start {
                self.push(Segment::Gap, start, end);
            }
        }
    }

    fn push(&mut self, segment: Segment, start: usize, end: usize) {
        debug!("{:?} at samples {}..{}", segment, start, end);
        self.entries.push(Entry {
            segment,
            start,
            end,
        });
    }

    fn into_chunks(self) -> (Vec<Chunk>, Diagnostics) {
        let rate = self.sample_rate as f64;
        let mut chunks = Vec::with_capacity(self.entries.len());
        let mut diagnostics = Diagnostics::default();

        for entry in self.entries {
            let seconds = (entry.end - entry.start) as f64 / rate;
            let block = match entry.segment {
                Segment::Gap => {
                    let gap = (seconds / 2.0) as f32;
                    if gap > MAX_GAP_SECONDS {
                        warn!("Gap of {} s clipped to {} s", gap, MAX_GAP_SECONDS);
                    }
                    Block::FloatGap(gap.min(MAX_GAP_SECONDS))
                }
                Segment::Carrier => {
                    let cycles = (seconds * CARRIER_FREQUENCY).round();
                    if cycles > u16::MAX as f64 {
                        warn!("Carrier of {} cycles clipped to {}", cycles, u16::MAX);
                    }
                    Block::Carrier {
                        cycles: cycles.min(u16::MAX as f64) as u16,
                    }
                }
                Segment::Data(bytes) => Block::ImplicitData(bytes),
            };

            let chunk = block.to_chunk();
            diagnostics.spans.push(ChunkSpan {
                id: chunk.id,
                start: entry.start,
                end: entry.end,
            });
            chunks.push(chunk);
        }

        (chunks, diagnostics)
    }
}

pub fn demodulate(samples: &[i16], config: &Config) -> Result<(Vec<Chunk>, Diagnostics)> {
    let (chunks, diagnostics) = Demodulator::new(samples, config)?.run();
    info!(
        "Recovered {} chunks from {} samples",
        chunks.len(),
        samples.len()
    );
    Ok((chunks, diagnostics))
}
