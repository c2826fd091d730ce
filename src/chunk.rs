use crate::error::{Result, TapeError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Cursor, Read};

pub const IMPLICIT_DATA: u16 = 0x0100;
pub const DEFINED_DATA: u16 = 0x0104;
pub const CARRIER: u16 = 0x0110;
pub const DUMMY_BYTE_CARRIER: u16 = 0x0111;
pub const INTEGER_GAP: u16 = 0x0112;
pub const BASE_FREQUENCY: u16 = 0x0113;
pub const SECURITY_CYCLES: u16 = 0x0114;
pub const PHASE_CHANGE: u16 = 0x0115;
pub const FLOAT_GAP: u16 = 0x0116;

/// Value of the framed byte inside a 0x0111 carrier.
pub const DUMMY_BYTE: u8 = 0xAA;

/// Lowest accepted 0x0113 base frequency in Hz.
pub const MIN_BASE_FREQUENCY: f32 = 100.0;
/// Longest accepted 0x0116 gap in seconds.
pub const MAX_GAP_SECONDS: f32 = 3600.0;

/// One `(identifier, payload)` record in playback order. The payload is not
/// checked against the identifier until it is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: u16,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn new(id: u16, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn decode(&self) -> Result<Block> {
        let id = self.id;
        let mut cursor = Cursor::new(self.payload.as_slice());

        let block = match id {
            IMPLICIT_DATA => Block::ImplicitData(self.payload.clone()),
            DEFINED_DATA => {
                let data_bits = field(id, "data bit count", cursor.read_u8())?;
                let parity = Parity::from_byte(field(id, "parity", cursor.read_u8())?);
                let stop_bits = field(id, "stop bit count", cursor.read_i8())?;
                Block::DefinedData {
                    data_bits,
                    parity,
                    stop_bits,
                    data: rest(cursor),
                }
            }
            CARRIER => Block::Carrier {
                cycles: field(id, "cycle count", cursor.read_u16::<LittleEndian>())?,
            },
            DUMMY_BYTE_CARRIER => Block::DummyByteCarrier {
                before: field(id, "leading cycle count", cursor.read_u16::<LittleEndian>())?,
                after: field(id, "trailing cycle count", cursor.read_u16::<LittleEndian>())?,
            },
            INTEGER_GAP => Block::IntegerGap {
                cycles: field(id, "cycle count", cursor.read_u16::<LittleEndian>())?,
            },
            BASE_FREQUENCY => {
                let frequency = field(id, "frequency", cursor.read_f32::<LittleEndian>())?;
                if !(frequency.is_finite() && frequency >= MIN_BASE_FREQUENCY) {
                    return Err(TapeError::malformed(
                        id,
                        format!("base frequency {} Hz is below {} Hz", frequency, MIN_BASE_FREQUENCY),
                    ));
                }
                Block::BaseFrequency(frequency)
            }
            SECURITY_CYCLES => {
                let cycles = field(id, "cycle count", cursor.read_u24::<LittleEndian>())?;
                let first = PulseMode::from_byte(field(id, "first pulse mode", cursor.read_u8())?);
                let last = PulseMode::from_byte(field(id, "last pulse mode", cursor.read_u8())?);
                Block::SecurityCycles {
                    cycles,
                    first,
                    last,
                    bits: rest(cursor),
                }
            }
            PHASE_CHANGE => Block::PhaseChange(field(id, "phase", cursor.read_u16::<LittleEndian>())?),
            FLOAT_GAP => {
                let seconds = field(id, "duration", cursor.read_f32::<LittleEndian>())?;
                if seconds.is_nan() || seconds > MAX_GAP_SECONDS {
                    return Err(TapeError::malformed(
                        id,
                        format!("gap of {} s exceeds {} s", seconds, MAX_GAP_SECONDS),
                    ));
                }
                Block::FloatGap(seconds)
            }
            _ => Block::Unrecognized {
                id,
                payload: self.payload.clone(),
            },
        };

        Ok(block)
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Chunk &{:04x} {} bytes:", self.id, self.payload.len())?;
        for byte in self.payload.iter().take(10) {
            write!(f, " {:02x}", byte)?;
        }
        write!(f, " ...>")
    }
}

fn field<T>(id: u16, name: &str, value: io::Result<T>) -> Result<T> {
    value.map_err(|_| TapeError::malformed(id, format!("payload too short for {}", name)))
}

fn rest(mut cursor: Cursor<&[u8]>) -> Vec<u8> {
    let mut data = Vec::new();
    // Reading from an in-memory slice cannot fail.
    let _ = cursor.read_to_end(&mut data);
    data
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'E' => Parity::Even,
            b'O' => Parity::Odd,
            _ => Parity::None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Parity::None => b'N',
            Parity::Even => b'E',
            Parity::Odd => b'O',
        }
    }

    /// Parity bit for the given data bits, if any is transmitted.
    pub fn bit(self, data_bits: &[bool]) -> Option<bool> {
        let odd = data_bits.iter().filter(|&&bit| bit).count() % 2 == 1;
        match self {
            Parity::None => None,
            Parity::Even => Some(odd),
            Parity::Odd => Some(!odd),
        }
    }
}

/// How the first or last security cycle is played: as a whole wave or a single pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseMode {
    Pulse,
    Wave,
}

impl PulseMode {
    pub fn from_byte(byte: u8) -> Self {
        if byte == b'P' {
            PulseMode::Pulse
        } else {
            PulseMode::Wave
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            PulseMode::Pulse => b'P',
            PulseMode::Wave => b'W',
        }
    }
}

/// Interpreted form of a [`Chunk`], one variant per supported identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    ImplicitData(Vec<u8>),
    DefinedData {
        data_bits: u8,
        parity: Parity,
        stop_bits: i8,
        data: Vec<u8>,
    },
    Carrier {
        cycles: u16,
    },
    DummyByteCarrier {
        before: u16,
        after: u16,
    },
    IntegerGap {
        cycles: u16,
    },
    BaseFrequency(f32),
    SecurityCycles {
        cycles: u32,
        first: PulseMode,
        last: PulseMode,
        bits: Vec<u8>,
    },
    PhaseChange(u16),
    FloatGap(f32),
    Unrecognized {
        id: u16,
        payload: Vec<u8>,
    },
}

impl Block {
    pub fn id(&self) -> u16 {
        match self {
            Block::ImplicitData(_) => IMPLICIT_DATA,
            Block::DefinedData { .. } => DEFINED_DATA,
            Block::Carrier { .. } => CARRIER,
            Block::DummyByteCarrier { .. } => DUMMY_BYTE_CARRIER,
            Block::IntegerGap { .. } => INTEGER_GAP,
            Block::BaseFrequency(_) => BASE_FREQUENCY,
            Block::SecurityCycles { .. } => SECURITY_CYCLES,
            Block::PhaseChange(_) => PHASE_CHANGE,
            Block::FloatGap(_) => FLOAT_GAP,
            Block::Unrecognized { id, .. } => *id,
        }
    }

    pub fn to_chunk(&self) -> Chunk {
        let mut payload = Vec::new();
        match self {
            Block::ImplicitData(data) => payload.extend_from_slice(data),
            Block::DefinedData {
                data_bits,
                parity,
                stop_bits,
                data,
            } => {
                payload.push(*data_bits);
                payload.push(parity.to_byte());
                payload.extend_from_slice(&stop_bits.to_le_bytes());
                payload.extend_from_slice(data);
            }
            Block::Carrier { cycles } | Block::IntegerGap { cycles } => {
                payload.extend_from_slice(&cycles.to_le_bytes());
            }
            Block::DummyByteCarrier { before, after } => {
                payload.extend_from_slice(&before.to_le_bytes());
                payload.extend_from_slice(&after.to_le_bytes());
            }
            Block::BaseFrequency(value) | Block::FloatGap(value) => {
                payload.extend_from_slice(&value.to_le_bytes());
            }
            Block::SecurityCycles {
                cycles,
                first,
                last,
                bits,
            } => {
                payload.extend_from_slice(&cycles.to_le_bytes()[..3]);
                payload.push(first.to_byte());
                payload.push(last.to_byte());
                payload.extend_from_slice(bits);
            }
            Block::PhaseChange(degrees) => payload.extend_from_slice(&degrees.to_le_bytes()),
            Block::Unrecognized { payload: raw, .. } => payload.extend_from_slice(raw),
        }

        Chunk::new(self.id(), payload)
    }
}

/// Sample range `start..end` covered by one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub id: u16,
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub spans: Vec<ChunkSpan>,
    pub ignored: BTreeSet<u16>,
}
