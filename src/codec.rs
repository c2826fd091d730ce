use crate::chunk::{Block, Chunk};

pub const BLOCK_SIZE: usize = 256;
pub const MAX_NAME_LEN: usize = 10;
pub const LAST_BLOCK_FLAG: u8 = 0x80;
pub const SYNC_BYTE: u8 = 0xDC;
pub const LEAD_IN_CYCLES: u16 = 1500;
pub const INTER_BLOCK_CYCLES: u16 = 600;
pub const TRAILING_GAP_CYCLES: u16 = 600;

/// CRC-16 used by Acorn tape block headers and data.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in bytes {
        crc = ((byte as u16 ^ (crc >> 8)) << 8) | (crc & 0x00FF);
        for _ in 0..8 {
            let carry = if crc & 0x8000 != 0 {
                crc ^= 0x0810;
                1
            } else {
                0
            };
            crc = (crc << 1) | carry;
        }
    }
    crc
}

/// A binary file to be laid out as a sequence of tape blocks.
#[derive(Debug, Clone)]
pub struct TapeFile<'a> {
    pub name: &'a str,
    pub load_address: u32,
    pub exec_address: u32,
    pub data: &'a [u8],
}

impl<'a> TapeFile<'a> {
    pub fn new(name: &'a str, data: &'a [u8], load_address: u32) -> Self {
        Self {
            name,
            load_address,
            exec_address: load_address,
            data,
        }
    }

    pub fn with_exec_address(mut self, exec_address: u32) -> Self {
        self.exec_address = exec_address;
        self
    }

    /// Header bytes covered by the header CRC (without the leading `*`).
    pub fn block_header(&self, number: u16, len: u16, flag: u8) -> Vec<u8> {
        let mut header: Vec<u8> = self
            .name
            .bytes()
            .take(MAX_NAME_LEN)
            .map(|b| b.to_ascii_uppercase())
            .collect();
        header.push(0);
        header.extend_from_slice(&self.load_address.to_le_bytes());
        header.extend_from_slice(&self.exec_address.to_le_bytes());
        header.extend_from_slice(&number.to_le_bytes());
        header.extend_from_slice(&len.to_le_bytes());
        header.push(flag);
        header.extend_from_slice(&0u32.to_le_bytes());
        header
    }

    /// Payload of one implicit data chunk: `*`, header, header CRC, data, data CRC.
    pub fn block(&self, number: u16) -> Vec<u8> {
        let start = number as usize * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(self.data.len());
        let data = &self.data[start.min(end)..end];
        let flag = if end == self.data.len() {
            LAST_BLOCK_FLAG
        } else {
            0
        };
        let header = self.block_header(number, data.len() as u16, flag);

        let mut payload = Vec::with_capacity(1 + header.len() + data.len() + 4);
        payload.push(b'*');
        payload.extend_from_slice(&header);
        payload.extend_from_slice(&crc16(&header).to_be_bytes());
        payload.extend_from_slice(data);
        payload.extend_from_slice(&crc16(data).to_be_bytes());
        payload
    }

    pub fn block_count(&self) -> usize {
        // an empty file still gets one (empty, final) block
        self.data.len().div_ceil(BLOCK_SIZE).max(1)
    }

    pub fn to_chunks(&self) -> Vec<Chunk> {
        let mut chunks = vec![
            Block::Carrier {
                cycles: LEAD_IN_CYCLES,
            }
            .to_chunk(),
            Block::ImplicitData(vec![SYNC_BYTE]).to_chunk(),
            Block::Carrier {
                cycles: LEAD_IN_CYCLES,
            }
            .to_chunk(),
        ];

        for number in 0..self.block_count() {
            chunks.push(Block::ImplicitData(self.block(number as u16)).to_chunk());
            chunks.push(
                Block::Carrier {
                    cycles: INTER_BLOCK_CYCLES,
                }
                .to_chunk(),
            );
        }

        chunks.push(
            Block::IntegerGap {
                cycles: TRAILING_GAP_CYCLES,
            }
            .to_chunk(),
        );
        chunks
    }
}

pub fn package_binary(name: &str, data: &[u8], load_address: u32, exec_address: u32) -> Vec<Chunk> {
    TapeFile::new(name, data, load_address)
        .with_exec_address(exec_address)
        .to_chunks()
}
