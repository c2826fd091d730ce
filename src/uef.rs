use crate::chunk::Chunk;
use crate::error::{Result, TapeError, Truncated};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, ErrorKind, Read, Write};

pub const UEF_MAGIC: &[u8; 10] = b"UEF File!\0";
/// Minor version 10, major version 0.
pub const UEF_VERSION: u16 = 0x0001;

/// Streams chunk records out of a UEF image.
///
/// Yields chunks in file order and stops after the first error, so a caller
/// collecting into a `Vec` keeps everything read before a truncation.
pub struct ChunkReader<R: Read> {
    reader: R,
    version: u16,
    finished: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 10];
        reader.read_exact(&mut magic).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => TapeError::NotUef,
            _ => TapeError::Io(e),
        })?;
        if &magic != UEF_MAGIC {
            return Err(TapeError::NotUef);
        }

        let version = reader
            .read_u16::<LittleEndian>()
            .map_err(|_| TapeError::NotUef)?;

        Ok(Self {
            reader,
            version,
            finished: false,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut identifier = [0u8; 2];
        match read_up_to(&mut self.reader, &mut identifier)? {
            0 => return Ok(None),
            2 => {}
            _ => return Err(TapeError::malformed(0, "truncated chunk identifier")),
        }
        let id = u16::from_le_bytes(identifier);

        let length = self
            .reader
            .read_u32::<LittleEndian>()
            .map_err(|_| TapeError::malformed(id, "truncated chunk length"))?;

        let mut payload = Vec::new();
        (&mut self.reader)
            .take(length as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < length as usize {
            return Err(TapeError::malformed(
                id,
                format!("payload truncated at {} of {} bytes", payload.len(), length),
            ));
        }

        Ok(Some(Chunk::new(id, payload)))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads every chunk. On failure the chunks read before it come back with the error.
pub fn read_uef<R: Read>(reader: R) -> std::result::Result<Vec<Chunk>, Truncated<Vec<Chunk>>> {
    let reader = ChunkReader::new(reader).map_err(|e| Truncated::new(Vec::new(), e))?;

    let mut chunks = Vec::new();
    for chunk in reader {
        match chunk {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => return Err(Truncated::new(chunks, e)),
        }
    }
    Ok(chunks)
}

pub fn write_uef<W: Write>(mut writer: W, chunks: &[Chunk]) -> Result<()> {
    writer.write_all(UEF_MAGIC)?;
    writer.write_u16::<LittleEndian>(UEF_VERSION)?;

    for chunk in chunks {
        writer.write_u16::<LittleEndian>(chunk.id)?;
        writer.write_u32::<LittleEndian>(chunk.payload.len() as u32)?;
        writer.write_all(&chunk.payload)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CARRIER, IMPLICIT_DATA};
    use std::io::Cursor;

    #[test]
    fn test_uef_roundtrip() {
        let chunks = vec![
            Chunk::new(CARRIER, vec![0xDC, 0x05]),
            Chunk::new(IMPLICIT_DATA, b"Hello".to_vec()),
        ];

        let mut buffer = Vec::new();
        write_uef(&mut buffer, &chunks).unwrap();
        assert_eq!(&buffer[..10], UEF_MAGIC);
        assert_eq!(buffer.len(), 12 + (6 + 2) + (6 + 5));

        let reader = ChunkReader::new(Cursor::new(buffer)).unwrap();
        assert_eq!(reader.version(), UEF_VERSION);
        let decoded: Vec<Chunk> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(decoded, chunks);
    }

    #[test]
    fn test_bad_magic() {
        let result = read_uef(Cursor::new(b"RIFF0000WAVEfmt ".to_vec()));
        match result {
            Err(truncated) => {
                assert!(truncated.partial.is_empty());
                assert!(matches!(truncated.error, TapeError::NotUef));
            }
            Ok(chunks) => panic!("expected an error, got {:?}", chunks),
        }
    }

    #[test]
    fn test_truncated_payload_keeps_earlier_chunks() {
        let mut buffer = Vec::new();
        write_uef(&mut buffer, &[Chunk::new(CARRIER, vec![0x10, 0x00])]).unwrap();
        buffer.extend_from_slice(&IMPLICIT_DATA.to_le_bytes());
        buffer.extend_from_slice(&8u32.to_le_bytes());
        buffer.extend_from_slice(b"abc");

        let (partial, error) = read_uef(Cursor::new(buffer.clone())).unwrap_err().into_parts();
        assert_eq!(partial, vec![Chunk::new(CARRIER, vec![0x10, 0x00])]);
        assert!(matches!(error, TapeError::MalformedChunk { id: IMPLICIT_DATA, .. }));

        let results: Vec<Result<Chunk>> = ChunkReader::new(Cursor::new(buffer)).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().id, CARRIER);
        assert!(matches!(
            results[1],
            Err(TapeError::MalformedChunk { id: IMPLICIT_DATA, .. })
        ));
    }

    #[test]
    fn test_empty_chunk_stream() {
        let mut buffer = Vec::new();
        write_uef(&mut buffer, &[]).unwrap();
        assert!(read_uef(Cursor::new(buffer)).unwrap().is_empty());
    }
}
