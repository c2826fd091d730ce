use crate::error::{Result, TapeError};
use crate::{BitDepth, Config, SAMPLE_RATE};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

pub fn wav_spec(config: &Config) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: config.bit_depth.bits(),
        sample_format: SampleFormat::Int,
    }
}

/// Writes mono PCM. 8-bit output is stored unsigned around 128.
pub fn write_wav<W: Write + Seek>(writer: W, samples: &[i16], config: &Config) -> Result<()> {
    let mut writer = WavWriter::new(writer, wav_spec(config))?;

    match config.bit_depth {
        BitDepth::Sixteen => {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
        BitDepth::Eight => {
            for &sample in samples {
                let narrow = sample.clamp(i8::MIN as i16, i8::MAX as i16) as i8;
                writer.write_sample(narrow)?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Reads a mono 44100 Hz integer PCM stream of 8 or 16 bits.
pub fn read_wav<R: Read>(reader: R) -> Result<(Vec<i16>, Config)> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(TapeError::UnsupportedFormat(format!(
            "{} channels, expected mono",
            spec.channels
        )));
    }
    if spec.sample_rate != SAMPLE_RATE {
        return Err(TapeError::UnsupportedFormat(format!(
            "sample rate {} Hz, expected {} Hz",
            spec.sample_rate, SAMPLE_RATE
        )));
    }
    let bit_depth = match (spec.sample_format, BitDepth::from_bits(spec.bits_per_sample)) {
        (SampleFormat::Int, Some(depth)) => depth,
        (format, _) => {
            return Err(TapeError::UnsupportedFormat(format!(
                "{:?} samples of {} bits, expected 8 or 16 bit PCM",
                format, spec.bits_per_sample
            )))
        }
    };

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let config = Config {
        sample_rate: spec.sample_rate,
        bit_depth,
    };
    Ok((samples, config))
}

pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[i16], config: &Config) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    write_wav(file, samples, config)
}

pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<i16>, Config)> {
    let file = BufReader::new(File::open(path)?);
    read_wav(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(samples: &[i16], spec: WavSpec) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_sixteen_bit_roundtrip() {
        let samples = vec![0, -32767, 32767, 1234, -5];
        let mut buffer = Cursor::new(Vec::new());
        write_wav(&mut buffer, &samples, &Config::default()).unwrap();

        let bytes = buffer.into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let (decoded, config) = read_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(config.bit_depth, BitDepth::Sixteen);
        assert_eq!(config.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_eight_bit_roundtrip() {
        let config = Config {
            bit_depth: BitDepth::Eight,
            ..Default::default()
        };
        let samples = vec![0, -127, 127, 64, -3, 10];
        let mut buffer = Cursor::new(Vec::new());
        write_wav(&mut buffer, &samples, &config).unwrap();

        let bytes = buffer.into_inner();
        // one byte per sample, silence stored as 128
        assert_eq!(&bytes[bytes.len() - 6..], &[128, 1, 255, 192, 125, 138]);

        let (decoded, read_config) = read_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(read_config.bit_depth, BitDepth::Eight);
    }

    #[test]
    fn test_stereo_rejected() {
        let spec = WavSpec {
            channels: 2,
            ..wav_spec(&Config::default())
        };
        let bytes = encode(&[0, 0, 1, 1], spec);
        assert!(matches!(
            read_wav(Cursor::new(bytes)),
            Err(TapeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_other_sample_rate_rejected() {
        let spec = WavSpec {
            sample_rate: 22050,
            ..wav_spec(&Config::default())
        };
        let bytes = encode(&[0, 1, 2], spec);
        assert!(matches!(
            read_wav(Cursor::new(bytes)),
            Err(TapeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_garbage_is_wav_error() {
        let result = read_wav(Cursor::new(b"UEF File!\0\x01\x00".to_vec()));
        assert!(matches!(result, Err(TapeError::Wav(_))));
    }
}
