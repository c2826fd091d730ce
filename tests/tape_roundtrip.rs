use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use uef_tape::{
    crc16, demodulate, modulate, package_binary, parse_block_header, read_uef, read_wav,
    write_uef, write_wav, BitDepth, Block, Chunk, Config, TapeFile, CARRIER, FLOAT_GAP,
    IMPLICIT_DATA, INTEGER_GAP, SAMPLE_RATE,
};

fn render(blocks: &[Block]) -> Vec<i16> {
    let chunks: Vec<Chunk> = blocks.iter().map(Block::to_chunk).collect();
    modulate(&chunks, &Config::default()).unwrap().samples
}

fn ids(chunks: &[Chunk]) -> Vec<u16> {
    chunks.iter().map(|c| c.id).collect()
}

#[test]
fn test_every_byte_value_survives_framing() {
    for value in 0..=255u8 {
        let samples = render(&[
            Block::Carrier { cycles: 20 },
            Block::ImplicitData(vec![value]),
            Block::Carrier { cycles: 20 },
        ]);
        let (chunks, _) = demodulate(&samples, &Config::default()).unwrap();

        assert_eq!(
            ids(&chunks),
            vec![CARRIER, IMPLICIT_DATA, CARRIER],
            "byte {:#04x}",
            value
        );
        assert_eq!(chunks[1].payload, vec![value], "byte {:#04x}", value);
    }
}

#[test]
fn test_carrier_needs_nineteen_cycles() {
    let short = render(&[
        Block::Carrier { cycles: 18 },
        Block::ImplicitData(b"A".to_vec()),
    ]);
    let (chunks, _) = demodulate(&short, &Config::default()).unwrap();
    assert_eq!(ids(&chunks), vec![IMPLICIT_DATA]);
    assert_eq!(chunks[0].payload, vec![0x41]);

    let long = render(&[
        Block::Carrier { cycles: 19 },
        Block::ImplicitData(b"A".to_vec()),
    ]);
    let (chunks, _) = demodulate(&long, &Config::default()).unwrap();
    assert_eq!(ids(&chunks), vec![CARRIER, IMPLICIT_DATA]);
    assert_eq!(chunks[0].decode().unwrap(), Block::Carrier { cycles: 19 });
    assert_eq!(chunks[1].payload, vec![0x41]);
}

#[test]
fn test_resync_after_noise() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut samples: Vec<i16> = (0..200).map(|_| rng.gen_range(-20000..=20000)).collect();
    samples.extend(render(&[
        Block::Carrier { cycles: 30 },
        Block::ImplicitData(b"A".to_vec()),
    ]));

    let (chunks, diagnostics) = demodulate(&samples, &Config::default()).unwrap();
    assert_eq!(ids(&chunks), vec![FLOAT_GAP, CARRIER, IMPLICIT_DATA]);
    assert_eq!(chunks[2].payload, vec![0x41]);

    let gap = diagnostics.spans[0];
    assert_eq!(gap.start, 0);
    assert!((190..=200).contains(&gap.end), "gap ends at {}", gap.end);
    assert_eq!(diagnostics.spans[1].start, gap.end);
}

#[test]
fn test_block_sequence_roundtrip() {
    let samples = render(&[
        Block::Carrier { cycles: 100 },
        Block::ImplicitData(b"HELLO".to_vec()),
        Block::IntegerGap { cycles: 200 },
        Block::Carrier { cycles: 50 },
        Block::ImplicitData(vec![0x00, 0xFF, 0x80]),
    ]);
    let (chunks, diagnostics) = demodulate(&samples, &Config::default()).unwrap();

    assert_eq!(
        ids(&chunks),
        vec![CARRIER, IMPLICIT_DATA, FLOAT_GAP, CARRIER, IMPLICIT_DATA]
    );
    assert_eq!(chunks[1].payload, b"HELLO".to_vec());
    assert_eq!(chunks[4].payload, vec![0x00, 0xFF, 0x80]);

    // Spans tile the whole recording.
    assert_eq!(diagnostics.spans[0].start, 0);
    for pair in diagnostics.spans.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert_eq!(diagnostics.spans.last().unwrap().end, samples.len());

    for (chunk, span) in chunks.iter().zip(&diagnostics.spans) {
        let seconds = span.len() as f64 / SAMPLE_RATE as f64;
        match chunk.decode().unwrap() {
            Block::Carrier { cycles } => {
                assert_eq!(cycles, (seconds * 2400.0).round() as u16);
            }
            Block::FloatGap(gap) => {
                assert_eq!(gap, (seconds / 2.0) as f32);
                assert!((200 * 18 - 1..=200 * 18).contains(&span.len()));
            }
            Block::ImplicitData(_) => {}
            other => panic!("unexpected block {:?}", other),
        }
    }
}

#[test]
fn test_packaged_binary_roundtrip() {
    let data: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
    let chunks = package_binary("GAME", &data, 0x1900, 0x1900);

    let recording = modulate(&chunks, &Config::default()).unwrap();
    assert_eq!(recording.markers.len(), 1);
    assert_eq!(recording.markers[0].description, "GAME");
    assert_eq!(recording.markers[0].timestamp(), "00:01");
    assert!(recording.encountered.contains(&CARRIER));
    assert!(recording.encountered.contains(&INTEGER_GAP));
    assert!(recording.diagnostics.ignored.is_empty());

    let (decoded, _) = demodulate(&recording.samples, &Config::default()).unwrap();
    assert_eq!(
        ids(&decoded),
        vec![
            CARRIER,
            IMPLICIT_DATA,
            CARRIER,
            IMPLICIT_DATA,
            CARRIER,
            IMPLICIT_DATA,
            CARRIER,
            FLOAT_GAP,
        ]
    );

    let file = TapeFile::new("GAME", &data, 0x1900);
    assert_eq!(decoded[1].payload, chunks[1].payload);
    assert_eq!(decoded[3].payload, file.block(0));
    assert_eq!(decoded[5].payload, file.block(1));
    assert_eq!(
        parse_block_header(&decoded[5].payload),
        Some(("GAME".to_string(), 1))
    );

    let tail = &decoded[5].payload;
    assert_eq!(
        &tail[tail.len() - 2..],
        &crc16(&data[256..]).to_be_bytes()
    );
}

#[test]
fn test_files_roundtrip_in_memory() {
    let chunks = vec![
        Block::Carrier { cycles: 40 },
        Block::ImplicitData(b"UEF".to_vec()),
        Block::Carrier { cycles: 40 },
        Chunk::new(0x0000, b"origin".to_vec()).decode().unwrap(),
    ]
    .iter()
    .map(Block::to_chunk)
    .collect::<Vec<_>>();

    let mut uef = Vec::new();
    write_uef(&mut uef, &chunks).unwrap();
    let read_back = read_uef(Cursor::new(uef)).unwrap();
    assert_eq!(read_back, chunks);

    for bit_depth in [BitDepth::Sixteen, BitDepth::Eight] {
        let config = Config {
            bit_depth,
            ..Default::default()
        };
        let recording = modulate(&read_back, &config).unwrap();
        assert!(recording.diagnostics.ignored.contains(&0x0000));

        let mut wav = Cursor::new(Vec::new());
        write_wav(&mut wav, &recording.samples, &config).unwrap();
        let (samples, wav_config) = read_wav(Cursor::new(wav.into_inner())).unwrap();
        assert_eq!(wav_config.bit_depth, bit_depth);

        let (decoded, _) = demodulate(&samples, &wav_config).unwrap();
        assert_eq!(ids(&decoded), vec![CARRIER, IMPLICIT_DATA, CARRIER]);
        assert_eq!(decoded[1].payload, b"UEF".to_vec());
    }
}
