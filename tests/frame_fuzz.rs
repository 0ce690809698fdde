//! Randomised frame corruption tests.
//!
//! A single flipped bit anywhere in the checksummed bytes (type, length,
//! payload, checksum, timestamp) must never yield a frame that both decodes
//! and verifies.  Padding after the payload is not covered and is skipped.

use rand::Rng;

use distort_dispatch::error::FrameError;
use distort_dispatch::frame::{Frame, FrameType, FRAME_SIZE, MAX_DATA_LEN};

const TYPES: [FrameType; 6] = [
    FrameType::Connect,
    FrameType::WorkerConnect,
    FrameType::WorkerRequest,
    FrameType::Disconnect,
    FrameType::Error,
    FrameType::Distort,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn random_frame(rng: &mut impl Rng) -> Frame {
    let frame_type = TYPES[rng.random_range(0..TYPES.len())];
    let len = rng.random_range(0..=MAX_DATA_LEN);
    let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    Frame::with_timestamp(frame_type, data, rng.random()).unwrap()
}

/// Offsets of every byte the checksum protects, plus the checksum itself.
fn covered_offsets(len: usize) -> Vec<usize> {
    (0..3 + len).chain(250..FRAME_SIZE).collect()
}

fn accepted(buf: &[u8; FRAME_SIZE]) -> bool {
    match Frame::decode(buf) {
        Ok(frame) => frame.verify().is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn fuzz_random_frames_roundtrip() {
    let mut rng = rand::rng();
    for _ in 0..500 {
        let frame = random_frame(&mut rng);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        decoded.verify().unwrap();
        assert_eq!(decoded, frame);
    }
}

#[test]
fn fuzz_single_bit_flips_are_rejected() {
    let mut rng = rand::rng();
    for _ in 0..2000 {
        let frame = random_frame(&mut rng);
        let mut buf = frame.encode();
        let offsets = covered_offsets(frame.data.len());
        let offset = offsets[rng.random_range(0..offsets.len())];
        let bit = rng.random_range(0..8);
        buf[offset] ^= 1 << bit;

        assert!(
            !accepted(&buf),
            "flip of bit {bit} at offset {offset} went undetected ({:?}, len {})",
            frame.frame_type,
            frame.data.len()
        );
    }
}

#[test]
fn fuzz_every_bit_of_one_frame() {
    let frame = Frame::with_timestamp(FrameType::Distort, b"Text&notes.txt".to_vec(), 1_700_000_000)
        .unwrap();
    let clean = frame.encode();
    for offset in covered_offsets(frame.data.len()) {
        for bit in 0..8 {
            let mut buf = clean;
            buf[offset] ^= 1 << bit;
            assert!(!accepted(&buf), "bit {bit} at offset {offset}");
        }
    }
}

#[test]
fn fuzz_random_garbage_never_panics() {
    let mut rng = rand::rng();
    for _ in 0..1000 {
        let mut buf = [0u8; FRAME_SIZE];
        rng.fill(&mut buf[..]);
        // Only the outcome type matters; decoding must not panic.
        let _ = accepted(&buf);
    }
}

#[test]
fn maximum_declared_length_is_malformed() {
    let mut buf = Frame::error().encode();
    buf[1] = 0xff;
    buf[2] = 0xff;
    assert_eq!(
        Frame::decode(&buf).unwrap_err(),
        FrameError::MalformedFrame {
            declared: u16::MAX,
            max: MAX_DATA_LEN
        }
    );
}
