#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::Path;

use dmg_core::sink::*;

/// Discards every frame. Used by conformance tests that only care about
/// serial/memory output, not the rendered picture.
pub struct NullSink;

impl Sink<VideoFrame> for NullSink {
    fn append(&mut self, _value: VideoFrame) {}
}

impl Sink<AudioFrame> for NullSink {
    fn append(&mut self, _value: AudioFrame) {}
}

/// Keeps only the latest frame pushed, discarding everything older. Used by
/// golden-frame tests, which only care about the picture at the moment the
/// test ROM signals completion.
pub struct MostRecentSink {
    inner: Option<VideoFrame>,
}

impl MostRecentSink {
    pub fn new() -> Self {
        MostRecentSink { inner: None }
    }

    pub fn has_frame(&self) -> bool {
        self.inner.is_some()
    }

    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.inner.take()
    }
}

impl Sink<VideoFrame> for MostRecentSink {
    fn append(&mut self, value: VideoFrame) {
        self.inner = Some(value);
    }
}

/// Loads a ROM fixture relative to the crate root. Conformance tests that
/// need a real commercial or third-party test ROM are marked `#[ignore]`
/// with the expected fixture path, since this pack carries no ROM images.
pub fn load_rom_fixture(path: &str) -> io::Result<Vec<u8>> {
    fs::read(Path::new(env!("CARGO_MANIFEST_DIR")).join(path))
}

/// Drives `gb` until a byte appears on the serial port containing `needle`,
/// or until `max_frames` frames have elapsed without it (Blargg-style test
/// ROMs print their pass/fail banner over serial rather than to the
/// framebuffer).
pub fn run_until_serial_contains(
    gb: &mut dmg_core::gb::Gameboy,
    needle: &str,
    max_frames: u32,
) -> String {
    let mut output = String::new();
    for _ in 0..max_frames {
        gb.tick();
        while let Some(byte) = gb.poll_serial_byte() {
            output.push(byte as char);
        }
        if output.contains(needle) || output.contains("Failed") {
            break;
        }
    }
    output
}
