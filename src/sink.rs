/// Accepts values produced by the machine as it runs, without the core
/// knowing or caring where they end up (a window, a file, a test harness).
pub trait Sink<T> {
    fn append(&mut self, value: T);
}

/// One fully rendered frame: `SCREEN_WIDTH * SCREEN_HEIGHT` pixels, 4 bytes
/// per pixel (RGBA8), row-major starting at the top-left.
pub type VideoFrame = Box<[u8]>;

/// One stereo audio sample pair, left then right.
pub type AudioFrame = (f32, f32);
