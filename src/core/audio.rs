use log::debug;

/* ============================== Public API ============================== */

/// Song clock the engine reads once per tick. Real playback devices implement
/// this outside the crate; `ManualClock` drives tests and the headless runner.
pub trait AudioClock {
    fn current_time_seconds(&self) -> f32;
    fn is_playing(&self) -> bool;
    fn play(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, seconds: f32);
}

/// Clock advanced by hand. Stops by itself on reaching the song length.
#[derive(Clone, Debug)]
pub struct ManualClock {
    time: f32,
    length: f32,
    playing: bool,
}

impl ManualClock {
    pub fn new(length_seconds: f32) -> Self {
        let length = if length_seconds.is_finite() {
            length_seconds.max(0.0)
        } else {
            0.0
        };
        Self { time: 0.0, length, playing: false }
    }

    #[inline(always)]
    pub const fn length_seconds(&self) -> f32 {
        self.length
    }

    /// Moves the clock forward by `delta` seconds if it is playing.
    pub fn advance(&mut self, delta: f32) {
        if !self.playing || !delta.is_finite() || delta <= 0.0 {
            return;
        }
        self.time += delta;
        if self.time >= self.length {
            self.time = self.length;
            self.playing = false;
            debug!("Manual clock reached the end of the song at {:.3}s.", self.length);
        }
    }
}

impl AudioClock for ManualClock {
    #[inline(always)]
    fn current_time_seconds(&self) -> f32 {
        self.time
    }

    #[inline(always)]
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = self.time < self.length;
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.time = seconds.clamp(0.0, self.length);
        }
    }
}
