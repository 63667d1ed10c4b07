use tracing::warn;

/// Fixed-timestep accumulator. Rendered frames arrive at whatever cadence the
/// display drives; simulation ticks run at a fixed interval, zero or more per
/// frame. The per-frame phase order is fixed ticks, then late-update, then
/// pre-render; crossing detection must settle before any portal view is
/// rendered.
#[derive(Debug)]
pub struct FrameClock {
    fixed_dt: f32,
    accumulator: f32,
    max_ticks_per_frame: u32,
}

impl FrameClock {
    pub const DEFAULT_TICK_RATE_HZ: f32 = 60.0;
    const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 8;

    pub fn new(tick_rate_hz: f32) -> Self {
        Self {
            fixed_dt: 1.0 / tick_rate_hz.max(1.0),
            accumulator: 0.0,
            max_ticks_per_frame: Self::DEFAULT_MAX_TICKS_PER_FRAME,
        }
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Feeds one rendered frame's wall-clock delta and returns how many fixed
    /// ticks to run. A stall longer than the tick budget sheds the excess
    /// instead of spiraling.
    pub fn advance(&mut self, frame_dt: f32) -> u32 {
        self.accumulator += frame_dt.max(0.0);

        let mut ticks = 0;
        while self.accumulator >= self.fixed_dt {
            self.accumulator -= self.fixed_dt;
            ticks += 1;
            if ticks >= self.max_ticks_per_frame {
                if self.accumulator >= self.fixed_dt {
                    warn!(
                        "frame stalled; dropping {:.3}s of simulation time",
                        self.accumulator
                    );
                    self.accumulator = 0.0;
                }
                break;
            }
        }
        ticks
    }

    /// Fraction of a tick accumulated but not yet simulated, for render
    /// interpolation.
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.fixed_dt).clamp(0.0, 1.0)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TICK_RATE_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameClock;

    #[test]
    fn short_frame_runs_no_tick() {
        let mut clock = FrameClock::new(60.0);
        assert_eq!(clock.advance(0.001), 0);
        assert!(clock.alpha() > 0.0);
    }

    #[test]
    fn accumulated_frames_eventually_tick() {
        let mut clock = FrameClock::new(60.0);
        let mut total = 0;
        for _ in 0..4 {
            total += clock.advance(0.005);
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn long_frame_runs_multiple_ticks() {
        let mut clock = FrameClock::new(60.0);
        assert_eq!(clock.advance(3.5 / 60.0), 3);
    }

    #[test]
    fn stalled_frame_is_clamped() {
        let mut clock = FrameClock::new(60.0);
        let ticks = clock.advance(10.0);
        assert_eq!(ticks, 8);
        // Excess time was shed; the next normal frame behaves normally.
        assert_eq!(clock.advance(1.0 / 60.0), 1);
    }
}
