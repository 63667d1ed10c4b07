use std::collections::HashSet;

use glam::Vec2;
use winit::keyboard::KeyCode;

#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pub mouse_delta: Vec2,
}

impl InputState {
    pub fn press_key(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True from the moment the key went down until a fixed tick consumed it.
    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn add_mouse_delta(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    /// Mouse look is sampled once per rendered frame.
    pub fn clear_mouse_delta(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }

    /// Call only after a frame that ran at least one fixed tick. Edges latch
    /// across frames that run zero ticks, so at display rates above the tick
    /// rate a tap cannot vanish before the simulation has seen it.
    pub fn clear_just_pressed(&mut self) {
        self.just_pressed_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use winit::keyboard::KeyCode;

    use super::InputState;

    #[test]
    fn just_pressed_clears_once_consumed() {
        let mut input = InputState::default();
        input.press_key(KeyCode::Space);
        assert!(input.just_pressed(KeyCode::Space));
        assert!(input.is_pressed(KeyCode::Space));

        input.clear_just_pressed();
        assert!(!input.just_pressed(KeyCode::Space));
        assert!(input.is_pressed(KeyCode::Space));
    }

    #[test]
    fn os_key_repeat_does_not_retrigger() {
        let mut input = InputState::default();
        input.press_key(KeyCode::Space);
        input.clear_just_pressed();
        input.press_key(KeyCode::Space);
        assert!(!input.just_pressed(KeyCode::Space));

        input.release_key(KeyCode::Space);
        input.press_key(KeyCode::Space);
        assert!(input.just_pressed(KeyCode::Space));
    }

    #[test]
    fn tap_latches_across_frames_without_a_tick() {
        let mut input = InputState::default();
        input.press_key(KeyCode::Space);

        // Three fast frames end with no fixed tick having run; only the
        // mouse delta resets, so the edge survives.
        for _ in 0..3 {
            input.clear_mouse_delta();
        }
        assert!(input.just_pressed(KeyCode::Space));

        // The first frame that ticks consumes it.
        input.clear_just_pressed();
        input.clear_mouse_delta();
        assert!(!input.just_pressed(KeyCode::Space));
    }
}
