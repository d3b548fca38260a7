use common::{PlayerError, Result};

pub const SPEED_STEPS: [f64; 8] = [0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0];
const NORMAL_INDEX: usize = 3;

/// Playback rate stepping through fixed powers of two
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedLadder {
    index: usize,
}

impl Default for SpeedLadder {
    fn default() -> Self {
        Self { index: NORMAL_INDEX }
    }
}

impl SpeedLadder {
    pub fn current(&self) -> f64 {
        SPEED_STEPS[self.index]
    }

    pub fn is_min(&self) -> bool {
        self.index == 0
    }

    pub fn is_max(&self) -> bool {
        self.index == SPEED_STEPS.len() - 1
    }

    /// Returns the new rate, or `None` when already at the top.
    pub fn increase(&mut self, blocked: bool) -> Result<Option<f64>> {
        if blocked {
            return Err(PlayerError::ArchiveBlocked("speed change".to_string()));
        }
        if self.is_max() {
            return Ok(None);
        }
        self.index += 1;
        Ok(Some(self.current()))
    }

    pub fn decrease(&mut self, blocked: bool) -> Result<Option<f64>> {
        if blocked {
            return Err(PlayerError::ArchiveBlocked("speed change".to_string()));
        }
        if self.is_min() {
            return Ok(None);
        }
        self.index -= 1;
        Ok(Some(self.current()))
    }

    /// Cap faster-than-normal playback back to 1x; returns whether anything changed.
    pub fn cap_to_normal(&mut self) -> bool {
        if self.index > NORMAL_INDEX {
            self.index = NORMAL_INDEX;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.index = NORMAL_INDEX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_bounds() {
        let mut speed = SpeedLadder::default();
        assert_eq!(speed.current(), 1.0);

        for _ in 0..4 {
            speed.increase(false).unwrap();
        }
        assert_eq!(speed.current(), 16.0);
        assert_eq!(speed.increase(false).unwrap(), None);

        for _ in 0..7 {
            speed.decrease(false).unwrap();
        }
        assert_eq!(speed.current(), 0.125);
        assert_eq!(speed.decrease(false).unwrap(), None);
    }

    #[test]
    fn test_blocked_camera_keeps_speed() {
        let mut speed = SpeedLadder::default();
        assert!(speed.increase(true).is_err());
        assert!(speed.decrease(true).is_err());
        assert_eq!(speed.current(), 1.0);
    }

    #[test]
    fn test_cap_only_lowers_fast_rates() {
        let mut speed = SpeedLadder::default();
        speed.decrease(false).unwrap();
        assert!(!speed.cap_to_normal());
        assert_eq!(speed.current(), 0.5);

        speed.reset();
        speed.increase(false).unwrap();
        assert!(speed.cap_to_normal());
        assert_eq!(speed.current(), 1.0);
    }
}
