//! Link configuration.

use crate::error::{LinkError, LinkResult};

/// Capacities and rates for one link.
///
/// All capacities are fixed at allocation time; nothing grows. Ring
/// capacities must be powers of two (one slot is always kept empty to
/// distinguish full from empty, so a 256-slot ring holds 255 records).
/// Defaults are sized for the worst-case per-tick burst of a typical
/// scene rather than the average.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Command ring capacity (main -> physics).
    pub command_capacity: u32,
    /// Collision event ring capacity (physics -> main).
    pub contact_capacity: u32,
    /// Character-controller event ring capacity (physics -> main).
    pub controller_capacity: u32,
    /// Snapshot body ceiling per published slot; excess bodies are
    /// silently truncated.
    pub snapshot_max_bodies: u32,
    /// Fixed simulation step rate in Hz.
    pub step_hz: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            contact_capacity: 256,
            controller_capacity: 64,
            snapshot_max_bodies: 1024,
            step_hz: 60,
        }
    }
}

impl LinkConfig {
    /// Seconds per fixed simulation step.
    pub fn step_seconds(&self) -> f32 {
        1.0 / self.step_hz as f32
    }

    pub(crate) fn validate(&self) -> LinkResult<()> {
        for (name, cap) in [
            ("command_capacity", self.command_capacity),
            ("contact_capacity", self.contact_capacity),
            ("controller_capacity", self.controller_capacity),
        ] {
            if cap < 2 || !cap.is_power_of_two() {
                return Err(LinkError::Config(format!(
                    "{name} must be a power of two >= 2, got {cap}"
                )));
            }
        }
        if self.snapshot_max_bodies == 0 {
            return Err(LinkError::Config(
                "snapshot_max_bodies must be non-zero".to_string(),
            ));
        }
        if self.step_hz == 0 || self.step_hz > 1000 {
            return Err(LinkError::Config(format!(
                "step_hz must be in 1..=1000, got {}",
                self.step_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LinkConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_ring() {
        let cfg = LinkConfig {
            command_capacity: 100,
            ..LinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
