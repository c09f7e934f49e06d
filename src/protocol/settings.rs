//! Environment settings over the dirty-flag channel.
//!
//! Low-frequency, editor-style values: fog, sun, ambient light, shadow
//! quality, time scale, wind. Multiple setter calls between worker ticks
//! coalesce behind one flag publish; the consumer applies only the fields
//! whose bit it claimed, clamping or normalizing each one.

use glam::{Vec3, Vec4};

use crate::channel::dirty::{dirty_channel, DirtyConsumer, DirtyProducer};
use crate::error::LinkResult;
use crate::region::Band;

/// Dirty bits, one per logical field.
pub mod bits {
    pub const FOG_COLOR: u32 = 1 << 0;
    pub const FOG_DENSITY: u32 = 1 << 1;
    pub const SUN_DIRECTION: u32 = 1 << 2;
    pub const SUN_INTENSITY: u32 = 1 << 3;
    pub const AMBIENT_COLOR: u32 = 1 << 4;
    pub const SHADOW_MAP_SIZE: u32 = 1 << 5;
    pub const TIME_SCALE: u32 = 1 << 6;
    pub const WIND: u32 = 1 << 7;

    pub const ALL: u32 = FOG_COLOR
        | FOG_DENSITY
        | SUN_DIRECTION
        | SUN_INTENSITY
        | AMBIENT_COLOR
        | SHADOW_MAP_SIZE
        | TIME_SCALE
        | WIND;
}

// Word offsets of each field within the bank.
mod word {
    pub const FOG_COLOR: usize = 0; // vec3
    pub const FOG_DENSITY: usize = 3;
    pub const SUN_DIRECTION: usize = 4; // vec3
    pub const SUN_INTENSITY: usize = 7;
    pub const AMBIENT_COLOR: usize = 8; // vec3
    pub const SHADOW_MAP_SIZE: usize = 11;
    pub const TIME_SCALE: usize = 12;
    pub const WIND: usize = 13; // vec4: direction xyz + strength
}

/// Total field bank size in words.
pub const SETTINGS_BANK_WORDS: usize = 17;

/// Allowed shadow map resolutions; requested sizes snap to the nearest.
pub const SHADOW_MAP_BUCKETS: [u32; 4] = [512, 1024, 2048, 4096];

/// Live environment state on the consumer side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvState {
    pub fog_color: Vec3,
    /// Exponential fog density, clamped to [0, 1].
    pub fog_density: f32,
    /// Unit vector pointing from the sun toward the scene.
    pub sun_direction: Vec3,
    /// Clamped to [0, 16].
    pub sun_intensity: f32,
    pub ambient_color: Vec3,
    pub shadow_map_size: u32,
    /// Simulation time multiplier, clamped to [0, 4].
    pub time_scale: f32,
    /// Direction xyz (normalized) + strength in w, strength clamped to
    /// [0, 64].
    pub wind: Vec4,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            fog_color: Vec3::new(0.55, 0.6, 0.7),
            fog_density: 0.015,
            sun_direction: Vec3::new(-0.3, -1.0, -0.2).normalize(),
            sun_intensity: 1.0,
            ambient_color: Vec3::splat(0.25),
            shadow_map_size: 2048,
            time_scale: 1.0,
            wind: Vec4::new(1.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Bind both endpoints of the settings channel over `band`.
pub fn settings_channel(band: &Band) -> LinkResult<(SettingsHandle, SettingsConsumer)> {
    let (producer, consumer) = dirty_channel(band, "settings", SETTINGS_BANK_WORDS)?;
    Ok((
        SettingsHandle { producer },
        SettingsConsumer { consumer },
    ))
}

/// Editor/main-thread handle: per-field setters.
///
/// Each setter writes the raw field words, then publishes the field's bit;
/// nothing is visible to the simulation until the next `sync` claims it.
pub struct SettingsHandle {
    producer: DirtyProducer,
}

impl SettingsHandle {
    fn write_vec3(&mut self, at: usize, value: Vec3) {
        self.producer.write_f32(at, value.x);
        self.producer.write_f32(at + 1, value.y);
        self.producer.write_f32(at + 2, value.z);
    }

    pub fn set_fog_color(&mut self, color: Vec3) {
        self.write_vec3(word::FOG_COLOR, color);
        self.producer.publish(bits::FOG_COLOR);
    }

    pub fn set_fog_density(&mut self, density: f32) {
        self.producer.write_f32(word::FOG_DENSITY, density);
        self.producer.publish(bits::FOG_DENSITY);
    }

    pub fn set_sun_direction(&mut self, direction: Vec3) {
        self.write_vec3(word::SUN_DIRECTION, direction);
        self.producer.publish(bits::SUN_DIRECTION);
    }

    pub fn set_sun_intensity(&mut self, intensity: f32) {
        self.producer.write_f32(word::SUN_INTENSITY, intensity);
        self.producer.publish(bits::SUN_INTENSITY);
    }

    pub fn set_ambient_color(&mut self, color: Vec3) {
        self.write_vec3(word::AMBIENT_COLOR, color);
        self.producer.publish(bits::AMBIENT_COLOR);
    }

    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.producer.write_word(word::SHADOW_MAP_SIZE, size);
        self.producer.publish(bits::SHADOW_MAP_SIZE);
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.producer.write_f32(word::TIME_SCALE, scale);
        self.producer.publish(bits::TIME_SCALE);
    }

    pub fn set_wind(&mut self, wind: Vec4) {
        self.write_vec3(word::WIND, wind.truncate());
        self.producer.write_f32(word::WIND + 3, wind.w);
        self.producer.publish(bits::WIND);
    }

    /// Bootstrap publish: write every field from `env` and raise every
    /// bit at once, so a freshly attached consumer initializes its visible
    /// state without a separate handshake.
    pub fn publish_all(&mut self, env: &EnvState) {
        self.write_vec3(word::FOG_COLOR, env.fog_color);
        self.producer.write_f32(word::FOG_DENSITY, env.fog_density);
        self.write_vec3(word::SUN_DIRECTION, env.sun_direction);
        self.producer.write_f32(word::SUN_INTENSITY, env.sun_intensity);
        self.write_vec3(word::AMBIENT_COLOR, env.ambient_color);
        self.producer
            .write_word(word::SHADOW_MAP_SIZE, env.shadow_map_size);
        self.producer.write_f32(word::TIME_SCALE, env.time_scale);
        self.write_vec3(word::WIND, env.wind.truncate());
        self.producer.write_f32(word::WIND + 3, env.wind.w);
        self.producer.publish(bits::ALL);
    }
}

/// Simulation-side consumer: claims pending bits and applies fields.
pub struct SettingsConsumer {
    consumer: DirtyConsumer,
}

impl SettingsConsumer {
    fn read_vec3(&mut self, at: usize) -> Vec3 {
        Vec3::new(
            self.consumer.read_f32(at),
            self.consumer.read_f32(at + 1),
            self.consumer.read_f32(at + 2),
        )
    }

    /// Apply every pending field to `env`. Returns the claimed bit mask;
    /// zero means nothing changed and `env` was not touched. Calling twice
    /// with no intervening writes is a no-op the second time.
    pub fn sync(&mut self, env: &mut EnvState) -> u32 {
        let claimed = self.consumer.claim();
        if claimed == 0 {
            return 0;
        }

        if claimed & bits::FOG_COLOR != 0 {
            env.fog_color = self.read_vec3(word::FOG_COLOR).clamp(Vec3::ZERO, Vec3::ONE);
        }
        if claimed & bits::FOG_DENSITY != 0 {
            env.fog_density = self.consumer.read_f32(word::FOG_DENSITY).clamp(0.0, 1.0);
        }
        if claimed & bits::SUN_DIRECTION != 0 {
            env.sun_direction = normalize_direction(self.read_vec3(word::SUN_DIRECTION));
        }
        if claimed & bits::SUN_INTENSITY != 0 {
            env.sun_intensity = self.consumer.read_f32(word::SUN_INTENSITY).clamp(0.0, 16.0);
        }
        if claimed & bits::AMBIENT_COLOR != 0 {
            env.ambient_color = self
                .read_vec3(word::AMBIENT_COLOR)
                .clamp(Vec3::ZERO, Vec3::ONE);
        }
        if claimed & bits::SHADOW_MAP_SIZE != 0 {
            env.shadow_map_size = snap_shadow_map_size(self.consumer.read_word(word::SHADOW_MAP_SIZE));
        }
        if claimed & bits::TIME_SCALE != 0 {
            env.time_scale = self.consumer.read_f32(word::TIME_SCALE).clamp(0.0, 4.0);
        }
        if claimed & bits::WIND != 0 {
            let direction = normalize_direction(self.read_vec3(word::WIND));
            let strength = self.consumer.read_f32(word::WIND + 3).clamp(0.0, 64.0);
            env.wind = direction.extend(strength);
        }

        claimed
    }
}

fn normalize_direction(v: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(Vec3::NEG_Y)
}

/// Snap to the nearest allowed shadow map resolution.
fn snap_shadow_map_size(requested: u32) -> u32 {
    *SHADOW_MAP_BUCKETS
        .iter()
        .min_by_key(|&&bucket| bucket.abs_diff(requested))
        .unwrap_or(&SHADOW_MAP_BUCKETS[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_sizes_snap_to_buckets() {
        assert_eq!(snap_shadow_map_size(0), 512);
        assert_eq!(snap_shadow_map_size(700), 512);
        assert_eq!(snap_shadow_map_size(800), 1024);
        assert_eq!(snap_shadow_map_size(3000), 2048);
        assert_eq!(snap_shadow_map_size(100_000), 4096);
    }

    #[test]
    fn degenerate_directions_fall_back() {
        assert_eq!(normalize_direction(Vec3::ZERO), Vec3::NEG_Y);
        let n = normalize_direction(Vec3::new(3.0, 0.0, 0.0));
        assert!((n.length() - 1.0).abs() < 1e-6);
    }
}
