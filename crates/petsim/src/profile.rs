use std::collections::HashMap;
use std::fmt;

use crate::config::UniformRange;

pub const DEFAULT_PROFILE_NAME: &str = "default";

/// Category tag declared by the host when a pet is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PetKind(String);

impl PetKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PetKind {
    fn default() -> Self {
        Self(DEFAULT_PROFILE_NAME.to_string())
    }
}

impl fmt::Display for PetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PetKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Per-kind tuning that movement, depth and shadows read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PetProfile {
    /// `None` falls back to the global speed range.
    pub speed_range: Option<UniformRange>,
    /// Fraction of the sprite height at which the feet touch the ground.
    pub foot_ratio: f32,
    /// Shadow width as a fraction of the sprite width.
    pub shadow_ratio: f32,
    /// Render scale the host applies to the sprite.
    pub scale: f32,
    /// Vertical activity band, fractions of container height.
    pub band_top: f32,
    pub band_bottom: f32,
    pub casts_shadow: bool,
}

impl Default for PetProfile {
    fn default() -> Self {
        Self {
            speed_range: None,
            foot_ratio: 0.95,
            shadow_ratio: 0.8,
            scale: 1.0,
            band_top: 0.0,
            band_bottom: 1.0,
            casts_shadow: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileTable {
    fallback: PetProfile,
    profiles_by_name: HashMap<String, PetProfile>,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileTable {
    /// Table containing only the `default` profile.
    pub fn empty() -> Self {
        Self {
            fallback: PetProfile::default(),
            profiles_by_name: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert(
            "egg",
            PetProfile {
                speed_range: Some(UniformRange::new(0.2, 0.4)),
                foot_ratio: 0.9,
                shadow_ratio: 0.7,
                scale: 0.8,
                band_top: 0.45,
                band_bottom: 1.0,
                casts_shadow: true,
            },
        );
        table.insert(
            "cat",
            PetProfile {
                foot_ratio: 0.92,
                shadow_ratio: 0.75,
                ..PetProfile::default()
            },
        );
        table.insert(
            "dog",
            PetProfile {
                foot_ratio: 0.93,
                shadow_ratio: 0.85,
                scale: 1.1,
                ..PetProfile::default()
            },
        );
        table.insert(
            "bird",
            PetProfile {
                speed_range: Some(UniformRange::new(0.6, 1.2)),
                foot_ratio: 0.85,
                shadow_ratio: 0.5,
                scale: 0.7,
                band_bottom: 0.8,
                ..PetProfile::default()
            },
        );
        table
    }

    /// Inserting under `default` replaces the fallback profile.
    pub fn insert(&mut self, name: &str, profile: PetProfile) {
        if name == DEFAULT_PROFILE_NAME {
            self.fallback = profile;
        } else {
            self.profiles_by_name.insert(name.to_string(), profile);
        }
    }

    pub fn contains(&self, kind: &PetKind) -> bool {
        kind.as_str() == DEFAULT_PROFILE_NAME || self.profiles_by_name.contains_key(kind.as_str())
    }

    pub fn resolve(&self, kind: &PetKind) -> &PetProfile {
        self.profiles_by_name
            .get(kind.as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &PetProfile {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.profiles_by_name.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
