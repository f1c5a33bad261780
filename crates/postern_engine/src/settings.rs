use std::fs;
use std::io;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MIN_RESOLUTION_MULTIPLIER: f32 = 0.1;
const MAX_RESOLUTION_MULTIPLIER: f32 = 2.0;
const MIN_NEAR_CLIP: f32 = 0.001;
const MIN_CLIP_SPAN: f32 = 0.001;
const MIN_RECURSION_DEPTH: u32 = 1;
const MAX_RECURSION_DEPTH: u32 = 10;

bitflags! {
    /// Scene layers a portal eye camera is allowed to draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LayerMask: u32 {
        const ALL = u32::MAX;
    }
}

/// Tunables for portal rendering and crossing. Loaded from TOML; every
/// field has a default so a partial file still parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    /// Offscreen target resolution as a fraction of the reference camera's.
    #[serde(default = "default_resolution_multiplier")]
    pub resolution_multiplier: f32,
    #[serde(default = "default_near_clip")]
    pub near_clip: f32,
    #[serde(default = "default_far_clip")]
    pub far_clip: f32,
    #[serde(default = "default_culling_mask")]
    pub culling_mask: LayerMask,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            resolution_multiplier: default_resolution_multiplier(),
            near_clip: default_near_clip(),
            far_clip: default_far_clip(),
            culling_mask: default_culling_mask(),
            max_recursion_depth: default_max_recursion_depth(),
        }
    }
}

impl PortalSettings {
    /// Forces every field into its valid range. Non-finite values fall back
    /// to the defaults before clamping so a corrupt file can never drive a
    /// NaN into the render math.
    pub fn sanitize(mut self) -> Self {
        let original = self.clone();
        if !self.resolution_multiplier.is_finite() {
            self.resolution_multiplier = default_resolution_multiplier();
        }
        self.resolution_multiplier = self
            .resolution_multiplier
            .clamp(MIN_RESOLUTION_MULTIPLIER, MAX_RESOLUTION_MULTIPLIER);
        if !self.near_clip.is_finite() {
            self.near_clip = default_near_clip();
        }
        self.near_clip = self.near_clip.max(MIN_NEAR_CLIP);
        if !self.far_clip.is_finite() {
            self.far_clip = default_far_clip();
        }
        if self.far_clip <= self.near_clip {
            self.far_clip = self.near_clip + MIN_CLIP_SPAN;
        }
        self.max_recursion_depth = self
            .max_recursion_depth
            .clamp(MIN_RECURSION_DEPTH, MAX_RECURSION_DEPTH);
        if self != original {
            warn!("portal settings were out of range and have been clamped");
        }
        self
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let parsed = toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize settings: {e}"),
            )
        })?;
        Ok(parsed.sanitize())
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let settings = self.clone().sanitize();
        let serialized = toml::to_string_pretty(&settings).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize settings: {e}"),
            )
        })?;
        fs::write(path, serialized)
    }
}

fn default_resolution_multiplier() -> f32 {
    1.0
}

fn default_near_clip() -> f32 {
    0.1
}

fn default_far_clip() -> f32 {
    1000.0
}

fn default_culling_mask() -> LayerMask {
    LayerMask::ALL
}

fn default_max_recursion_depth() -> u32 {
    5
}

/// Loads settings, writing a fresh default file when none exists and
/// replacing an unreadable one so the next run starts clean.
pub fn load_or_create(path: &Path) -> PortalSettings {
    match PortalSettings::load(path) {
        Ok(settings) => settings,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let settings = PortalSettings::default();
            if let Err(save_err) = settings.save(path) {
                warn!(
                    "Failed to create default settings at {}: {save_err}",
                    path.display()
                );
            }
            settings
        }
        Err(err) => {
            warn!("Failed to load settings from {}: {err}", path.display());
            let settings = PortalSettings::default();
            if let Err(save_err) = settings.save(path) {
                warn!(
                    "Failed to overwrite settings at {}: {save_err}",
                    path.display()
                );
            }
            settings
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PortalSettings;

    #[test]
    fn defaults_are_already_in_range() {
        let settings = PortalSettings::default();
        assert_eq!(settings, settings.clone().sanitize());
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let settings = PortalSettings {
            resolution_multiplier: 9.0,
            near_clip: -1.0,
            far_clip: 0.0,
            max_recursion_depth: 50,
            ..PortalSettings::default()
        }
        .sanitize();

        assert_eq!(settings.resolution_multiplier, 2.0);
        assert!(settings.near_clip > 0.0);
        assert!(settings.far_clip > settings.near_clip);
        assert_eq!(settings.max_recursion_depth, 10);
    }

    #[test]
    fn sanitize_replaces_non_finite_values_with_defaults() {
        let settings = PortalSettings {
            resolution_multiplier: f32::NAN,
            near_clip: f32::INFINITY,
            far_clip: f32::NAN,
            ..PortalSettings::default()
        }
        .sanitize();

        assert!(settings.resolution_multiplier.is_finite());
        assert!(settings.near_clip.is_finite());
        assert!(settings.far_clip > settings.near_clip);
    }

    #[test]
    fn partial_toml_fills_missing_fields_with_defaults() {
        let parsed: PortalSettings =
            toml::from_str("resolution_multiplier = 0.5").unwrap();
        assert_eq!(parsed.resolution_multiplier, 0.5);
        assert_eq!(parsed.max_recursion_depth, 5);
        assert_eq!(parsed.near_clip, 0.1);
    }
}
