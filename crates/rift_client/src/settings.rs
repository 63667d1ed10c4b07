use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.toml";

const MIN_MOUSE_SENSITIVITY: f32 = 0.05;
const MAX_MOUSE_SENSITIVITY: f32 = 10.0;
const MIN_FOV: f32 = 40.0;
const MAX_FOV: f32 = 110.0;
const MAX_PORTAL_RECURSION: u32 = 8;
const MIN_PORTAL_VIEW_SCALE: f32 = 0.25;
const MAX_PORTAL_VIEW_SCALE: f32 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_portal_recursion")]
    pub portal_recursion: u32,
    /// Portal view textures are sized at this fraction of the display
    /// resolution. 1.0 matches the display; lower trades fidelity for fill
    /// rate on deep recursion.
    #[serde(default = "default_portal_view_scale")]
    pub portal_view_scale: f32,
    #[serde(default)]
    pub portal_diagnostics: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            mouse_sensitivity: default_mouse_sensitivity(),
            fov: default_fov(),
            portal_recursion: default_portal_recursion(),
            portal_view_scale: default_portal_view_scale(),
            portal_diagnostics: false,
        }
    }
}

impl ClientSettings {
    fn sanitize(mut self) -> Self {
        self.mouse_sensitivity = self
            .mouse_sensitivity
            .clamp(MIN_MOUSE_SENSITIVITY, MAX_MOUSE_SENSITIVITY);
        self.fov = self.fov.clamp(MIN_FOV, MAX_FOV);
        self.portal_recursion = self.portal_recursion.clamp(1, MAX_PORTAL_RECURSION);
        self.portal_view_scale = self
            .portal_view_scale
            .clamp(MIN_PORTAL_VIEW_SCALE, MAX_PORTAL_VIEW_SCALE);
        self
    }

    fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let parsed = toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize settings: {e}"),
            )
        })?;
        Ok(parsed.sanitize())
    }

    fn save(&self, path: &Path) -> io::Result<()> {
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

fn default_mouse_sensitivity() -> f32 {
    2.5
}

fn default_fov() -> f32 {
    70.0
}

fn default_portal_recursion() -> u32 {
    2
}

fn default_portal_view_scale() -> f32 {
    1.0
}

pub fn load_or_create_settings(path: &Path) -> ClientSettings {
    match ClientSettings::load(path) {
        Ok(settings) => settings,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let settings = ClientSettings::default();
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
            ClientSettings::default()
        }
    }
}
