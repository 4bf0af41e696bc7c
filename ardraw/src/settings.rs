//! User settings, persisted as toml in the platform preferences directory.

use ardraw_core::stabilizer::StabilizerConfig;
use ardraw_core::transform::ClipPlanes;

const DOCUMENTATION: &str = r"# ardraw settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default values.

# [clip] near and far planes, in meters, used for the camera projection.
# [stabilizer] how still the tracked image must be, and for how many frames, before the overlay
#   locks on. Tolerances are in meters and radians.
# [render] line widths in pixels, overlay opacity from 0 to 1.
# [coloring] flood fill tolerance per channel, 0 to 255.

";

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(Copy, Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub show_bounding_boxes: bool,
    pub stroke_width: f32,
    pub wireframe_width: f32,
    pub overlay_opacity: f32,
}
impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            show_bounding_boxes: true,
            stroke_width: 5.0,
            wireframe_width: 5.0,
            overlay_opacity: crate::passes::plane::DEFAULT_OPACITY,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColoringSettings {
    pub tolerance: u8,
}
impl Default for ColoringSettings {
    fn default() -> Self {
        Self {
            tolerance: ardraw_core::fill::DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SettingsData {
    pub clip: ClipPlanes,
    pub stabilizer: StabilizerConfig,
    pub render: RenderSettings,
    pub coloring: ColoringSettings,
}

pub struct Settings {
    failed_to_load: bool,
    pub data: SettingsData,
}
impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Load from the user's preferences, or default if unavailable for some reason.
    #[must_use]
    pub fn load() -> Self {
        let mut dir = preferences_dir();
        match dir.as_mut() {
            None => Self::no_path(),
            Some(dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(dir)
            }
        }
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            data: SettingsData::default(),
        }
    }
    #[must_use]
    pub fn load_or_default(path: &std::path::Path) -> Self {
        let data: anyhow::Result<SettingsData> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            let data: SettingsData = toml::from_str(&string)?;
            Ok(data)
        };
        match data {
            Ok(data) => Self {
                failed_to_load: false,
                data: data.sanitized(),
            },
            Err(e) => {
                log::warn!("Failed to load {}: {e}", path.display());
                Self::no_path()
            }
        }
    }
    /// Return true if loading user's settings failed. This can be useful for
    /// displaying a warning.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    pub fn save(&self) -> anyhow::Result<()> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        self.save_to(&preferences)
    }
    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(&self.data)?;
        std::fs::write(path, string)?;
        Ok(())
    }
}
impl SettingsData {
    /// Replace nonsensical values with their defaults, so a hand-edited file can't wedge the
    /// renderer or the stabilizer.
    #[must_use]
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.clip.near > 0.0 && self.clip.far > self.clip.near) {
            log::warn!("Invalid clip planes {:?}, defaulting", self.clip);
            self.clip = defaults.clip;
        }
        let stabilizer = &mut self.stabilizer;
        if !(stabilizer.position_tolerance > 0.0 && stabilizer.rotation_tolerance > 0.0)
            || stabilizer.stability_threshold == 0
        {
            log::warn!("Invalid stabilizer settings {stabilizer:?}, defaulting");
            *stabilizer = defaults.stabilizer;
        }
        if !(0.0..=1.0).contains(&self.render.overlay_opacity) {
            self.render.overlay_opacity = defaults.render.overlay_opacity;
        }
        self
    }
}

#[cfg(test)]
mod test {
    use super::{Settings, SettingsData};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ardraw-{}-{name}", std::process::id()))
    }

    #[test]
    fn round_trip_through_file() {
        let path = temp_path("round-trip.toml");
        let mut settings = Settings::no_path();
        settings.data.render.show_bounding_boxes = false;
        settings.data.coloring.tolerance = 12;
        settings.data.stabilizer.stability_threshold = 8;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_or_default(&path);
        let _ = std::fs::remove_file(&path);
        assert!(!loaded.did_fail_to_load());
        assert_eq!(loaded.data, settings.data);
    }
    #[test]
    fn partial_file_fills_defaults() {
        let data: SettingsData = toml::from_str("[coloring]\ntolerance = 5\n").unwrap();
        assert_eq!(data.coloring.tolerance, 5);
        assert_eq!(data.clip, SettingsData::default().clip);
        assert_eq!(data.stabilizer.lost_frame_limit, 90);
    }
    #[test]
    fn invalid_values_are_replaced() {
        let data: SettingsData =
            toml::from_str("[clip]\nnear = 5.0\nfar = 1.0\n[stabilizer]\nstability_threshold = 0\n")
                .unwrap();
        let data = data.sanitized();
        assert_eq!(data, SettingsData::default());
    }
    #[test]
    fn missing_file_defaults() {
        let settings = Settings::load_or_default(&temp_path("does-not-exist.toml"));
        assert!(settings.did_fail_to_load());
        assert_eq!(settings.data, SettingsData::default());
    }
}
