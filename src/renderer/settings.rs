//! Renderer Settings
//!
//! [`RenderSettings`] collects every knob the draw orchestrator reads at
//! frame time: exposure and gamma, the tone-map operator, lighting toggles,
//! the clear color and the offscreen target pool.
//!
//! Settings are plain serde data. Hosts either build them in code or load
//! them from JSON; missing fields take their defaults.
//!
//! ```rust,ignore
//! use kiln::renderer::{RenderSettings, ToneMap};
//!
//! let settings = RenderSettings {
//!     tone_map: ToneMap::AcesHill,
//!     use_ibl: false,
//!     ..Default::default()
//! };
//!
//! let settings = RenderSettings::from_json_str(r#"{ "exposure": 1.5 }"#)?;
//! ```
//!
//! Choices that change shader code (tone map, linear output, lighting
//! toggles) are expressed as fragment defines through
//! [`RenderSettings::apply_to_defines`].

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::resources::ShaderDefines;

// ---------------------------------------------------------------------------
// ToneMap
// ---------------------------------------------------------------------------

/// Tone mapping operator applied at the end of the fragment shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneMap {
    /// Exposure and gamma only.
    None,
    /// Khronos PBR Neutral.
    #[default]
    KhrPbrNeutral,
    /// Narkowicz's fitted ACES curve.
    AcesNarkowicz,
    /// Stephen Hill's ACES RRT/ODT fit.
    AcesHill,
    /// Hill's fit with a fixed exposure boost.
    AcesHillExposureBoost,
}

impl ToneMap {
    /// Sets the `TONEMAP_*` macro selecting this operator.
    pub fn apply_to_defines(self, defines: &mut ShaderDefines) {
        let name = match self {
            Self::None => return,
            Self::KhrPbrNeutral => "TONEMAP_KHR_PBR_NEUTRAL",
            Self::AcesNarkowicz => "TONEMAP_ACES_NARKOWICZ",
            Self::AcesHill => "TONEMAP_ACES_HILL",
            Self::AcesHillExposureBoost => "TONEMAP_ACES_HILL_EXPOSURE_BOOST",
        };
        defines.enable(name);
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::KhrPbrNeutral => "Khronos PBR Neutral",
            Self::AcesNarkowicz => "ACES Narkowicz",
            Self::AcesHill => "ACES Hill",
            Self::AcesHillExposureBoost => "ACES Hill (exposure boost)",
        }
    }
}

// ---------------------------------------------------------------------------
// RenderSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Linear multiplier applied before tone mapping.
    pub exposure: f32,
    pub gamma: f32,
    pub tone_map: ToneMap,
    /// Skip tone mapping and gamma entirely, writing linear radiance.
    pub linear_output: bool,
    /// Evaluate punctual lights (scene lights, or a default key + fill pair).
    pub use_punctual: bool,
    /// Sample the environment textures, when an environment is installed.
    pub use_ibl: bool,
    pub environment_intensity: f32,
    /// RGBA clear color for [`Renderer::new_frame`](crate::renderer::Renderer::new_frame).
    pub clear_color: [f32; 4],
    /// Size of each offscreen color + depth target.
    pub offscreen_size: [u32; 2],
    /// Number of offscreen targets in the pool.
    pub offscreen_pool_size: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            tone_map: ToneMap::default(),
            linear_output: false,
            use_punctual: true,
            use_ibl: true,
            environment_intensity: 1.0,
            clear_color: [0.2, 0.2, 0.2, 1.0],
            offscreen_size: [512, 512],
            offscreen_pool_size: 2,
        }
    }
}

impl RenderSettings {
    /// Parses settings from JSON. Absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Adds the frame-global fragment defines.
    ///
    /// `ibl_available` is `false` when no environment is installed, in which
    /// case `USE_IBL` is never set regardless of [`Self::use_ibl`].
    pub fn apply_to_defines(&self, defines: &mut ShaderDefines, ibl_available: bool) {
        if self.linear_output {
            defines.enable("LINEAR_OUTPUT");
        } else {
            self.tone_map.apply_to_defines(defines);
        }
        if self.use_punctual {
            defines.enable("USE_PUNCTUAL");
        }
        if self.use_ibl && ibl_available {
            defines.enable("USE_IBL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = RenderSettings::from_json_str(r#"{ "exposure": 2.0, "tone_map": "aces_hill" }"#).unwrap();
        assert_eq!(settings.exposure, 2.0);
        assert_eq!(settings.tone_map, ToneMap::AcesHill);
        assert_eq!(settings.gamma, 2.2);
        assert_eq!(settings.offscreen_pool_size, 2);
    }

    #[test]
    fn malformed_json_is_a_settings_error() {
        let err = RenderSettings::from_json_str("{ exposure: }").unwrap_err();
        assert!(matches!(err, crate::errors::KilnError::SettingsParse(_)));
    }

    #[test]
    fn linear_output_suppresses_tone_map() {
        let mut defines = ShaderDefines::new();
        let settings = RenderSettings {
            linear_output: true,
            ..RenderSettings::default()
        };
        settings.apply_to_defines(&mut defines, false);

        assert!(defines.contains("LINEAR_OUTPUT"));
        assert!(!defines.contains("TONEMAP_KHR_PBR_NEUTRAL"));
        assert!(defines.contains("USE_PUNCTUAL"));
        assert!(!defines.contains("USE_IBL"));
    }
}
