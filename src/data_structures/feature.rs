//! Feature configuration of a renderable object.
//!
//! A [`FeatureConfiguration`] says which optional rendering capabilities an
//! object needs. It is fixed once the object has been prepared and it is the
//! only input (together with the vertex format of the object's data) to the
//! pipeline permutation that draws the object.

use crate::error::LoadError;

/// Highest number of directional lights the object shader evaluates.
pub const MAX_LIGHTS: u8 = 3;

/// Displacement parameters used when tessellation is enabled.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TessellationDesc {
    pub height_scale: f32,
    /// Distance at which the tessellation factor reaches `max_factor`.
    pub max_distance: f32,
    /// Distance at which the tessellation factor drops to `min_factor`.
    pub min_distance: f32,
    pub min_factor: f32,
    pub max_factor: f32,
}

impl Default for TessellationDesc {
    fn default() -> Self {
        Self {
            height_scale: 0.07,
            max_distance: 1.0,
            min_distance: 25.0,
            min_factor: 1.0,
            max_factor: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureConfiguration {
    pub light_count: u8,
    pub texture_enable: bool,
    pub normal_map_enable: bool,
    pub reflect_enable: bool,
    /// Environment map the object owns itself. `None` with `reflect_enable`
    /// means the owner supplies a cube map before every render.
    pub reflect_source_texture: Option<String>,
    pub tessellation: Option<TessellationDesc>,
    pub loop_animation: bool,
    pub skinned: bool,
}

impl FeatureConfiguration {
    pub fn lit(light_count: u8) -> Self {
        Self {
            light_count,
            ..Default::default()
        }
    }

    pub fn with_texture(mut self) -> Self {
        self.texture_enable = true;
        self
    }

    pub fn with_normal_map(mut self) -> Self {
        self.normal_map_enable = true;
        self
    }

    /// Reflect an environment map supplied by the owner every frame.
    pub fn with_dynamic_reflection(mut self) -> Self {
        self.reflect_enable = true;
        self.reflect_source_texture = None;
        self
    }

    /// Reflect a static environment map loaded from `file`.
    pub fn with_reflection_source(mut self, file: impl Into<String>) -> Self {
        self.reflect_enable = true;
        self.reflect_source_texture = Some(file.into());
        self
    }

    pub fn with_tessellation(mut self, desc: TessellationDesc) -> Self {
        self.tessellation = Some(desc);
        self
    }

    pub fn with_skinning(mut self, loop_animation: bool) -> Self {
        self.skinned = true;
        self.loop_animation = loop_animation;
        self
    }

    pub fn tessellation_enable(&self) -> bool {
        self.tessellation.is_some()
    }

    /// True when the environment map has to be supplied from outside.
    pub fn consumes_external_reflection(&self) -> bool {
        self.reflect_enable && self.reflect_source_texture.is_none()
    }

    /// Checks the combinations that no pipeline permutation can satisfy.
    ///
    /// Requirements that depend on the object data (tangents, skin weights)
    /// are checked when the variant is selected, see
    /// [`PipelineVariant::select`](crate::pipelines::PipelineVariant::select).
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.light_count > MAX_LIGHTS {
            return Err(LoadError::UnsupportedConfiguration(format!(
                "{} lights requested, at most {} are supported",
                self.light_count, MAX_LIGHTS
            )));
        }
        if let Some(tess) = &self.tessellation {
            if !self.normal_map_enable {
                return Err(LoadError::UnsupportedConfiguration(
                    "tessellation requires normal mapping".into(),
                ));
            }
            if !(tess.min_factor >= 1.0 && tess.min_factor <= tess.max_factor) {
                return Err(LoadError::UnsupportedConfiguration(format!(
                    "tessellation factors must satisfy 1 <= min <= max, got {}..{}",
                    tess.min_factor, tess.max_factor
                )));
            }
            if tess.min_distance == tess.max_distance {
                return Err(LoadError::UnsupportedConfiguration(
                    "tessellation distances must differ".into(),
                ));
            }
        }
        if self.reflect_source_texture.is_some() && !self.reflect_enable {
            return Err(LoadError::UnsupportedConfiguration(
                "a reflection source texture was given but reflection is disabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_configurations_validate() {
        FeatureConfiguration::lit(3).with_dynamic_reflection().validate().unwrap();
        FeatureConfiguration::lit(3)
            .with_texture()
            .with_normal_map()
            .with_tessellation(TessellationDesc::default())
            .validate()
            .unwrap();
        FeatureConfiguration::lit(1).with_skinning(true).validate().unwrap();
    }

    #[test]
    fn too_many_lights_are_rejected() {
        assert!(matches!(
            FeatureConfiguration::lit(4).validate(),
            Err(LoadError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn tessellation_needs_normal_mapping_and_ordered_factors() {
        let tess = FeatureConfiguration::lit(1).with_texture().with_tessellation(TessellationDesc::default());
        assert!(tess.validate().is_err());

        let inverted = TessellationDesc {
            min_factor: 4.0,
            max_factor: 2.0,
            ..TessellationDesc::default()
        };
        let config = FeatureConfiguration::lit(1).with_normal_map().with_tessellation(inverted);
        assert!(config.validate().is_err());
    }

    #[test]
    fn reflection_source_requires_reflection() {
        let mut config = FeatureConfiguration::lit(1).with_reflection_source("sky.png");
        assert!(!config.consumes_external_reflection());
        config.reflect_enable = false;
        assert!(config.validate().is_err());
        assert!(FeatureConfiguration::lit(1).with_dynamic_reflection().consumes_external_reflection());
    }
}
