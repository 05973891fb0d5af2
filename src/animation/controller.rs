use cgmath::Matrix4;

use crate::{animation::SkinData, error::LoadError};

/// Plays one of the clips selected when a skinned object was loaded.
#[derive(Clone, Debug)]
pub struct AnimationController {
    skin: SkinData,
    /// Indices into the skin's clips, in the order they were requested.
    clips: Vec<usize>,
    current: Option<usize>,
    elapsed: f32,
    loop_animation: bool,
}

impl AnimationController {
    /// Every name in `clip_names` has to exist in `skin`; a missing clip means
    /// the data does not match what the caller expects.
    pub fn new(skin: SkinData, clip_names: &[String], loop_animation: bool) -> Result<Self, LoadError> {
        if clip_names.is_empty() {
            return Err(LoadError::UnsupportedConfiguration(
                "a skinned object needs at least one animation clip".into(),
            ));
        }
        let clips = clip_names
            .iter()
            .map(|name| {
                skin.clip_index(name).ok_or_else(|| LoadError::ClipNotFound {
                    clip: name.clone(),
                    available: skin.clip_names(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            skin,
            clips,
            current: None,
            elapsed: 0.0,
            loop_animation,
        })
    }

    /// Plays the `index`th requested clip from the start. An index out of range
    /// leaves the controller without a clip and returns `false`.
    pub fn start_animation(&mut self, index: usize) -> bool {
        self.elapsed = 0.0;
        if index < self.clips.len() {
            self.current = Some(index);
            true
        } else {
            log::warn!(
                "animation clip {index} requested, only {} are loaded",
                self.clips.len()
            );
            self.current = None;
            false
        }
    }

    pub fn update(&mut self, dt: f32) {
        if self.current.is_none() {
            return;
        }
        let duration = self.duration();
        if duration <= 0.0 {
            self.elapsed = 0.0;
            return;
        }
        self.elapsed += dt.max(0.0);
        if self.loop_animation {
            self.elapsed = self.elapsed.rem_euclid(duration);
        } else {
            self.elapsed = self.elapsed.min(duration);
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Duration of the playing clip, zero without one.
    pub fn duration(&self) -> f32 {
        self.current_clip().map_or(0.0, |clip| clip.duration())
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_looping(&self) -> bool {
        self.loop_animation
    }

    pub fn current_clip_name(&self) -> Option<&str> {
        self.current_clip().map(|clip| clip.name.as_str())
    }

    fn current_clip(&self) -> Option<&crate::animation::AnimationClip> {
        self.current
            .and_then(|idx| self.clips.get(idx))
            .and_then(|&clip| self.skin.clips().get(clip))
    }

    pub fn skin(&self) -> &SkinData {
        &self.skin
    }

    /// Bone palette for the current time; the rest pose when nothing plays.
    pub fn bone_transforms(&self) -> Vec<Matrix4<f32>> {
        self.skin.final_transforms(self.current_clip(), self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::{AnimationClip, Keyframes},
        data_structures::instance::Instance,
    };
    use approx::assert_relative_eq;
    use cgmath::{SquareMatrix, Vector3};

    fn skin() -> SkinData {
        let mut walk = AnimationClip::new("walk", 1);
        walk.bones[0].add_channel(
            &[0.0, 2.0],
            Keyframes::Translation(vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 0.0, 0.0)]),
        );
        SkinData::new(
            vec![None],
            vec![Matrix4::identity()],
            vec![Instance::new()],
            vec![Matrix4::identity()],
        )
        .unwrap()
        .with_clip(walk)
        .with_clip(AnimationClip::new("idle", 1))
    }

    #[test]
    fn missing_clips_are_fatal() {
        let err = AnimationController::new(skin(), &["run".to_string()], true).unwrap_err();
        match err {
            LoadError::ClipNotFound { clip, available } => {
                assert_eq!(clip, "run");
                assert_eq!(available, vec!["walk".to_string(), "idle".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn looping_wraps_elapsed_time() {
        let mut controller = AnimationController::new(skin(), &["walk".to_string()], true).unwrap();
        assert!(controller.start_animation(0));
        controller.update(2.5);
        assert_relative_eq!(controller.elapsed(), 0.5);
        assert_relative_eq!(controller.bone_transforms()[0].w.x, 1.0);
    }

    #[test]
    fn non_looping_clamps_and_holds_the_last_pose() {
        let mut controller = AnimationController::new(skin(), &["walk".to_string()], false).unwrap();
        controller.start_animation(0);
        controller.update(2.0);
        let at_end = controller.bone_transforms();
        controller.update(3.0);
        assert_relative_eq!(controller.elapsed(), 2.0);
        assert_eq!(controller.bone_transforms(), at_end);
    }

    #[test]
    fn out_of_range_start_leaves_the_rest_pose() {
        let mut controller = AnimationController::new(skin(), &["walk".to_string()], true).unwrap();
        assert!(!controller.start_animation(3));
        controller.update(1.0);
        assert_eq!(controller.elapsed(), 0.0);
        assert_eq!(controller.bone_transforms(), vec![Matrix4::identity()]);
    }

    #[test]
    fn zero_length_clips_stay_at_zero() {
        let mut controller = AnimationController::new(skin(), &["idle".to_string()], true).unwrap();
        controller.start_animation(0);
        controller.update(1.0);
        assert_eq!(controller.elapsed(), 0.0);
    }
}
