use cgmath::{InnerSpace, Matrix4, Quaternion, SquareMatrix, Vector3, VectorSpace};

use crate::{constants::MAX_BONES, data_structures::instance::Instance, error::LoadError};

/// Output of one animation channel as stored in the source file.
#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

/// Value of `track` at `t`. Before the first key the first value holds, after
/// the last key the last one.
fn sample_track<T: Copy>(track: &[Keyframe<T>], t: f32, interpolate: impl Fn(T, T, f32) -> T) -> Option<T> {
    let first = track.first()?;
    let last = track.last()?;
    if t <= first.time {
        return Some(first.value);
    }
    if t >= last.time {
        return Some(last.value);
    }
    let next = track.partition_point(|k| k.time <= t);
    let (a, b) = (&track[next - 1], &track[next]);
    let span = b.time - a.time;
    if span <= 0.0 {
        return Some(b.value);
    }
    Some(interpolate(a.value, b.value, (t - a.time) / span))
}

/// Keyframe tracks of one bone. Tracks are independent and may be empty; an
/// empty track keeps the bone's rest value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneAnimation {
    pub translations: Vec<Keyframe<Vector3<f32>>>,
    pub rotations: Vec<Keyframe<Quaternion<f32>>>,
    pub scales: Vec<Keyframe<Vector3<f32>>>,
}

impl BoneAnimation {
    /// Adds a channel read from file. Keys are sorted by time afterwards.
    pub fn add_channel(&mut self, times: &[f32], keyframes: Keyframes) {
        fn zip<T: Copy>(times: &[f32], values: Vec<T>) -> impl Iterator<Item = Keyframe<T>> {
            times
                .iter()
                .zip(values)
                .map(|(&time, value)| Keyframe { time, value })
        }
        match keyframes {
            Keyframes::Translation(values) => self.translations.extend(zip(times, values)),
            Keyframes::Rotation(values) => self.rotations.extend(zip(times, values)),
            Keyframes::Scale(values) => self.scales.extend(zip(times, values)),
            Keyframes::Other => log::debug!("ignoring an unsupported animation channel"),
        }
        self.translations.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.rotations.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.scales.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn end_time(&self) -> f32 {
        let last = |times: Option<f32>| times.unwrap_or(0.0);
        last(self.translations.last().map(|k| k.time))
            .max(last(self.rotations.last().map(|k| k.time)))
            .max(last(self.scales.last().map(|k| k.time)))
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty() && self.rotations.is_empty() && self.scales.is_empty()
    }

    /// Local transform at `t`.
    pub fn sample(&self, t: f32, rest: &Instance) -> Instance {
        Instance {
            position: sample_track(&self.translations, t, |a, b, s| a.lerp(b, s)).unwrap_or(rest.position),
            rotation: sample_track(&self.rotations, t, |a, b, s| {
                // Take the short way around.
                let b = if a.dot(b) < 0.0 { -b } else { b };
                a.slerp(b, s).normalize()
            })
            .unwrap_or(rest.rotation),
            scale: sample_track(&self.scales, t, |a, b, s| a.lerp(b, s)).unwrap_or(rest.scale),
        }
    }
}

/// A named animation: one track set per bone of the skeleton.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub bones: Vec<BoneAnimation>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, bone_count: usize) -> Self {
        Self {
            name: name.into(),
            bones: vec![BoneAnimation::default(); bone_count],
        }
    }

    /// Time of the latest keyframe of any bone.
    pub fn duration(&self) -> f32 {
        self.bones.iter().map(BoneAnimation::end_time).fold(0.0, f32::max)
    }
}

/// Skeleton of a skinned mesh plus every clip the file provides.
#[derive(Clone, Debug, PartialEq)]
pub struct SkinData {
    parents: Vec<Option<usize>>,
    inverse_bind: Vec<Matrix4<f32>>,
    rest: Vec<Instance>,
    /// Static transform above each root bone, identity for the others.
    root_offsets: Vec<Matrix4<f32>>,
    /// Bones ordered so that every parent precedes its children.
    order: Vec<usize>,
    clips: Vec<AnimationClip>,
}

impl SkinData {
    pub fn new(
        parents: Vec<Option<usize>>,
        inverse_bind: Vec<Matrix4<f32>>,
        rest: Vec<Instance>,
        root_offsets: Vec<Matrix4<f32>>,
    ) -> Result<Self, LoadError> {
        let count = parents.len();
        if inverse_bind.len() != count || rest.len() != count || root_offsets.len() != count {
            return Err(LoadError::InvalidObjectData(format!(
                "skeleton with {count} bones has {} inverse bind matrices, {} rest poses and {} root offsets",
                inverse_bind.len(),
                rest.len(),
                root_offsets.len()
            )));
        }
        if count > MAX_BONES {
            return Err(LoadError::InvalidObjectData(format!(
                "skeleton has {count} bones, at most {MAX_BONES} are supported"
            )));
        }

        let mut depths = Vec::with_capacity(count);
        for bone in 0..count {
            let mut depth = 0;
            let mut current = parents[bone];
            while let Some(parent) = current {
                if parent >= count || depth > count {
                    return Err(LoadError::InvalidObjectData(format!(
                        "bone {bone} has an invalid or cyclic parent chain"
                    )));
                }
                depth += 1;
                current = parents[parent];
            }
            depths.push(depth);
        }
        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&bone| depths[bone]);

        Ok(Self {
            parents,
            inverse_bind,
            rest,
            root_offsets,
            order,
            clips: Vec::new(),
        })
    }

    pub fn add_clip(&mut self, mut clip: AnimationClip) {
        clip.bones.resize(self.bone_count(), BoneAnimation::default());
        self.clips.push(clip);
    }

    pub fn with_clip(mut self, clip: AnimationClip) -> Self {
        self.add_clip(clip);
        self
    }

    pub fn bone_count(&self) -> usize {
        self.parents.len()
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    pub fn clip_names(&self) -> Vec<String> {
        self.clips.iter().map(|c| c.name.clone()).collect()
    }

    pub fn clip_index(&self, name: &str) -> Option<usize> {
        self.clips.iter().position(|c| c.name == name)
    }

    /// Bone palette `to_root[i] * inverse_bind[i]` for `clip` at `t`, or the
    /// rest pose without a clip.
    pub fn final_transforms(&self, clip: Option<&AnimationClip>, t: f32) -> Vec<Matrix4<f32>> {
        let count = self.bone_count();
        let mut to_root = vec![Matrix4::identity(); count];
        for &bone in &self.order {
            let local = match clip.and_then(|c| c.bones.get(bone)) {
                Some(track) => track.sample(t, &self.rest[bone]),
                None => self.rest[bone].clone(),
            }
            .to_matrix();
            to_root[bone] = match self.parents[bone] {
                Some(parent) => to_root[parent] * local,
                None => self.root_offsets[bone] * local,
            };
        }
        to_root
            .iter()
            .zip(&self.inverse_bind)
            .map(|(to_root, inverse_bind)| to_root * inverse_bind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::{Deg, Rotation3};

    fn two_bone_skin() -> SkinData {
        // The child is listed first to exercise the ordering.
        SkinData::new(
            vec![Some(1), None],
            vec![Matrix4::identity(); 2],
            vec![Instance::at(0.0, 1.0, 0.0), Instance::new()],
            vec![Matrix4::identity(); 2],
        )
        .unwrap()
    }

    #[test]
    fn tracks_clamp_outside_their_keys() {
        let mut bone = BoneAnimation::default();
        bone.add_channel(
            &[1.0, 2.0],
            Keyframes::Translation(vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)]),
        );
        let rest = Instance::new();
        assert_relative_eq!(bone.sample(0.0, &rest).position.x, 0.0);
        assert_relative_eq!(bone.sample(1.5, &rest).position.x, 1.0);
        assert_relative_eq!(bone.sample(5.0, &rest).position.x, 2.0);
        assert_relative_eq!(bone.end_time(), 2.0);
    }

    #[test]
    fn rotations_interpolate_spherically() {
        let mut bone = BoneAnimation::default();
        bone.add_channel(
            &[0.0, 1.0],
            Keyframes::Rotation(vec![
                Quaternion::from_angle_y(Deg(0.0)),
                Quaternion::from_angle_y(Deg(90.0)),
            ]),
        );
        let half = bone.sample(0.5, &Instance::new()).rotation;
        let expected = Quaternion::from_angle_y(Deg(45.0));
        assert_relative_eq!(half.dot(expected).abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn children_follow_their_parents() {
        let mut clip = AnimationClip::new("move", 2);
        clip.bones[1].add_channel(&[0.0, 1.0], Keyframes::Translation(vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(3.0, 0.0, 0.0)]));
        let skin = two_bone_skin().with_clip(clip);
        let clip = &skin.clips()[0];
        assert_relative_eq!(clip.duration(), 1.0);

        let palette = skin.final_transforms(Some(clip), 1.0);
        assert_relative_eq!(palette[1].w.x, 3.0);
        assert_relative_eq!(palette[0].w.x, 3.0);
        assert_relative_eq!(palette[0].w.y, 1.0);
    }

    #[test]
    fn cyclic_skeletons_are_rejected() {
        let skin = SkinData::new(
            vec![Some(1), Some(0)],
            vec![Matrix4::identity(); 2],
            vec![Instance::new(); 2],
            vec![Matrix4::identity(); 2],
        );
        assert!(matches!(skin, Err(LoadError::InvalidObjectData(_))));
    }
}
