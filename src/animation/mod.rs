//! Skeletal animation.
//!
//! [`SkinData`] holds a skeleton and its clips as read from a skinned mesh
//! file; [`AnimationController`] plays one clip of it and produces the bone
//! palette the skinned vertex shader consumes.

pub mod clip;
pub mod controller;

pub use clip::{AnimationClip, BoneAnimation, Keyframe, Keyframes, SkinData};
pub use controller::AnimationController;
