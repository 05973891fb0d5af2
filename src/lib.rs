//! mirror-ngin
//!
//! Renderable objects for a small wgpu engine: mesh data with per-instance
//! attribute arrays, a feature configuration that selects the pipeline
//! permutation, and an asynchronous lifecycle that prepares data off the
//! render thread before device resources are created one object at a time.
//! Scenes compose these objects, play skinned animations and render a dynamic
//! cube map for reflective objects.
//!
//! High-level modules
//! - `scene`: scene composition, loading order and the two-pass reflection render
//! - `object`: the renderable object and its device lifecycle
//! - `loader`: logical initialization and the sequential loading chain
//! - `data_structures`: feature flags, object data, instances, lights, geometry
//! - `constants`: per-frame / per-object / skinning constant buffers
//! - `pipelines`: pipeline permutations and their wgpu construction
//! - `gpu`: the device seam with a recording and a wgpu backend
//! - `animation`: skeletal clips and the animation controller
//! - `resources`: asset loading (text meshes, glTF, OBJ, images)
//! - `reflection` / `sky`: dynamic cube map and environment background
//! - `context` / `app`: wgpu bootstrap and the winit frame loop
//!

pub mod animation;
pub mod app;
pub mod camera;
pub mod constants;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod gpu;
pub mod input;
pub mod loader;
pub mod object;
pub mod pipelines;
pub mod reflection;
pub mod resources;
pub mod scene;
pub mod scenes;
pub mod sky;
pub mod timer;

// Re-exports commonly used types for convenience in downstream code.
pub use app::{AppConfig, run};
pub use data_structures::feature::FeatureConfiguration;
pub use error::LoadError;
pub use object::RenderableObject;
pub use scene::{SceneBlueprint, SceneComposer, SceneScript};
