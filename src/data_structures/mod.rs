//! Engine data structures: object data, instances, features and lights.
//!
//! - `feature` holds the switches that select an object's pipeline permutation
//! - `object_data` holds vertex formats, render units and per-instance attribute arrays
//! - `instance` holds per-instance transformation helpers and the GPU instance row
//! - `light` holds the light, material and fog constants
//! - `geometry` generates procedural meshes
//! - `texture` is the GPU texture wrapper used by the bootstrap

pub mod feature;
pub mod geometry;
pub mod instance;
pub mod light;
pub mod object_data;
pub mod texture;
