//! Loading meshes, textures and animation data from files.
//!
//! Every loader here is CPU-only and blocking; the loader runs them on a
//! blocking worker so the render thread never waits for the disk. Paths are
//! relative to an [`AssetRoot`].

use std::path::{Path, PathBuf};

use crate::error::LoadError;

pub mod mesh;
pub mod skinned;
pub mod text_mesh;
pub mod texture;

pub use mesh::{compute_tangents, load_obj};
pub use skinned::{SkinnedMesh, load_skinned_gltf};
pub use text_mesh::{load_text_mesh, parse_text_mesh};
pub use texture::{decode_cube_strip, decode_texture, load_texture};

/// Environment variable overriding the default asset directory.
pub const ASSET_ROOT_ENV: &str = "MIRROR_NGIN_ASSETS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRoot {
    root: PathBuf,
}

impl AssetRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$MIRROR_NGIN_ASSETS`, or `./assets` when it is not set.
    pub fn from_env() -> Self {
        match std::env::var_os(ASSET_ROOT_ENV) {
            Some(root) => Self::new(root),
            None => Self::new(Path::new("./").join("assets")),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn load_string(&self, file_name: &str) -> Result<String, LoadError> {
        let path = self.path(file_name);
        std::fs::read_to_string(&path).map_err(|e| LoadError::io(path, e))
    }

    pub fn load_binary(&self, file_name: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.path(file_name);
        std::fs::read(&path).map_err(|e| LoadError::io(path, e))
    }
}

impl Default for AssetRoot {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_report_the_full_path() {
        let assets = AssetRoot::new("/nonexistent-root");
        match assets.load_binary("skull.txt") {
            Err(LoadError::Io { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent-root/skull.txt"))
            }
            other => panic!("expected an io error, got {other:?}"),
        }
    }
}
