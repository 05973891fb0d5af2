//! Whitespace separated text meshes.
//!
//! ```text
//! VertexCount: 3
//! TriangleCount: 1
//! VertexList (pos, normal)
//! {
//!     0 0 0   0 0 1
//!     1 0 0   0 0 1
//!     0 1 0   0 0 1
//! }
//! TriangleList
//! {
//!     0 1 2
//! }
//! ```
//!
//! Labels are not interpreted, only counted. After the triangle list nothing
//! but the closing brace may follow.

use std::{path::Path, str::SplitWhitespace};

use crate::{data_structures::object_data::BasicVertex, error::LoadError, resources::AssetRoot};

struct Tokens<'a> {
    path: &'a Path,
    inner: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self, what: &str) -> Result<&'a str, LoadError> {
        self.inner
            .next()
            .ok_or_else(|| LoadError::parse(self.path, format!("unexpected end of data, expected {what}")))
    }

    fn skip(&mut self, count: usize, what: &str) -> Result<(), LoadError> {
        for _ in 0..count {
            self.next(what)?;
        }
        Ok(())
    }

    fn number<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, LoadError> {
        let token = self.next(what)?;
        token
            .parse()
            .map_err(|_| LoadError::parse(self.path, format!("expected {what}, found `{token}`")))
    }
}

/// Parses `text`; `path` only names the source in errors.
pub fn parse_text_mesh(path: &Path, text: &str) -> Result<(Vec<BasicVertex>, Vec<u32>), LoadError> {
    let mut tokens = Tokens {
        path,
        inner: text.split_whitespace(),
    };

    tokens.skip(1, "the vertex count label")?;
    let vertex_count: usize = tokens.number("the vertex count")?;
    tokens.skip(1, "the triangle count label")?;
    let triangle_count: usize = tokens.number("the triangle count")?;
    tokens.skip(4, "the vertex list header")?;

    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let mut v = [0.0f32; 6];
        for value in v.iter_mut() {
            *value = tokens.number("a vertex component")?;
        }
        vertices.push(BasicVertex {
            position: [v[0], v[1], v[2]],
            normal: [v[3], v[4], v[5]],
            tex_coords: [0.0, 0.0],
        });
    }

    tokens.skip(3, "the triangle list header")?;

    let mut indices = Vec::with_capacity(triangle_count * 3);
    for _ in 0..triangle_count * 3 {
        let index: u32 = tokens.number("a vertex index")?;
        if index as usize >= vertex_count {
            return Err(LoadError::parse(
                path,
                format!("index {index} is out of range for {vertex_count} vertices"),
            ));
        }
        indices.push(index);
    }

    match tokens.inner.next() {
        None | Some("}") => {}
        Some(token) => {
            return Err(LoadError::parse(path, format!("unexpected `{token}` after the triangle list")));
        }
    }
    if let Some(token) = tokens.inner.next() {
        return Err(LoadError::parse(path, format!("trailing data `{token}` after the mesh")));
    }

    Ok((vertices, indices))
}

pub fn load_text_mesh(assets: &AssetRoot, file_name: &str) -> Result<(Vec<BasicVertex>, Vec<u32>), LoadError> {
    let text = assets.load_string(file_name)?;
    let (vertices, indices) = parse_text_mesh(&assets.path(file_name), &text)?;
    log::debug!(
        "{file_name}: {} vertices, {} triangles",
        vertices.len(),
        indices.len() / 3
    );
    Ok((vertices, indices))
}
