use std::fmt::Write;

use crate::{
    data_structures::{
        instance::InstanceRaw,
        object_data::{Vertex, VertexFormat},
        texture::Texture,
    },
    pipelines::{PipelineKind, PipelineVariant},
};

/// Which way a pipeline's triangles face once rasterised.
///
/// Cube faces are rendered with a mirrored projection, so they need the
/// opposite winding to keep culling the back faces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Winding {
    Frame,
    Mirrored,
}

/// Group 0: per-frame, per-object and skinning constants, all addressed by
/// dynamic offsets into uniform rings.
pub fn constants_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[entry(0), entry(1), entry(2)],
        label: Some("constants_bind_group_layout"),
    })
}

/// Group 1: diffuse map, normal map, environment cube and a shared sampler.
pub fn texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding: u32, view_dimension: wgpu::TextureViewDimension| {
        wgpu::BindGroupLayoutEntry {
            binding,
            // The tessellation variant displaces vertices with the normal map.
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        }
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            texture(0, wgpu::TextureViewDimension::D2),
            texture(1, wgpu::TextureViewDimension::D2),
            texture(2, wgpu::TextureViewDimension::Cube),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("object_texture_bind_group_layout"),
    })
}

/// WGSL for a variant: the feature switches become constants in front of the
/// shared declarations, so disabled branches are resolved at compile time.
pub fn shader_source(variant: &PipelineVariant) -> String {
    let mut source = String::new();
    let _ = writeln!(source, "const LIGHT_COUNT: u32 = {}u;", variant.light_count);
    let _ = writeln!(source, "const TEXTURE_ENABLE: bool = {};", variant.texture);
    let _ = writeln!(source, "const NORMAL_MAP_ENABLE: bool = {};", variant.normal_map);
    let _ = writeln!(source, "const REFLECT_ENABLE: bool = {};", variant.reflect);
    let _ = writeln!(source, "const TESSELLATION_ENABLE: bool = {};", variant.tessellation);
    source.push_str(include_str!("common.wgsl"));
    match variant.kind {
        PipelineKind::Object => source.push_str(include_str!("object.wgsl")),
        PipelineKind::Sky => source.push_str(include_str!("sky.wgsl")),
    }
    source
}

fn vertex_entry_point(variant: &PipelineVariant) -> &'static str {
    match (variant.kind, variant.vertex_format) {
        (PipelineKind::Sky, _) => "vs_main",
        (PipelineKind::Object, VertexFormat::Basic) => "vs_basic",
        (PipelineKind::Object, VertexFormat::Tangent) => "vs_tangent",
        (PipelineKind::Object, VertexFormat::Skinned) => "vs_skinned",
    }
}

pub fn mk_variant_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    variant: &PipelineVariant,
    winding: Winding,
) -> wgpu::RenderPipeline {
    let label = format!("pipeline {:#05x} ({winding:?})", variant.id());
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(shader_source(variant).into()),
    };
    let front_face = match winding {
        Winding::Frame => wgpu::FrontFace::Ccw,
        Winding::Mirrored => wgpu::FrontFace::Cw,
    };
    let (cull_mode, depth_write, depth_compare) = match variant.kind {
        PipelineKind::Object => (Some(wgpu::Face::Back), true, wgpu::CompareFunction::Less),
        // The camera sits inside the sky and the sky sits on the far plane.
        PipelineKind::Sky => (None, false, wgpu::CompareFunction::LessEqual),
    };

    mk_render_pipeline(
        device,
        layout,
        color_format,
        Some(wgpu::BlendState {
            alpha: wgpu::BlendComponent::REPLACE,
            color: wgpu::BlendComponent::REPLACE,
        }),
        PipelineTarget {
            label: &label,
            vertex_entry_point: vertex_entry_point(variant),
            front_face,
            cull_mode,
            depth_write,
            depth_compare,
        },
        &[variant.vertex_format.layout(), InstanceRaw::desc()],
        shader,
    )
}

struct PipelineTarget<'a> {
    label: &'a str,
    vertex_entry_point: &'static str,
    front_face: wgpu::FrontFace,
    cull_mode: Option<wgpu::Face>,
    depth_write: bool,
    depth_compare: wgpu::CompareFunction,
}

fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    target: PipelineTarget<'_>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(target.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some(target.vertex_entry_point),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: target.front_face,
            cull_mode: target.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: Some(target.depth_write),
            depth_compare: Some(target.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::feature::FeatureConfiguration;

    #[test]
    fn shader_constants_follow_the_variant() {
        let features = FeatureConfiguration::lit(2).with_texture().with_dynamic_reflection();
        let variant = PipelineVariant::select(&features, VertexFormat::Basic).unwrap();
        let source = shader_source(&variant);
        assert!(source.starts_with("const LIGHT_COUNT: u32 = 2u;"));
        assert!(source.contains("const TEXTURE_ENABLE: bool = true;"));
        assert!(source.contains("const NORMAL_MAP_ENABLE: bool = false;"));
        assert!(source.contains("const REFLECT_ENABLE: bool = true;"));
        assert!(source.contains("fn vs_basic"));
        assert_eq!(vertex_entry_point(&variant), "vs_basic");
    }

    #[test]
    fn sky_uses_its_own_shader() {
        let source = shader_source(&PipelineVariant::sky());
        assert!(source.contains("xyww"));
        assert!(!source.contains("fn vs_skinned"));
    }
}
