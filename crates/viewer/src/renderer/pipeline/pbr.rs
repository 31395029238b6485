//! Metallic-roughness PBR mesh program.
//!
//! All tunables live in a runtime settings block written into the uniform
//! buffer every frame; changing them never recompiles the shader. The
//! channel-presence flags are fixed compile-time constants.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPipeline, TextureFormat};

use super::super::buffers::{self, MeshBufferSet};
use super::super::context::DEPTH_FORMAT;
use super::super::projection::Projection;
use super::super::textures::{unique_material_ids, TextureCache};
use super::flat::{create_material_binding, material_bind_group_layout, uniform_entry, MaterialBinding};
use super::{create_shader_checked, substitute_defines, MatrixUniforms};
use crate::settings::PbrSettings;

/// Optional device capabilities the PBR path can take advantage of; absence
/// is logged and shading falls back gracefully.
const OPTIONAL_FEATURES: [(wgpu::Features, &str); 2] = [
    (wgpu::Features::FLOAT32_FILTERABLE, "float32-filterable"),
    (
        wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
        "adapter-specific-format-features",
    ),
];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PbrUniforms {
    matrices: MatrixUniforms,
    light_direction: [f32; 4],
    light_color: [f32; 4],
    camera: [f32; 4],
    emissive_factor: [f32; 4],
    base_color_factor: [f32; 4],
    /// x: metallic, y: roughness.
    metallic_roughness: [f32; 4],
}

impl PbrUniforms {
    fn new(projection: &Projection, s: &PbrSettings) -> Self {
        let pad = |v: [f32; 3]| [v[0], v[1], v[2], 0.0];
        Self {
            matrices: MatrixUniforms::new(projection),
            light_direction: pad(s.light_direction),
            light_color: pad(s.light_color),
            camera: pad(s.camera),
            emissive_factor: pad(s.emissive_factor),
            base_color_factor: s.base_color_factor,
            metallic_roughness: [s.metallic_roughness[0], s.metallic_roughness[1], 0.0, 0.0],
        }
    }
}

struct Built {
    pipeline: RenderPipeline,
    material_layout: BindGroupLayout,
    global_buffer: Buffer,
    global_bind_group: BindGroup,
}

pub struct PbrProgram {
    settings: PbrSettings,
    source: Option<String>,
    format: Option<TextureFormat>,
    built: Option<Built>,
    materials: HashMap<u32, MaterialBinding>,
}

impl PbrProgram {
    pub fn new(settings: PbrSettings) -> Self {
        Self {
            settings,
            source: None,
            format: None,
            built: None,
            materials: HashMap::new(),
        }
    }

    pub fn pipeline_ready(&self) -> bool {
        self.built.is_some()
    }

    /// Runtime-only: the new values reach the GPU on the next prepare.
    pub fn update_settings(&mut self, settings: PbrSettings) {
        self.settings = settings;
    }

    pub fn install_source(&mut self, device: &Device, format: TextureFormat, source: String) {
        self.source = Some(source);
        self.format = Some(format);
        self.build(device);
    }

    pub fn destroy(&mut self) {
        self.built = None;
        self.materials.clear();
        self.source = None;
        self.format = None;
    }

    fn defines() -> [(&'static str, bool); 5] {
        [
            ("HAS_BASECOLORMAP", true),
            ("HAS_UV", true),
            ("HAS_NORMALS", true),
            ("HAS_EMISSIVEMAP", true),
            ("HAS_NORMALMAP", true),
        ]
    }

    fn build(&mut self, device: &Device) {
        let (Some(source), Some(format)) = (self.source.as_deref(), self.format) else {
            return;
        };
        self.materials.clear();

        for (feature, name) in OPTIONAL_FEATURES {
            if !device.features().contains(feature) {
                tracing::debug!(feature = name, "optional device feature unavailable");
            }
        }

        let shader = substitute_defines(source, &Self::defines());
        let module = match create_shader_checked(device, "pbr_shader", &shader) {
            Ok(module) => module,
            Err(e) => {
                tracing::error!(error = %e, "pbr program build failed");
                self.built = None;
                return;
            }
        };

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pbr_global_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });
        let material_layout = material_bind_group_layout(device, "pbr_material_layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pbr_pipeline_layout"),
            bind_group_layouts: &[&global_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("pbr_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[
                    buffers::position_layout(),
                    buffers::normal_layout(),
                    buffers::uv_layout(),
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let global_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pbr_globals"),
            contents: bytemuck::bytes_of(&PbrUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pbr_global_bind_group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        self.built = Some(Built {
            pipeline,
            material_layout,
            global_buffer,
            global_bind_group,
        });
    }

    pub fn prepare(
        &mut self,
        device: &Device,
        queue: &Queue,
        projection: &Projection,
        textures: &TextureCache,
        material_ids: &[u32],
    ) {
        let Some(built) = &self.built else { return };
        queue.write_buffer(
            &built.global_buffer,
            0,
            bytemuck::bytes_of(&PbrUniforms::new(projection, &self.settings)),
        );

        for id in unique_material_ids(material_ids) {
            let Some(set) = textures.get(id) else { continue };
            let current = self.materials.get(&id).map(|m| m.generation);
            if current != Some(set.generation) {
                let binding =
                    create_material_binding(device, &built.material_layout, "pbr", id, set);
                self.materials.insert(id, binding);
            }
        }
    }

    pub fn draw<'p>(
        &'p self,
        pass: &mut wgpu::RenderPass<'p>,
        mesh: &'p MeshBufferSet,
        material_id: u32,
    ) -> bool {
        let Some(built) = &self.built else { return false };
        let Some(material) = self.materials.get(&material_id) else {
            return false;
        };

        pass.set_pipeline(&built.pipeline);
        pass.set_bind_group(0, &built.global_bind_group, &[]);
        pass.set_bind_group(1, &material.bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.position.slice(..));
        pass.set_vertex_buffer(1, mesh.normal.slice(..));
        pass.set_vertex_buffer(2, mesh.uv.slice(..));
        pass.draw(0..mesh.vertex_count, 0..1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_pack_settings() {
        let projection = Projection::new();
        let settings = PbrSettings::default();
        let u = PbrUniforms::new(&projection, &settings);
        assert_eq!(u.metallic_roughness[0], 0.7);
        assert_eq!(u.metallic_roughness[1], 0.5);
        assert_eq!(u.light_color[3], 0.0);
        assert_eq!(u.base_color_factor, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn settings_update_never_drops_the_pipeline() {
        let mut program = PbrProgram::new(PbrSettings::default());
        let ready_before = program.pipeline_ready();
        program.update_settings(PbrSettings {
            metallic_roughness: [0.1, 0.9],
            ..PbrSettings::default()
        });
        assert_eq!(program.pipeline_ready(), ready_before);
        assert_eq!(program.settings.metallic_roughness, [0.1, 0.9]);
    }
}
