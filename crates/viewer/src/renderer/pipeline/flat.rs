//! Lambert-style mesh program.
//!
//! Lighting and texturing toggles are compile-time shader constants, so a
//! settings change rebuilds the pipeline from the cached source text.

use std::collections::HashMap;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPipeline, TextureFormat};

use super::super::buffers::{self, MeshBufferSet};
use super::super::context::DEPTH_FORMAT;
use super::super::projection::Projection;
use super::super::textures::{unique_material_ids, TextureCache, TextureSet};
use super::{create_shader_checked, substitute_defines, MaterialUniforms, MatrixUniforms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatFlags {
    pub lamberts: bool,
    pub textures: bool,
    pub debug_lights: bool,
}

struct Globals {
    buffer: Buffer,
    bind_group: BindGroup,
}

pub(super) struct MaterialBinding {
    pub(super) generation: u64,
    _buffer: Buffer,
    pub(super) bind_group: BindGroup,
}

struct Built {
    pipeline: RenderPipeline,
    material_layout: BindGroupLayout,
    globals: Globals,
}

pub struct FlatProgram {
    flags: FlatFlags,
    source: Option<String>,
    format: Option<TextureFormat>,
    built: Option<Built>,
    materials: HashMap<u32, MaterialBinding>,
}

impl FlatProgram {
    pub fn new(flags: FlatFlags) -> Self {
        Self {
            flags,
            source: None,
            format: None,
            built: None,
            materials: HashMap::new(),
        }
    }

    pub fn pipeline_ready(&self) -> bool {
        self.built.is_some()
    }

    /// Shader text arrived: cache it and build the pipeline.
    pub fn install_source(&mut self, device: &Device, format: TextureFormat, source: String) {
        self.source = Some(source);
        self.format = Some(format);
        self.build(device);
    }

    /// Flag changes recompile against the cached source. If the source has
    /// not arrived yet the new flags simply apply when it does.
    pub fn update_settings(&mut self, device: &Device, flags: FlatFlags) {
        if flags == self.flags {
            return;
        }
        self.flags = flags;
        self.build(device);
    }

    pub fn destroy(&mut self) {
        self.built = None;
        self.materials.clear();
        self.source = None;
        self.format = None;
    }

    fn defines(&self) -> [(&'static str, bool); 3] {
        [
            ("LAMBERTS", self.flags.lamberts),
            ("TEXTURES", self.flags.textures),
            ("DEBUG_LIGHTS", self.flags.debug_lights),
        ]
    }

    fn build(&mut self, device: &Device) {
        let (Some(source), Some(format)) = (self.source.as_deref(), self.format) else {
            return;
        };
        // Bind groups reference the previous layout; rebuild them lazily.
        self.materials.clear();

        let shader = substitute_defines(source, &self.defines());
        let module = match create_shader_checked(device, "flat_shader", &shader) {
            Ok(module) => module,
            Err(e) => {
                tracing::error!(error = %e, "flat program build failed");
                self.built = None;
                return;
            }
        };

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("flat_global_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });
        let material_layout = material_bind_group_layout(device, "flat_material_layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flat_pipeline_layout"),
            bind_group_layouts: &[&global_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("flat_pipeline"),
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

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("flat_globals"),
            contents: bytemuck::bytes_of(&MatrixUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("flat_global_bind_group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        self.built = Some(Built {
            pipeline,
            material_layout,
            globals: Globals { buffer, bind_group },
        });
    }

    /// Write frame uniforms and refresh material bind groups whose texture
    /// set changed since the last frame.
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
            &built.globals.buffer,
            0,
            bytemuck::bytes_of(&MatrixUniforms::new(projection)),
        );

        for id in unique_material_ids(material_ids) {
            let Some(set) = textures.get(id) else { continue };
            let current = self.materials.get(&id).map(|m| m.generation);
            if current != Some(set.generation) {
                let binding =
                    create_material_binding(device, &built.material_layout, "flat", id, set);
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
        pass.set_bind_group(0, &built.globals.bind_group, &[]);
        pass.set_bind_group(1, &material.bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.position.slice(..));
        pass.set_vertex_buffer(1, mesh.normal.slice(..));
        pass.set_vertex_buffer(2, mesh.uv.slice(..));
        pass.draw(0..mesh.vertex_count, 0..1);
        true
    }
}

pub(super) fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Shared material bind group layout: constants + base/light/bump textures +
/// sampler. Both mesh programs use the same shape.
pub(super) fn material_bind_group_layout(device: &Device, label: &str) -> BindGroupLayout {
    let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
            texture_entry(1),
            texture_entry(2),
            texture_entry(3),
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub(super) fn create_material_binding(
    device: &Device,
    layout: &BindGroupLayout,
    program: &str,
    material_id: u32,
    set: &TextureSet,
) -> MaterialBinding {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{program}_material_{material_id}")),
        contents: bytemuck::bytes_of(&MaterialUniforms::new(set.meta, set.has_bump)),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{program}_material_{material_id}_bind_group")),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&set.base.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&set.light.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&set.bump.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(&set.sampler),
            },
        ],
    });
    MaterialBinding {
        generation: set.generation,
        _buffer: buffer,
        bind_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_change_only_marks_changed_flags() {
        let flags = FlatFlags {
            lamberts: true,
            textures: true,
            debug_lights: false,
        };
        let mut program = FlatProgram::new(flags);
        // Without source or device interaction the flags still update.
        program.flags = FlatFlags {
            lamberts: false,
            ..flags
        };
        let defines = program.defines();
        assert_eq!(defines[0], ("LAMBERTS", false));
        assert_eq!(defines[1], ("TEXTURES", true));
    }

    #[test]
    fn unbuilt_program_is_not_ready() {
        let program = FlatProgram::new(FlatFlags {
            lamberts: true,
            textures: true,
            debug_lights: false,
        });
        assert!(!program.pipeline_ready());
    }
}
