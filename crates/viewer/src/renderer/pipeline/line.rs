//! Bounding-box wireframe program.
//!
//! Draws the shared unit-cube edge buffer, positioned by the bounding
//! transform matrix instead of a model normal matrix. Supports an optional
//! dashed pattern.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, Buffer, Device, Queue, RenderPipeline, TextureFormat};

use super::super::buffers::{self, BOUNDING_VERTEX_COUNT};
use super::super::context::DEPTH_FORMAT;
use super::super::projection::Projection;
use super::flat::uniform_entry;
use super::{create_shader_checked, substitute_defines};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct LineUniforms {
    projection: [[f32; 4]; 4],
    model_view: [[f32; 4]; 4],
    transform: [[f32; 4]; 4],
}

struct Built {
    pipeline: RenderPipeline,
    buffer: Buffer,
    bind_group: BindGroup,
}

pub struct LineProgram {
    dashed: bool,
    source: Option<String>,
    format: Option<TextureFormat>,
    built: Option<Built>,
}

impl LineProgram {
    pub fn new(dashed: bool) -> Self {
        Self {
            dashed,
            source: None,
            format: None,
            built: None,
        }
    }

    pub fn loaded(&self) -> bool {
        self.built.is_some()
    }

    pub fn install_source(&mut self, device: &Device, format: TextureFormat, source: String) {
        self.source = Some(source);
        self.format = Some(format);
        self.build(device);
    }

    pub fn destroy(&mut self) {
        self.built = None;
        self.source = None;
        self.format = None;
    }

    fn build(&mut self, device: &Device) {
        let (Some(source), Some(format)) = (self.source.as_deref(), self.format) else {
            return;
        };

        let shader = substitute_defines(source, &[("DASHED", self.dashed)]);
        let module = match create_shader_checked(device, "line_shader", &shader) {
            Ok(module) => module,
            Err(e) => {
                tracing::error!(error = %e, "line program build failed");
                self.built = None;
                return;
            }
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("line_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("line_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("line_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[buffers::position_layout()],
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
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("line_uniforms"),
            contents: bytemuck::bytes_of(&LineUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("line_bind_group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        self.built = Some(Built {
            pipeline,
            buffer,
            bind_group,
        });
    }

    pub fn prepare(&self, queue: &Queue, projection: &Projection) {
        let Some(built) = &self.built else { return };
        let uniforms = LineUniforms {
            projection: projection.projection_matrix().to_cols_array_2d(),
            model_view: projection.model_view_matrix().to_cols_array_2d(),
            transform: projection.bounding_matrix().to_cols_array_2d(),
        };
        queue.write_buffer(&built.buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn draw<'p>(&'p self, pass: &mut wgpu::RenderPass<'p>, bounding: &'p Buffer) -> bool {
        let Some(built) = &self.built else { return false };
        pass.set_pipeline(&built.pipeline);
        pass.set_bind_group(0, &built.bind_group, &[]);
        pass.set_vertex_buffer(0, bounding.slice(..));
        pass.draw(0..BOUNDING_VERTEX_COUNT, 0..1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unloaded() {
        let program = LineProgram::new(true);
        assert!(!program.loaded());
    }
}
