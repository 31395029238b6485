//! Shader programs.
//!
//! Three programs exist: flat (lambert-style), PBR (metallic-roughness) and
//! line (bounding wireframe). Instead of a class hierarchy the mesh programs
//! are a tagged variant selected by [`ShaderKind`]; the line program stands
//! alone because its contract differs (bounding transform instead of a
//! normal matrix).
//!
//! Shader text is fetched asynchronously from static paths and contains a
//! `%DEFINITIONS%` placeholder. Programs substitute one `const FLAG: bool`
//! line per boolean setting before compiling, so a program only becomes
//! usable once its source has arrived and built cleanly.

mod flat;
mod line;
mod pbr;

pub use flat::{FlatFlags, FlatProgram};
pub use line::LineProgram;
pub use pbr::PbrProgram;

use bytemuck::{Pod, Zeroable};
use wgpu::Device;

use hangar_data::TextureMeta;

use super::projection::Projection;
use super::textures::TextureCache;
use super::RendererError;
use crate::loader::{Loader, ProgramSlot};
use crate::settings::{PbrSettings, RenderSettings, ShaderKind};

pub const FLAT_SHADER_PATH: &str = "shaders/flat.wgsl";
pub const PBR_SHADER_PATH: &str = "shaders/pbr.wgsl";
pub const LINE_SHADER_PATH: &str = "shaders/line.wgsl";

const DEFINITIONS_PLACEHOLDER: &str = "%DEFINITIONS%";

/// Replace the `%DEFINITIONS%` placeholder with one const line per flag,
/// newline-joined. Every known flag is emitted so the shader always sees a
/// complete set.
pub(crate) fn substitute_defines(source: &str, defines: &[(&str, bool)]) -> String {
    let lines: Vec<String> = defines
        .iter()
        .map(|(name, value)| format!("const {name}: bool = {value};"))
        .collect();
    source.replace(DEFINITIONS_PLACEHOLDER, &lines.join("\n"))
}

/// Compile WGSL with validation captured, so a bad shader reports instead of
/// taking the process down. The affected program stays unloaded, which keeps
/// the frame loop polling rather than drawing.
pub(crate) fn create_shader_checked(
    device: &Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, RendererError> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RendererError::Shader(error.to_string()));
        }
        Ok(module)
    }
    #[cfg(target_arch = "wasm32")]
    {
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }
}

/// Projection/model-view/normal matrices, shared by both mesh programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct MatrixUniforms {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl MatrixUniforms {
    pub fn new(projection: &Projection) -> Self {
        Self {
            projection: projection.projection_matrix().to_cols_array_2d(),
            model_view: projection.model_view_matrix().to_cols_array_2d(),
            normal: projection.normal_matrix().to_cols_array_2d(),
        }
    }
}

/// Per-material shading constants: registered diffuse color, opacity mix and
/// channel-presence flags.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct MaterialUniforms {
    pub diffuse_color: [f32; 4],
    /// x/y: opacity mix pair, z: has_bump, w: has registered metadata.
    pub params: [f32; 4],
}

impl MaterialUniforms {
    pub fn new(meta: Option<TextureMeta>, has_bump: bool) -> Self {
        match meta {
            Some(meta) => Self {
                diffuse_color: meta.diffuse_color,
                params: [meta.opacity[0], meta.opacity[1], has_bump as u32 as f32, 1.0],
            },
            None => Self {
                diffuse_color: [1.0, 1.0, 1.0, 1.0],
                params: [1.0, 0.0, has_bump as u32 as f32, 0.0],
            },
        }
    }
}

/// The active mesh program, selected by shader kind at construction.
pub enum MeshProgram {
    Flat(FlatProgram),
    Pbr(PbrProgram),
}

impl MeshProgram {
    pub fn create(settings: &RenderSettings) -> Self {
        match settings.shader {
            ShaderKind::Flat => Self::Flat(FlatProgram::new(FlatFlags {
                lamberts: settings.draw_lights,
                textures: settings.draw_textures,
                debug_lights: false,
            })),
            ShaderKind::Pbr => Self::Pbr(PbrProgram::new(settings.pbr)),
        }
    }

    pub fn kind(&self) -> ShaderKind {
        match self {
            Self::Flat(_) => ShaderKind::Flat,
            Self::Pbr(_) => ShaderKind::Pbr,
        }
    }

    /// Ask the loader for this program's shader text.
    pub fn request_source(&self, loader: &Loader, generation: u64) {
        let (kind, path) = match self {
            Self::Flat(_) => (ShaderKind::Flat, FLAT_SHADER_PATH),
            Self::Pbr(_) => (ShaderKind::Pbr, PBR_SHADER_PATH),
        };
        loader.request_shader(generation, ProgramSlot::Mesh(kind), path);
    }

    pub fn install_source(
        &mut self,
        device: &Device,
        format: wgpu::TextureFormat,
        source: String,
    ) {
        match self {
            Self::Flat(p) => p.install_source(device, format, source),
            Self::Pbr(p) => p.install_source(device, format, source),
        }
    }

    /// Push changed settings into the program. Flat rebuilds its pipeline
    /// (the flags are compile-time constants); PBR only updates uniforms.
    pub fn update_settings(&mut self, device: &Device, settings: &RenderSettings) {
        match self {
            Self::Flat(p) => p.update_settings(
                device,
                FlatFlags {
                    lamberts: settings.draw_lights,
                    textures: settings.draw_textures,
                    debug_lights: false,
                },
            ),
            Self::Pbr(p) => p.update_settings(settings.pbr),
        }
    }

    pub fn update_pbr(&mut self, pbr: PbrSettings) {
        if let Self::Pbr(p) = self {
            p.update_settings(pbr);
        }
    }

    pub fn prepare(
        &mut self,
        device: &Device,
        queue: &wgpu::Queue,
        projection: &Projection,
        textures: &TextureCache,
        material_ids: &[u32],
    ) {
        match self {
            Self::Flat(p) => p.prepare(device, queue, projection, textures, material_ids),
            Self::Pbr(p) => p.prepare(device, queue, projection, textures, material_ids),
        }
    }

    /// Bind and draw one mesh. Returns whether a draw call was issued.
    pub fn draw<'p>(
        &'p self,
        pass: &mut wgpu::RenderPass<'p>,
        mesh: &'p super::buffers::MeshBufferSet,
        material_id: u32,
    ) -> bool {
        match self {
            Self::Flat(p) => p.draw(pass, mesh, material_id),
            Self::Pbr(p) => p.draw(pass, mesh, material_id),
        }
    }

    /// Usable once the pipeline linked and the texture set is available.
    pub fn loaded(&self, textures: &TextureCache) -> bool {
        let pipeline_ready = match self {
            Self::Flat(p) => p.pipeline_ready(),
            Self::Pbr(p) => p.pipeline_ready(),
        };
        pipeline_ready && textures.loaded()
    }

    pub fn destroy(&mut self) {
        match self {
            Self::Flat(p) => p.destroy(),
            Self::Pbr(p) => p.destroy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_emits_one_line_per_flag() {
        let source = "%DEFINITIONS%\nfn main() {}";
        let out = substitute_defines(
            source,
            &[("LAMBERTS", true), ("TEXTURES", false), ("DEBUG_LIGHTS", false)],
        );
        assert!(out.contains("const LAMBERTS: bool = true;"));
        assert!(out.contains("const TEXTURES: bool = false;"));
        assert!(out.contains("const DEBUG_LIGHTS: bool = false;"));
        assert!(!out.contains(DEFINITIONS_PLACEHOLDER));
        assert!(out.ends_with("fn main() {}"));
    }

    #[test]
    fn shipped_shaders_substitute_cleanly() {
        for (path, flags) in [
            (
                include_str!("../../../shaders/flat.wgsl"),
                vec![
                    ("LAMBERTS", true),
                    ("TEXTURES", true),
                    ("DEBUG_LIGHTS", false),
                ],
            ),
            (include_str!("../../../shaders/line.wgsl"), vec![("DASHED", true)]),
        ] {
            let out = substitute_defines(path, &flags);
            assert!(!out.contains(DEFINITIONS_PLACEHOLDER));
        }
    }

    #[test]
    fn material_uniforms_default_without_meta() {
        let u = MaterialUniforms::new(None, false);
        assert_eq!(u.diffuse_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(u.params[3], 0.0);

        let meta = TextureMeta {
            diffuse_color: [0.5, 0.25, 0.125, 1.0],
            opacity: [0.8, 0.2],
        };
        let u = MaterialUniforms::new(Some(meta), true);
        assert_eq!(u.diffuse_color, meta.diffuse_color);
        assert_eq!(u.params, [0.8, 0.2, 1.0, 1.0]);
    }
}
