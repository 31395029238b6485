//! GPU texture cache keyed by material id.
//!
//! On model load every unique material id immediately gets 1×1 placeholder
//! textures so drawing can start before any network fetch completes. Real
//! packs stream in later and replace the placeholders; failures swap in a
//! visually distinct error placeholder instead. Pack fetches are issued once
//! per unique material id regardless of how many meshes share it.

use std::collections::HashMap;

use wgpu::{Device, Queue, TextureView};

use hangar_data::{ShipDetails, ShipModel, ShipTexture, TextureMeta, TexturePack};

use crate::assets::AssetError;
use crate::loader::Loader;

/// Opaque blue: base-channel placeholder while loading.
const PLACEHOLDER_BASE: [u8; 4] = [0, 0, 255, 255];
/// Opaque black: light-channel placeholder (adds no glow).
const PLACEHOLDER_LIGHT: [u8; 4] = [0, 0, 0, 255];
/// Flat normal: bump-channel placeholder.
const PLACEHOLDER_BUMP: [u8; 4] = [128, 128, 255, 255];
/// Translucent dark: distinguishable error placeholder.
const PLACEHOLDER_ERROR: [u8; 4] = [0, 0, 0, 220];

pub struct TextureChannel {
    texture: wgpu::Texture,
    pub view: TextureView,
}

/// One material's GPU-side textures plus shading metadata.
pub struct TextureSet {
    pub base: TextureChannel,
    pub light: TextureChannel,
    pub bump: TextureChannel,
    pub has_bump: bool,
    pub meta: Option<TextureMeta>,
    pub sampler: wgpu::Sampler,
    /// Bumped every time a channel handle is replaced, so programs know to
    /// rebuild their bind groups.
    pub generation: u64,
}

#[derive(Default)]
pub struct TextureCache {
    entries: HashMap<u32, TextureSet>,
    loaded: bool,
}

/// Material ids in first-seen order with duplicates removed: the fetch plan
/// for one model load.
pub fn unique_material_ids(material_ids: &[u32]) -> Vec<u32> {
    let mut seen = Vec::new();
    for &id in material_ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, material_id: u32) -> Option<&TextureSet> {
        self.entries.get(&material_id)
    }

    /// Install placeholders for every unique material and issue one pack
    /// fetch each. Materials without registered paths fail immediately (no
    /// fallback path exists) and show the error placeholder.
    pub fn begin_load(
        &mut self,
        device: &Device,
        queue: &Queue,
        model: &ShipModel,
        ship: &ShipDetails,
        loader: &Loader,
        generation: u64,
    ) {
        for id in unique_material_ids(&model.material_ids) {
            self.entries
                .insert(id, placeholder_set(device, queue, id, false));

            match ship.texture_paths.get(&id) {
                Some(paths) => loader.request_pack(generation, id, paths.clone()),
                None => {
                    tracing::error!(material = id, "{}", AssetError::UnknownMaterial(id));
                    self.swap_in(id, placeholder_set(device, queue, id, true));
                }
            }
        }
        self.loaded = true;
    }

    /// Handle a completed pack fetch for the current generation.
    pub fn apply(
        &mut self,
        device: &Device,
        queue: &Queue,
        material_id: u32,
        pack: Result<TexturePack, AssetError>,
    ) {
        let set = match pack {
            Ok(pack) => upload_pack(device, queue, material_id, &pack),
            Err(e) => {
                tracing::error!(material = material_id, error = %e, "texture pack load failed");
                placeholder_set(device, queue, material_id, true)
            }
        };
        self.swap_in(material_id, set);
    }

    fn swap_in(&mut self, material_id: u32, mut set: TextureSet) {
        let next_generation = match self.entries.remove(&material_id) {
            Some(old) => {
                old.base.texture.destroy();
                old.light.texture.destroy();
                old.bump.texture.destroy();
                old.generation + 1
            }
            None => 1,
        };
        set.generation = next_generation;
        self.entries.insert(material_id, set);
    }

    /// Free every texture across every channel for every material.
    pub fn destroy(&mut self) {
        for (_, set) in self.entries.drain() {
            set.base.texture.destroy();
            set.light.texture.destroy();
            set.bump.texture.destroy();
        }
        self.loaded = false;
    }
}

fn placeholder_set(device: &Device, queue: &Queue, material_id: u32, error: bool) -> TextureSet {
    let base_color = if error { PLACEHOLDER_ERROR } else { PLACEHOLDER_BASE };
    TextureSet {
        base: solid_texture(device, queue, material_id, "base", base_color, true),
        light: solid_texture(device, queue, material_id, "light", PLACEHOLDER_LIGHT, true),
        bump: solid_texture(device, queue, material_id, "bump", PLACEHOLDER_BUMP, false),
        has_bump: false,
        meta: None,
        sampler: clamp_sampler(device),
        generation: 0,
    }
}

fn upload_pack(device: &Device, queue: &Queue, material_id: u32, pack: &TexturePack) -> TextureSet {
    let mips = is_power_of_two(pack.base.width) && is_power_of_two(pack.base.height);

    let base = upload_texture(device, queue, material_id, "base", &pack.base, mips, true);
    let light = match &pack.light {
        Some(tex) => upload_texture(device, queue, material_id, "light", tex, false, true),
        None => solid_texture(device, queue, material_id, "light", PLACEHOLDER_LIGHT, true),
    };
    let bump = match &pack.bump {
        Some(tex) => upload_texture(device, queue, material_id, "bump", tex, false, false),
        None => solid_texture(device, queue, material_id, "bump", PLACEHOLDER_BUMP, false),
    };

    let sampler = if mips {
        mipmap_sampler(device)
    } else {
        clamp_sampler(device)
    };

    TextureSet {
        base,
        light,
        bump,
        has_bump: pack.bump.is_some(),
        meta: pack.meta,
        sampler,
        generation: 0,
    }
}

fn solid_texture(
    device: &Device,
    queue: &Queue,
    material_id: u32,
    channel: &str,
    color: [u8; 4],
    srgb: bool,
) -> TextureChannel {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("mat_{material_id}_{channel}_placeholder")),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(srgb),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_level(queue, &texture, 0, &color, 1, 1);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureChannel { texture, view }
}

fn upload_texture(
    device: &Device,
    queue: &Queue,
    material_id: u32,
    channel: &str,
    tex: &ShipTexture,
    mips: bool,
    srgb: bool,
) -> TextureChannel {
    let mip_level_count = if mips {
        mip_levels(tex.width, tex.height)
    } else {
        1
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("mat_{material_id}_{channel}")),
        size: wgpu::Extent3d {
            width: tex.width,
            height: tex.height,
            depth_or_array_layers: 1,
        },
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(srgb),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let mut level = if tex.inversion {
        flip_rows(&tex.pixels, tex.width, tex.height)
    } else {
        tex.pixels.clone()
    };
    let (mut w, mut h) = (tex.width, tex.height);
    write_level(queue, &texture, 0, &level, w, h);

    for mip in 1..mip_level_count {
        level = next_mip(&level, w, h);
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        write_level(queue, &texture, mip, &level, w, h);
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureChannel { texture, view }
}

fn texture_format(srgb: bool) -> wgpu::TextureFormat {
    if srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn write_level(queue: &Queue, texture: &wgpu::Texture, mip: u32, data: &[u8], w: u32, h: u32) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(w * 4),
            rows_per_image: Some(h),
        },
        wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
    );
}

fn clamp_sampler(device: &Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("clamp_linear"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn mipmap_sampler(device: &Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("repeat_mipmap"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

pub(crate) fn is_power_of_two(v: u32) -> bool {
    v != 0 && v & (v - 1) == 0
}

/// Number of mip levels for a full chain down to 1×1.
pub(crate) fn mip_levels(w: u32, h: u32) -> u32 {
    32 - w.max(h).max(1).leading_zeros()
}

/// Reverse row order (the wire format stores some images bottom-up).
pub(crate) fn flip_rows(pixels: &[u8], w: u32, h: u32) -> Vec<u8> {
    let row = w as usize * 4;
    let mut out = Vec::with_capacity(pixels.len());
    for y in (0..h as usize).rev() {
        out.extend_from_slice(&pixels[y * row..(y + 1) * row]);
    }
    out
}

/// Box-filter the next mip level from the previous one.
pub(crate) fn next_mip(pixels: &[u8], w: u32, h: u32) -> Vec<u8> {
    let (nw, nh) = ((w / 2).max(1), (h / 2).max(1));
    let mut out = vec![0u8; nw as usize * nh as usize * 4];

    for y in 0..nh {
        for x in 0..nw {
            // Clamp source coordinates so 1-wide/1-tall levels sample twice.
            let x0 = (x * 2).min(w - 1) as usize;
            let x1 = (x * 2 + 1).min(w - 1) as usize;
            let y0 = (y * 2).min(h - 1) as usize;
            let y1 = (y * 2 + 1).min(h - 1) as usize;

            for c in 0..4 {
                let sum = pixels[(y0 * w as usize + x0) * 4 + c] as u32
                    + pixels[(y0 * w as usize + x1) * 4 + c] as u32
                    + pixels[(y1 * w as usize + x0) * 4 + c] as u32
                    + pixels[(y1 * w as usize + x1) * 4 + c] as u32;
                out[(y * nw + x) as usize * 4 + c] = (sum / 4) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::loader::Loader;
    use hangar_data::TexturePaths;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn dedup_keeps_first_seen_order() {
        assert_eq!(unique_material_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert_eq!(unique_material_ids(&[]), Vec::<u32>::new());
        assert_eq!(unique_material_ids(&[5, 5, 5]), vec![5]);
    }

    #[test]
    fn one_fetch_per_unique_material() {
        let source = Arc::new(MemorySource::new());
        for id in [1u32, 2, 3] {
            source.insert(
                format!("{id}.tex"),
                ShipTexture {
                    width: 1,
                    height: 1,
                    inversion: false,
                    pixels: vec![0, 0, 0, 255],
                }
                .encode(),
            );
        }

        let (loader, rx) = Loader::new(source.clone());
        // Meshes referencing materials [3,1,3,2,1] load exactly three packs.
        let plan = unique_material_ids(&[3, 1, 3, 2, 1]);
        for &id in &plan {
            loader.request_pack(
                1,
                id,
                TexturePaths {
                    base: format!("{id}.tex"),
                    light: None,
                    bump: None,
                    meta: None,
                },
            );
        }

        for _ in 0..plan.len() {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(source.fetch_count(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn power_of_two_detection() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(256));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(48));
    }

    #[test]
    fn mip_chain_length() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(256, 256), 9);
        assert_eq!(mip_levels(256, 64), 9);
    }

    #[test]
    fn flip_reverses_rows_only() {
        // 1x3 image, one pixel per row.
        let pixels = vec![
            1, 1, 1, 1, //
            2, 2, 2, 2, //
            3, 3, 3, 3,
        ];
        let flipped = flip_rows(&pixels, 1, 3);
        assert_eq!(flipped[..4], [3, 3, 3, 3]);
        assert_eq!(flipped[8..], [1, 1, 1, 1]);
        // Flipping twice restores the original.
        assert_eq!(flip_rows(&flipped, 1, 3), pixels);
    }

    #[test]
    fn mip_downsample_averages_quads() {
        // 2x2 image, all channels equal per pixel.
        let pixels = vec![
            0, 0, 0, 0, //
            4, 4, 4, 4, //
            8, 8, 8, 8, //
            12, 12, 12, 12,
        ];
        let mip = next_mip(&pixels, 2, 2);
        assert_eq!(mip, vec![6, 6, 6, 6]);
        // Chain terminates at 1x1.
        assert_eq!(next_mip(&mip, 1, 1), vec![6, 6, 6, 6]);
    }
}
