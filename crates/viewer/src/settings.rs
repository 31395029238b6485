//! Render settings owned by the surrounding UI.
//!
//! The UI mutates a copy and pushes it through [`Renderer::set_settings`];
//! the renderer diffs old vs new to decide whether the active program must
//! be rebuilt, updated in place, or left alone.
//!
//! [`Renderer::set_settings`]: crate::renderer::Renderer::set_settings

/// Which mesh program is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Flat,
    Pbr,
}

/// Runtime-tunable parameters for the PBR program. Applied as uniforms every
/// draw; changing them never recompiles anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrSettings {
    pub metallic_roughness: [f32; 2],
    pub base_color_factor: [f32; 4],
    pub light_color: [f32; 3],
    pub light_direction: [f32; 3],
    pub emissive_factor: [f32; 3],
    pub camera: [f32; 3],
}

impl Default for PbrSettings {
    fn default() -> Self {
        Self {
            metallic_roughness: [0.7, 0.5],
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            light_color: [1.0, 1.0, 1.0],
            light_direction: [0.5, 0.5, 0.1],
            emissive_factor: [0.8, 0.8, 0.8],
            camera: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub auto_rotate: bool,
    pub selected_lod: String,
    pub bounding_box: bool,
    pub draw_textures: bool,
    pub draw_lights: bool,
    pub shader: ShaderKind,
    pub pbr: PbrSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            selected_lod: "Level0".into(),
            bounding_box: false,
            draw_textures: true,
            draw_lights: true,
            shader: ShaderKind::Flat,
            pbr: PbrSettings::default(),
        }
    }
}

/// What the renderer has to do to honor a settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SettingsAction {
    /// Nothing shader-related changed.
    None,
    /// The active shader kind changed: destroy and rebuild the program.
    RebuildProgram,
    /// Lighting/texturing flags changed: push new settings into the program.
    UpdateProgram,
}

pub(crate) fn diff(old: &RenderSettings, new: &RenderSettings) -> SettingsAction {
    if new.shader != old.shader {
        SettingsAction::RebuildProgram
    } else if new.draw_lights != old.draw_lights || new.draw_textures != old.draw_textures {
        SettingsAction::UpdateProgram
    } else {
        SettingsAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_settings_are_a_noop() {
        let settings = RenderSettings::default();
        assert_eq!(diff(&settings, &settings.clone()), SettingsAction::None);
    }

    #[test]
    fn shader_switch_wins_over_flag_changes() {
        let old = RenderSettings::default();
        let mut new = old.clone();
        new.shader = ShaderKind::Pbr;
        new.draw_lights = false;
        assert_eq!(diff(&old, &new), SettingsAction::RebuildProgram);
    }

    #[test]
    fn flag_changes_update_in_place() {
        let old = RenderSettings::default();
        let mut new = old.clone();
        new.draw_textures = false;
        assert_eq!(diff(&old, &new), SettingsAction::UpdateProgram);
    }

    #[test]
    fn unrelated_changes_touch_nothing() {
        let old = RenderSettings::default();
        let mut new = old.clone();
        new.auto_rotate = false;
        new.bounding_box = true;
        assert_eq!(diff(&old, &new), SettingsAction::None);
    }
}
