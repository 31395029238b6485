//! Ship records supplied by the detail API.
//!
//! The viewer core only reads these: the surrounding UI fetches and owns
//! them, the renderer resolves model and texture paths through them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Static paths for one material's texture channels. Only `base` is
/// guaranteed to exist; the rest are absent for materials without those
/// channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TexturePaths {
    pub base: String,
    #[serde(default)]
    pub light: Option<String>,
    #[serde(default)]
    pub bump: Option<String>,
    #[serde(default)]
    pub meta: Option<String>,
}

/// The slice of the ship-detail record the render core consumes: identity,
/// the available LOD names, and the path maps for model and texture fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipDetails {
    pub id: u32,
    pub name: String,
    pub lods: Vec<String>,
    /// LOD name -> model buffer path.
    pub model_paths: HashMap<String, String>,
    /// Material id -> texture channel paths.
    pub texture_paths: HashMap<u32, TexturePaths>,
}

impl ShipDetails {
    /// The default LOD to show: lexicographically first, matching the order
    /// the detail UI presents them in.
    pub fn default_lod(&self) -> Option<&str> {
        self.lods.iter().min().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_api_record() {
        let ship: ShipDetails = serde_json::from_str(
            r#"{
                "id": 42,
                "name": "Starflier",
                "lods": ["Level1", "Level0"],
                "model_paths": {"Level0": "42.model.level0.dat"},
                "texture_paths": {
                    "3": {"base": "3.tex", "light": "3.light.tex"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(ship.default_lod(), Some("Level0"));
        let paths = &ship.texture_paths[&3];
        assert_eq!(paths.light.as_deref(), Some("3.light.tex"));
        assert!(paths.bump.is_none());
    }
}
