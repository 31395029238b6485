//! Wire formats and CPU-side data model for the ship viewer.
//!
//! Ships arrive from the server in packed little-endian binary layouts
//! produced by the import tooling. This crate owns the decoders, their
//! encoding inverses, and the plain-data records shared with the renderer.

pub mod bounds;
pub mod error;
pub mod model;
mod reader;
pub mod ship;
pub mod texture;

pub use bounds::BoundingBox;
pub use error::DecodeError;
pub use model::{MeshData, ShipModel};
pub use ship::{ShipDetails, TexturePaths};
pub use texture::{ShipTexture, TextureMeta, TexturePack};
