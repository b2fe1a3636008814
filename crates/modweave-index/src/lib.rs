//! # modweave index
//!
//! Deterministic aggregation of discovered elements into a single, canonically
//! named index artifact. The identity of an artifact depends only on the set of
//! distinct element names, never on discovery order or duplicate counts.

pub mod error;
pub mod generator;
pub mod naming;
pub mod render;

pub use error::IndexError;
pub use generator::{aggregate, normalize_name, IndexArtifact, IndexGenerator, INDEX_PREFIX};
pub use naming::stable_name;
pub use render::{parse_index, render_index, IndexRegistry, ParsedIndex, REGISTRY_NAME};
