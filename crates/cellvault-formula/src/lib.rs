pub mod dependency;
pub mod references;

pub use dependency::{build_dependency_maps, AdjacencyMap, DependencyGraph};
pub use references::{extract_all_cell_references, MAX_RANGE_CELLS};
