//! Schema knowledge: the store's own catalog and the graph-backed resolver.

pub mod catalog;
pub mod graph;
pub mod resolver;

pub use catalog::{ColumnInfo, ForeignKey, SchemaCatalog, TableSchema};
pub use graph::{GraphSchema, GraphStore, Neo4jHttpStore};
pub use resolver::SchemaResolver;
