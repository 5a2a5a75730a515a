//! Target schema: the declared end state for every facility category.
//!
//! The raw JSON file is parsed into loosely-typed structs, validated, and then
//! normalized into an immutable `TargetSchema` handed to the engine.
/// Current schema version for `schema.json`.
pub const SCHEMA_VERSION: u32 = 1;
/// File name looked up in the user config dir when `--schema` is omitted.
pub const DEFAULT_SCHEMA_FILE: &str = "schema.json";

mod load;
mod types;

pub use load::{default_schema_path, load_schema};
#[cfg(test)]
pub use load::parse_schema;
pub use types::*;
