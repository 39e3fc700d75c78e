#![forbid(unsafe_code)]
//! Copy-on-write persistent state: edit a draft of an immutable tree with ordinary writes and
//! commit it into a new sealed snapshot that shares every untouched subtree with the old one.
//! Commits can be recorded as patches and replayed against any base through the same
//! draft/freeze pipeline.

pub mod apply;
pub mod config;
pub mod draft;
pub mod engine;
pub mod error;
pub mod freeze;
#[cfg(feature = "serde")]
pub mod json;
pub mod patch;
pub mod path;
pub mod record;
mod recorder;
pub mod value;

pub use config::{Config, DEFAULT_MAX_DEPTH};
pub use draft::{Draft, DraftSession, Produced};
pub use engine::{Engine, RecipeOutput};
pub use error::{Error, Result};
pub use freeze::Freezer;
pub use patch::{Patch, PatchOp};
pub use path::{Path, PathSeg};
pub use record::Record;
pub use value::{Kind, Leaf, Node, RecordRef, Value};

/// [`Engine::produce`] with the default configuration.
pub fn produce<R, E, F>(base: &Value, recipe: F) -> std::result::Result<Value, E>
where
    R: RecipeOutput,
    E: From<Error>,
    F: FnOnce(&Draft) -> std::result::Result<R, E>,
{
    Engine::default().produce(base, recipe)
}

/// [`Engine::produce_with_patches`] with the default configuration.
pub fn produce_with_patches<R, E, F>(base: &Value, recipe: F) -> std::result::Result<Produced, E>
where
    R: RecipeOutput,
    E: From<Error>,
    F: FnOnce(&Draft) -> std::result::Result<R, E>,
{
    Engine::default().produce_with_patches(base, recipe)
}

/// [`Engine::apply_patches`] with the default configuration.
pub fn apply_patches(base: &Value, patches: &[Patch]) -> Result<Value> {
    Engine::default().apply_patches(base, patches)
}

/// [`Engine::freeze`] with the default configuration.
pub fn freeze(value: Value) -> Result<Value> {
    Engine::default().freeze(value)
}
