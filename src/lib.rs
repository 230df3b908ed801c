//! g2d: ORM-annotated struct declarations in, normalized relational schema
//! and Django models out.
//!
//! ```text
//! extract / path_de → Engine (resolve → assemble → order) → codegen
//! ```
pub mod assemble;
pub mod classify;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ir;
pub mod jq_exec;
pub mod order;
pub mod path_de;
pub mod resolve;
pub mod tag;

pub use assemble::Model;
pub use classify::{FieldRole, ModelField};
pub use codegen::Codegen;
pub use config::{Config, Conventions, Mode};
pub use engine::{normalize, Engine};
pub use error::{Error, Result, SchemaError};
pub use ir::{Field, Struct, StructSet};
pub use tag::{Namespace, Tag};
