use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Inconsistencies in the declared schema. Each one is terminal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{model}.{field} looks like a relationship id but {model} has no matching relation field")]
    OrphanRelationshipId { model: String, field: String },

    #[error("{model}.{field} declares a relation to {target}, which is not declared")]
    UnknownRelationTarget { model: String, field: String, target: String },

    #[error("join model {name} collides with an existing model")]
    DuplicateSynthesizedModel { name: String },

    #[error("{model}.{field} embeds {composite}, which is not declared")]
    UnknownEmbeddedType { model: String, field: String, composite: String },

    #[error("{model}.{field} is embedded without an embeddedPrefix")]
    MissingEmbeddedPrefix { model: String, field: String },

    #[error("{model}.{field} embeds {composite}, which itself embeds {nested}; flatten it first")]
    UnsupportedNestedEmbedding { model: String, field: String, composite: String, nested: String },

    #[error("{model}.{field} is a primary key of type {declared}; expected an integer of at most 64 bits")]
    InvalidKeyType { model: String, field: String, declared: String },

    #[error("{model}.{field} references {target}, which is not a model; tag it `embedded` or mark {target} as a model")]
    NonModelReference { model: String, field: String, target: String },

    #[error("struct {name} is declared more than once")]
    DuplicateStruct { name: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{} schema errors:\n{}", .0.len(), format_batch(.0))]
    Batch(Vec<SchemaError>),

    #[error("{model}.{field}: no django field for type {ty}")]
    UnhandledType { model: String, field: String, ty: String },

    #[error("at JSON path {path} → {message}")]
    Decode { path: String, message: String },

    #[error("jq: {0}")]
    Jq(String),

    #[error("{file}:{line}: {message}")]
    Extract { file: String, line: usize, message: String },

    #[error("glob: {0}")]
    Glob(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Stable identifier for reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OrphanRelationshipId { .. } => "OrphanRelationshipID",
            Self::UnknownRelationTarget { .. } => "UnknownRelationTarget",
            Self::DuplicateSynthesizedModel { .. } => "DuplicateSynthesizedModel",
            Self::UnknownEmbeddedType { .. } => "UnknownEmbeddedType",
            Self::MissingEmbeddedPrefix { .. } => "MissingEmbeddedPrefix",
            Self::UnsupportedNestedEmbedding { .. } => "UnsupportedNestedEmbedding",
            Self::InvalidKeyType { .. } => "InvalidKeyType",
            Self::NonModelReference { .. } => "NonModelReference",
            Self::DuplicateStruct { .. } => "DuplicateStruct",
        }
    }
}

impl Error {
    /// Schema errors carried by this error, if any.
    pub fn schema_errors(&self) -> &[SchemaError] {
        match self {
            Self::Schema(e) => std::slice::from_ref(e),
            Self::Batch(xs) => xs,
            _ => &[],
        }
    }
}

fn format_batch(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| format!("  [{}] {e}", e.code()))
        .collect::<Vec<_>>()
        .join("\n")
}
