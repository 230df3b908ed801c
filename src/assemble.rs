//! Model assembly: classify every field of every resolved model struct and
//! splice embedded composites in place.
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::classify::{classify, flatten_field, Classified, ModelField};
use crate::config::Conventions;
use crate::error::SchemaError;
use crate::ir::{Struct, StructSet, TABLE_NAME_KEY};
use crate::order;

/// Final, renderer-ready schema unit. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub name: String,
    pub metadata: IndexMap<String, String>,
    pub fields: Vec<ModelField>,
}

impl Model {
    pub fn table_name(&self) -> Option<&str> {
        self.metadata.get(TABLE_NAME_KEY).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Every model of the working set, ordered. Collects the first error of each
/// struct; the model list is only complete when the error list is empty.
pub fn assemble_all(structs: &StructSet, conventions: &Conventions) -> (Vec<Model>, Vec<SchemaError>) {
    let mut models = Vec::new();
    let mut errors = Vec::new();
    for s in structs.models() {
        match assemble(s, structs, conventions) {
            Ok(model) => models.push(model),
            Err(error) => errors.push(error),
        }
    }
    order::sort_models(&mut models);
    (models, errors)
}

pub fn assemble(s: &Struct, structs: &StructSet, conventions: &Conventions) -> Result<Model, SchemaError> {
    let mut fields = Vec::with_capacity(s.fields.len());
    for field in &s.fields {
        match classify(field, s, structs, conventions)? {
            Classified::Field(f) => fields.push(f),
            Classified::Embedded { composite, prefix } => {
                let Some(inner) = structs.get(&composite) else {
                    return Err(SchemaError::UnknownEmbeddedType {
                        model: s.name.clone(),
                        field: field.name.clone(),
                        composite,
                    });
                };
                let Some(prefix) = prefix else {
                    return Err(SchemaError::MissingEmbeddedPrefix {
                        model: s.name.clone(),
                        field: field.name.clone(),
                    });
                };
                // one level only
                if let Some(nested) = inner.fields.iter().find(|f| f.is_embedded()) {
                    return Err(SchemaError::UnsupportedNestedEmbedding {
                        model: s.name.clone(),
                        field: field.name.clone(),
                        composite,
                        nested: nested.name.clone(),
                    });
                }
                debug!(model = %s.name, field = %field.name, %composite, "flattening embedded composite");
                fields.extend(inner.fields.iter().map(|f| flatten_field(f, &prefix)));
            }
        }
    }
    order::sort_fields(&mut fields, conventions);
    Ok(Model { name: s.name.clone(), metadata: s.metadata.clone(), fields })
}
