//! Field classification: what role a raw field plays in the final schema.
//!
//! Classification is a pure function of the field, its owner and the struct
//! set. It knows nothing about target-framework syntax; target-dialect tags are
//! passed through as `hints` for the renderer to interpret.
use convert_case::{Boundary, Case, Casing};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::Conventions;
use crate::error::SchemaError;
use crate::ir::{Field, Struct, StructSet, TypeToken};
use crate::tag::{Namespace, TagKind};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRole {
    PrimaryKey { width: KeyWidth },
    /// Required reference to another struct.
    Relationship { target: String },
    ManyToMany { target: String, through: String },
    /// Opaque structured payload (maps).
    StructuredScalar,
    Scalar,
}

/// Integer width class of an auto-incrementing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyWidth {
    /// 32 bits or fewer.
    Standard,
    Big,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldOptions {
    pub max_length: Option<u32>,
    pub indexed: bool,
    pub unique: bool,
    pub auto_create: bool,
    pub auto_update: bool,
}

/// A renderer-ready field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelField {
    /// Snake-cased column name.
    pub name: String,
    pub source_name: String,
    /// Declared type without its top-level pointer, or the referenced struct.
    pub ty: String,
    pub nullable: bool,
    pub role: FieldRole,
    pub constraints: IndexMap<String, String>,
    pub options: FieldOptions,
    /// Target-dialect tags, name → value.
    pub hints: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Field(ModelField),
    /// Left for the assembler to splice in.
    Embedded { composite: String, prefix: Option<String> },
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSIFIER
// ————————————————————————————————————————————————————————————————————————————

pub fn classify(
    field: &Field,
    owner: &Struct,
    structs: &StructSet,
    conventions: &Conventions,
) -> Result<Classified, SchemaError> {
    let ty = field.ty();

    if field.is_embedded() {
        let composite = ty.base_name().map(str::to_string).unwrap_or_else(|| ty.to_string());
        let prefix = field.find_tag(TagKind::EmbeddedPrefix).map(|t| t.value.clone());
        return Ok(Classified::Embedded { composite, prefix });
    }

    let mut out = base_field(field, &ty);

    if field.is_primary_key(&conventions.identifier) {
        // a nullable key is not a key
        let base = ty.to_string();
        let width = key_width(&base).ok_or_else(|| SchemaError::InvalidKeyType {
            model: owner.name.clone(),
            field: field.name.clone(),
            declared: field.declared_type.clone(),
        })?;
        out.role = FieldRole::PrimaryKey { width };
        out.ty = base;
        out.nullable = false;
        return Ok(Classified::Field(out));
    }

    let referenced = ty.base_name().and_then(|name| structs.get(name));
    if let Some(target) = referenced.filter(|s| !s.is_model) {
        return Err(SchemaError::NonModelReference {
            model: owner.name.clone(),
            field: field.name.clone(),
            target: target.name.clone(),
        });
    }
    let referenced = referenced.map(|s| s.name.as_str());

    if let (Some(target), Some(join)) = (referenced, field.many_to_many()) {
        if ty.is_slice() {
            out.role = FieldRole::ManyToMany {
                target: target.to_string(),
                through: join_model_name(join),
            };
            out.ty = target.to_string();
            out.nullable = false;
            return Ok(Classified::Field(out));
        }
    }

    if let Some(target) = referenced {
        out.role = FieldRole::Relationship { target: target.to_string() };
        out.ty = target.to_string();
        out.nullable = false;
        return Ok(Classified::Field(out));
    }

    if ty.is_map() {
        out.role = FieldRole::StructuredScalar;
    }
    Ok(Classified::Field(out))
}

/// One flattened column of an embedded composite. Inner tags are dropped.
pub fn flatten_field(inner: &Field, prefix: &str) -> ModelField {
    let ty = inner.ty();
    ModelField {
        name: format!("{prefix}{}", snake(&inner.name)),
        source_name: inner.name.clone(),
        ty: ty.without_pointer().to_string(),
        nullable: ty.is_pointer(),
        role: if ty.is_map() { FieldRole::StructuredScalar } else { FieldRole::Scalar },
        constraints: IndexMap::new(),
        options: FieldOptions::default(),
        hints: IndexMap::new(),
    }
}

/// `event_categories` → `EventCategories`
pub fn join_model_name(table: &str) -> String {
    table.to_case(Case::Pascal)
}

/// Digits stay attached to their word: `ISO3` → `iso3`, as gorm names the column.
pub fn snake(name: &str) -> String {
    name.remove_boundaries(&Boundary::digits()).to_case(Case::Snake)
}

fn key_width(base: &str) -> Option<KeyWidth> {
    match base {
        "int" | "int8" | "int16" | "int32" | "uint" | "uint8" | "uint16" | "uint32" => {
            Some(KeyWidth::Standard)
        }
        "int64" | "uint64" => Some(KeyWidth::Big),
        _ => None,
    }
}

// scalar defaults; the classifier overrides role/type/nullability from here
fn base_field(field: &Field, ty: &TypeToken) -> ModelField {
    ModelField {
        name: snake(&field.name),
        source_name: field.name.clone(),
        ty: ty.without_pointer().to_string(),
        nullable: ty.is_pointer(),
        role: FieldRole::Scalar,
        constraints: field.constraints(),
        options: field_options(field),
        hints: field
            .tags
            .values()
            .filter(|t| t.namespace == Namespace::Django)
            .map(|t| (t.name.clone(), t.value.clone()))
            .collect(),
    }
}

fn field_options(field: &Field) -> FieldOptions {
    let mut options = FieldOptions::default();
    for tag in field.tags.values() {
        match tag.kind() {
            TagKind::Size => match tag.value.trim().parse::<u32>() {
                Ok(n) => options.max_length = Some(n),
                Err(_) => tracing::warn!(field = %field.name, size = %tag.value, "ignoring non-numeric size"),
            },
            TagKind::Index => options.indexed = true,
            TagKind::Unique => options.unique = true,
            TagKind::AutoCreateTime => options.auto_create = true,
            TagKind::AutoUpdateTime => options.auto_update = true,
            _ => {}
        }
    }
    options
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;

    fn set() -> StructSet {
        [
            Struct::new("Event", true).with_table("events"),
            Struct::new("Genre", true).with_table("genres"),
            Struct::new("Category", true).with_table("categories"),
            Struct::new("Money", false),
        ]
        .into_iter()
        .collect()
    }

    fn field_of(c: Classified) -> ModelField {
        match c {
            Classified::Field(f) => f,
            other => panic!("expected a field, got {other:?}"),
        }
    }

    fn run(field: &Field) -> Result<Classified, SchemaError> {
        let structs = set();
        let owner = structs.get("Event").unwrap().clone();
        classify(field, &owner, &structs, &Conventions::default())
    }

    #[test]
    fn key_widths_follow_declared_integer_size() {
        let pk = Tag::gorm("primaryKey", "");
        let f = field_of(run(&Field::new("ID", "int64").with_tag(pk.clone())).unwrap());
        assert_eq!(f.role, FieldRole::PrimaryKey { width: KeyWidth::Big });
        assert_eq!(f.name, "id");
        let f = field_of(run(&Field::new("ID", "uint32").with_tag(pk.clone())).unwrap());
        assert_eq!(f.role, FieldRole::PrimaryKey { width: KeyWidth::Standard });
        let f = field_of(run(&Field::new("ID", "int16").with_tag(pk)).unwrap());
        assert_eq!(f.role, FieldRole::PrimaryKey { width: KeyWidth::Standard });
    }

    #[test]
    fn string_primary_key_is_rejected() {
        let err = run(&Field::new("ID", "string").with_tag(Tag::gorm("primaryKey", ""))).unwrap_err();
        assert_eq!(err.code(), "InvalidKeyType");
    }

    #[test]
    fn pointer_primary_key_is_rejected() {
        let err = run(&Field::new("ID", "*int64").with_tag(Tag::gorm("primaryKey", ""))).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidKeyType { model: "Event".into(), field: "ID".into(), declared: "*int64".into() }
        );
    }

    #[test]
    fn id_without_primary_key_tag_is_scalar() {
        let f = field_of(run(&Field::new("ID", "string")).unwrap());
        assert_eq!(f.role, FieldRole::Scalar);
    }

    #[test]
    fn struct_reference_is_required_relationship() {
        let f = field_of(run(&Field::new("Genre", "*Genre")).unwrap());
        assert_eq!(f.role, FieldRole::Relationship { target: "Genre".into() });
        assert_eq!(f.ty, "Genre");
        assert!(!f.nullable);
    }

    #[test]
    fn unembedded_composite_reference_is_an_error() {
        let err = run(&Field::new("Price", "Money")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::NonModelReference { model: "Event".into(), field: "Price".into(), target: "Money".into() }
        );
    }

    #[test]
    fn many_to_many_names_join_model() {
        let field = Field::new("Categories", "[]*Category")
            .with_tag(Tag::gorm("many2many", "event_categories"));
        let f = field_of(run(&field).unwrap());
        assert_eq!(
            f.role,
            FieldRole::ManyToMany { target: "Category".into(), through: "EventCategories".into() }
        );
    }

    #[test]
    fn maps_and_scalars_follow_pointer_nullability() {
        let f = field_of(run(&Field::new("Extra", "*map[string]string")).unwrap());
        assert_eq!(f.role, FieldRole::StructuredScalar);
        assert!(f.nullable);
        let f = field_of(run(&Field::new("EndDate", "*time.Time")).unwrap());
        assert_eq!(f.role, FieldRole::Scalar);
        assert_eq!(f.ty, "time.Time");
        assert!(f.nullable);
        let f = field_of(run(&Field::new("Link", "string")).unwrap());
        assert!(!f.nullable);
    }

    #[test]
    fn target_tags_pass_through_as_hints() {
        let field = Field::new("Name", "string")
            .with_tag(Tag::gorm("size", "128"))
            .with_tag(Tag::gorm("index", ""))
            .with_tag(Tag::django("display_list", ""));
        let f = field_of(run(&field).unwrap());
        assert_eq!(f.hints.keys().collect::<Vec<_>>(), vec!["display_list"]);
        assert_eq!(f.options.max_length, Some(128));
        assert!(f.options.indexed);
    }

    #[test]
    fn column_names_follow_gorm_snake_case() {
        assert_eq!(snake("ISO3"), "iso3");
        assert_eq!(snake("ISO2"), "iso2");
        assert_eq!(snake("EventAPI"), "event_api");
        assert_eq!(snake("WikiDataID"), "wiki_data_id");
        assert_eq!(snake("MinTicketPrice"), "min_ticket_price");
    }

    #[test]
    fn embedded_field_is_deferred() {
        let field = Field::new("MinTicketPrice", "*Money")
            .with_tag(Tag::gorm("embedded", ""))
            .with_tag(Tag::gorm("embeddedPrefix", "min_ticket_price_"));
        assert_eq!(
            run(&field).unwrap(),
            Classified::Embedded {
                composite: "Money".into(),
                prefix: Some("min_ticket_price_".into())
            }
        );
    }
}
