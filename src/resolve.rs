//! Relationship resolution.
//!
//! Rules read an immutable [`StructSet`] and emit [`Update`]s; nothing is
//! mutated until every model struct has been evaluated. The updates are then
//! applied to a fresh copy of the set:
//!
//! 1. `AddStruct` (a name that already exists is `DuplicateSynthesizedModel`),
//! 2. every `DeleteField`,
//! 3. every `AddField`, as remove-then-append.
//!
//! Deletes before adds means an add always wins over a delete of the same
//! field on the same struct, regardless of discovery order.
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::classify::join_model_name;
use crate::config::{Config, Conventions};
use crate::error::SchemaError;
use crate::ir::{Field, Struct, StructSet, TABLE_NAME_KEY};
use crate::tag::{Tag, TagKind};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A pending edit to the struct set.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub target: String,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    AddField(Vec<Field>),
    DeleteField(Vec<String>),
    AddStruct { metadata: IndexMap<String, String>, fields: Vec<Field> },
}

/// Output of a resolver run. `errors` is empty on success.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub structs: StructSet,
    pub updates: Vec<Update>,
    pub errors: Vec<SchemaError>,
}

/// `Ok(None)`: the rule does not apply to this field.
type Rule = fn(&Field, &Struct, &StructSet, &Conventions) -> Result<Option<Vec<Update>>, SchemaError>;

/// Priority order; the first rule that claims a field wins.
const RULES: [(&str, Rule); 3] = [
    ("drop_shadow_id", drop_shadow_id),
    ("promote_foreign_key", promote_foreign_key),
    ("synthesize_join_model", synthesize_join_model),
];

// ————————————————————————————————————————————————————————————————————————————
// DRIVER
// ————————————————————————————————————————————————————————————————————————————

pub fn resolve(structs: &StructSet, config: &Config) -> Resolution {
    let mut errors = Vec::new();
    let mut updates = Vec::new();
    for (name, result) in collect_updates(structs, config) {
        match result {
            Ok(xs) => updates.extend(xs),
            Err(error) => {
                debug!(%name, %error, "rule evaluation failed");
                errors.push(error);
            }
        }
    }
    let (resolved, apply_errors) = apply_updates(structs, &updates);
    errors.extend(apply_errors);
    Resolution { structs: resolved, updates, errors }
}

/// Evaluate every model struct against the rules, in name order. With
/// `config.parallel` the structs are spread over the rayon pool; `collect`
/// keeps the order, so the result is identical either way.
pub fn collect_updates(
    structs: &StructSet,
    config: &Config,
) -> Vec<(String, Result<Vec<Update>, SchemaError>)> {
    let models = structs.models().collect::<Vec<_>>();
    let eval = |s: &&Struct| (s.name.clone(), evaluate_struct(s, structs, &config.conventions));
    if config.parallel {
        models.par_iter().map(eval).collect()
    } else {
        models.iter().map(eval).collect()
    }
}

/// Updates for one struct; stops at its first error.
pub fn evaluate_struct(
    s: &Struct,
    structs: &StructSet,
    conventions: &Conventions,
) -> Result<Vec<Update>, SchemaError> {
    let mut out = Vec::new();
    for field in &s.fields {
        for (rule_name, rule) in RULES {
            if let Some(updates) = rule(field, s, structs, conventions)? {
                debug!(model = %s.name, field = %field.name, rule = rule_name, count = updates.len(), "field claimed");
                out.extend(updates);
                break;
            }
        }
    }
    Ok(out)
}

/// Build the working set from `structs` plus `updates`. Structs touched by a
/// failed update are left as they were.
pub fn apply_updates(structs: &StructSet, updates: &[Update]) -> (StructSet, Vec<SchemaError>) {
    let mut out = structs.clone();
    let mut errors = Vec::new();

    for update in updates {
        if let UpdateKind::AddStruct { metadata, fields } = &update.kind {
            if out.contains(&update.target) {
                errors.push(SchemaError::DuplicateSynthesizedModel { name: update.target.clone() });
                continue;
            }
            debug!(name = %update.target, "adding synthesized struct");
            out.insert(Struct {
                is_model: true,
                name: update.target.clone(),
                metadata: metadata.clone(),
                fields: fields.clone(),
            });
        }
    }

    for update in updates {
        if let UpdateKind::DeleteField(names) = &update.kind {
            match out.get_mut(&update.target) {
                Some(s) => s.remove_fields(names),
                None => warn!(name = %update.target, "delete for an unknown struct"),
            }
        }
    }

    for update in updates {
        if let UpdateKind::AddField(fields) = &update.kind {
            match out.get_mut(&update.target) {
                Some(s) => s.add_fields(fields),
                None => warn!(name = %update.target, "add for an unknown struct"),
            }
        }
    }

    (out, errors)
}

// ————————————————————————————————————————————————————————————————————————————
// RULES
// ————————————————————————————————————————————————————————————————————————————

/// The relation field for `<Base>ID` is either declared on the struct itself
/// or promised by a foreign-key declaration elsewhere naming `<Base>`.
fn drop_shadow_id(
    field: &Field,
    s: &Struct,
    structs: &StructSet,
    conventions: &Conventions,
) -> Result<Option<Vec<Update>>, SchemaError> {
    if field.name == conventions.identifier {
        return Ok(None);
    }
    let Some(base) = field.name.strip_suffix(conventions.id_suffix.as_str()) else {
        return Ok(None);
    };
    if base.is_empty() {
        return Ok(None);
    }
    if !s.has_field_prefixed(base, &field.name) && !back_reference_declared(structs, &s.name, base, conventions) {
        return Err(SchemaError::OrphanRelationshipId {
            model: s.name.clone(),
            field: field.name.clone(),
        });
    }
    Ok(Some(vec![delete(&s.name, &field.name)]))
}

fn promote_foreign_key(
    field: &Field,
    s: &Struct,
    structs: &StructSet,
    conventions: &Conventions,
) -> Result<Option<Vec<Update>>, SchemaError> {
    let Some(relation) = field.foreign_key(&conventions.id_suffix) else {
        return Ok(None);
    };
    let ty = field.ty();
    let target = ty.base_name().unwrap_or(field.declared_type.as_str());
    if !structs.contains(target) {
        return Err(SchemaError::UnknownRelationTarget {
            model: s.name.clone(),
            field: field.name.clone(),
            target: target.to_string(),
        });
    }

    let mut back_reference = Field::new(relation, format!("*{}", s.name));
    back_reference.tags = field
        .tags
        .iter()
        .filter(|(_, t)| t.kind() != TagKind::ForeignKey)
        .map(|(k, t)| (k.clone(), t.clone()))
        .collect();

    Ok(Some(vec![
        Update { target: target.to_string(), kind: UpdateKind::AddField(vec![back_reference]) },
        delete(&s.name, &field.name),
    ]))
}

fn synthesize_join_model(
    field: &Field,
    s: &Struct,
    structs: &StructSet,
    conventions: &Conventions,
) -> Result<Option<Vec<Update>>, SchemaError> {
    let Some(table) = field.many_to_many() else {
        return Ok(None);
    };
    let ty = field.ty();
    let other = ty.base_name().unwrap_or(field.declared_type.as_str());
    if !structs.contains(other) {
        return Err(SchemaError::UnknownRelationTarget {
            model: s.name.clone(),
            field: field.name.clone(),
            target: other.to_string(),
        });
    }

    let (owner_ref, other_ref) = if other == s.name {
        (format!("From{}", s.name), format!("To{other}"))
    } else {
        (s.name.clone(), other.to_string())
    };

    let fields = vec![
        Field::new(conventions.identifier.clone(), "int64").with_tag(Tag::gorm("primaryKey", "")),
        Field::new(owner_ref, format!("*{}", s.name)).with_tag(Tag::gorm("constraint", "OnDelete:CASCADE")),
        Field::new(other_ref, format!("*{other}")).with_tag(Tag::gorm("constraint", "OnDelete:RESTRICT")),
    ];
    let mut metadata = IndexMap::new();
    metadata.insert(TABLE_NAME_KEY.to_string(), table.to_string());

    Ok(Some(vec![
        Update { target: join_model_name(table), kind: UpdateKind::AddStruct { metadata, fields } },
        delete(&s.name, &field.name),
    ]))
}

// Read-only look at the snapshot; the matching AddField comes from promote_foreign_key.
fn back_reference_declared(structs: &StructSet, target: &str, name: &str, conventions: &Conventions) -> bool {
    structs.models().flat_map(|other| other.fields.iter()).any(|f| {
        f.ty().base_name() == Some(target) && f.foreign_key(&conventions.id_suffix).as_deref() == Some(name)
    })
}

fn delete(target: &str, field: &str) -> Update {
    Update { target: target.to_string(), kind: UpdateKind::DeleteField(vec![field.to_string()]) }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    fn pk() -> Field {
        Field::new("ID", "int64").with_tag(Tag::gorm("primaryKey", ""))
    }

    fn genre() -> Struct {
        Struct::new("Genre", true).with_table("genres").with_field(pk()).with_field(Field::new("Name", "string"))
    }

    fn category() -> Struct {
        Struct::new("Category", true)
            .with_table("categories")
            .with_field(pk())
            .with_field(Field::new("Name", "string"))
    }

    fn event() -> Struct {
        Struct::new("Event", true)
            .with_table("events")
            .with_field(pk())
            .with_field(Field::new("GenreID", "int64"))
            .with_field(Field::new("Genre", "*Genre"))
            .with_field(
                Field::new("Categories", "[]*Category").with_tag(Tag::gorm("many2many", "event_categories")),
            )
    }

    fn names(s: &Struct) -> Vec<&str> {
        s.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn shadow_id_is_dropped_and_join_model_synthesized() {
        let structs: StructSet = [event(), genre(), category()].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert!(out.errors.is_empty(), "{:?}", out.errors);

        let event = out.structs.get("Event").unwrap();
        assert_eq!(names(event), vec!["ID", "Genre"]);

        let join = out.structs.get("EventCategories").unwrap();
        assert!(join.is_model);
        assert_eq!(join.table_name(), Some("event_categories"));
        assert_eq!(names(join), vec!["ID", "Event", "Category"]);
        assert_eq!(join.fields[1].constraints()["on_delete"], "CASCADE");
        assert_eq!(join.fields[2].constraints()["on_delete"], "RESTRICT");
    }

    #[test]
    fn orphan_shadow_id_is_an_error() {
        let venue_less = Struct::new("Event", true).with_field(pk()).with_field(Field::new("VenueID", "int64"));
        let structs: StructSet = [venue_less].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert_eq!(
            out.errors,
            vec![SchemaError::OrphanRelationshipId { model: "Event".into(), field: "VenueID".into() }]
        );
    }

    #[test]
    fn foreign_key_becomes_back_reference_on_target() {
        let genre = genre().with_field(
            Field::new("Events", "[]*Event")
                .with_tag(Tag::gorm("foreignKey", "FeaturedGenreID"))
                .with_tag(Tag::gorm("constraint", "OnDelete:CASCADE")),
        );
        let event = Struct::new("Event", true).with_field(pk());
        let structs: StructSet = [genre, event].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert!(out.errors.is_empty());

        assert_eq!(names(out.structs.get("Genre").unwrap()), vec!["ID", "Name"]);
        let event = out.structs.get("Event").unwrap();
        let back = event.field("FeaturedGenre").unwrap();
        assert_eq!(back.declared_type, "*Genre");
        assert!(!back.has_tag(TagKind::ForeignKey));
        assert!(back.has_tag(TagKind::Constraint));
    }

    #[test]
    fn shadow_id_backed_by_foreign_key_declaration_is_dropped() {
        let genre = genre().with_field(Field::new("Events", "[]*Event").with_tag(Tag::gorm("foreignKey", "GenreID")));
        let event = Struct::new("Event", true).with_field(pk()).with_field(Field::new("GenreID", "int64"));
        let structs: StructSet = [genre, event].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert!(out.errors.is_empty(), "{:?}", out.errors);

        let event = out.structs.get("Event").unwrap();
        assert_eq!(names(event), vec!["ID", "Genre"]);
        assert_eq!(event.field("Genre").unwrap().declared_type, "*Genre");
        assert_eq!(names(out.structs.get("Genre").unwrap()), vec!["ID", "Name"]);
    }

    #[test]
    fn foreign_key_naming_another_base_does_not_cover_shadow_id() {
        let genre = genre().with_field(Field::new("Events", "[]*Event").with_tag(Tag::gorm("foreignKey", "GenreID")));
        let event = Struct::new("Event", true).with_field(pk()).with_field(Field::new("VenueID", "int64"));
        let structs: StructSet = [genre, event].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert_eq!(
            out.errors,
            vec![SchemaError::OrphanRelationshipId { model: "Event".into(), field: "VenueID".into() }]
        );
    }

    #[test]
    fn foreign_key_to_unknown_struct_is_an_error() {
        let genre = genre().with_field(Field::new("Shows", "[]*Show").with_tag(Tag::gorm("foreignKey", "GenreID")));
        let structs: StructSet = [genre].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert_eq!(out.errors[0].code(), "UnknownRelationTarget");
    }

    #[test]
    fn synthesized_name_collision_is_an_error() {
        let clash = Struct::new("EventCategories", true).with_field(pk());
        let structs: StructSet = [event(), genre(), category(), clash].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert_eq!(
            out.errors,
            vec![SchemaError::DuplicateSynthesizedModel { name: "EventCategories".into() }]
        );
    }

    #[test]
    fn self_referencing_join_gets_distinct_columns() {
        let user = Struct::new("User", true)
            .with_field(pk())
            .with_field(Field::new("Friends", "[]*User").with_tag(Tag::gorm("many2many", "user_friends")));
        let structs: StructSet = [user].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert_eq!(names(out.structs.get("UserFriends").unwrap()), vec!["ID", "FromUser", "ToUser"]);
    }

    #[test]
    fn add_wins_over_delete_on_same_struct() {
        let structs: StructSet = [genre()].into_iter().collect();
        let updates = vec![
            Update { target: "Genre".into(), kind: UpdateKind::AddField(vec![Field::new("Name", "*string")]) },
            delete("Genre", "Name"),
            delete("Genre", "Name"),
        ];
        let (out, errors) = apply_updates(&structs, &updates);
        assert!(errors.is_empty());
        let genre = out.get("Genre").unwrap();
        assert_eq!(names(genre), vec!["ID", "Name"]);
        assert_eq!(genre.field("Name").unwrap().declared_type, "*string");
    }

    #[test]
    fn resolver_is_idempotent_on_its_output() {
        let genre = genre().with_field(Field::new("Events", "[]*Event").with_tag(Tag::gorm("foreignKey", "GenreID")));
        let structs: StructSet = [event(), genre, category()].into_iter().collect();
        let once = resolve(&structs, &Config::default());
        assert!(once.errors.is_empty(), "{:?}", once.errors);
        let twice = resolve(&once.structs, &Config::default());
        assert!(twice.errors.is_empty());
        assert!(twice.updates.is_empty());
        assert_eq!(twice.structs, once.structs);
    }

    #[test]
    fn parallel_evaluation_matches_sequential() {
        let structs: StructSet = [event(), genre(), category()].into_iter().collect();
        let seq = resolve(&structs, &Config::default());
        let par = resolve(&structs, &Config::default().with_parallel(true));
        assert_eq!(seq.updates, par.updates);
        assert_eq!(seq.structs, par.structs);
    }

    #[test]
    fn non_model_structs_are_not_evaluated() {
        let money = Struct::new("Money", false).with_field(Field::new("CurrencyID", "int64"));
        let structs: StructSet = [money].into_iter().collect();
        let out = resolve(&structs, &Config::default());
        assert!(out.errors.is_empty());
        assert!(out.updates.is_empty());
    }
}
