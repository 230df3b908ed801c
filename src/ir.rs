// Raw declarations as handed over by an extractor. Nothing here knows about the
// target framework; see `classify` and `assemble` for that.
use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::tag::{Tag, TagKind};

pub const TABLE_NAME_KEY: &str = "tablename";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    #[serde(rename = "IsModel", default)]
    pub is_model: bool,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Metadata", default, deserialize_with = "null_as_default")]
    pub metadata: IndexMap<String, String>,
    #[serde(rename = "Fields", default, deserialize_with = "null_as_default")]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub declared_type: String,
    #[serde(rename = "Tags", default, deserialize_with = "null_as_default")]
    pub tags: IndexMap<String, Tag>,
}

/// Parsed `declaredType` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeToken {
    Named(String),
    Pointer(Box<TypeToken>),
    Slice(Box<TypeToken>),
    Map { key: Box<TypeToken>, value: Box<TypeToken> },
}

/// Immutable, name-keyed snapshot of every declaration in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructSet {
    structs: BTreeMap<String, Struct>,
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE TOKENS
// ————————————————————————————————————————————————————————————————————————————

impl TypeToken {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('*') {
            return Self::Pointer(Box::new(Self::parse(rest)));
        }
        if let Some(rest) = raw.strip_prefix("[]") {
            return Self::Slice(Box::new(Self::parse(rest)));
        }
        if let Some(rest) = raw.strip_prefix("map[") {
            if let Some(close) = matching_bracket(rest) {
                return Self::Map {
                    key: Box::new(Self::parse(&rest[..close])),
                    value: Box::new(Self::parse(&rest[close + 1..])),
                };
            }
        }
        Self::Named(raw.to_string())
    }

    /// Declared nullability: only a top-level pointer is nullable.
    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    pub fn is_map(&self) -> bool {
        match self {
            Self::Map { .. } => true,
            Self::Pointer(inner) => inner.is_map(),
            _ => false,
        }
    }

    pub fn is_slice(&self) -> bool {
        match self {
            Self::Slice(_) => true,
            Self::Pointer(inner) => inner.is_slice(),
            _ => false,
        }
    }

    /// Element name after stripping pointer and slice wrappers; `None` for maps.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            Self::Named(x) => Some(x.as_str()),
            Self::Pointer(inner) | Self::Slice(inner) => inner.base_name(),
            Self::Map { .. } => None,
        }
    }

    /// Same shape with every named leaf passed through `f`.
    pub fn map_names<F: Fn(&str) -> String>(&self, f: &F) -> Self {
        match self {
            Self::Named(x) => Self::Named(f(x)),
            Self::Pointer(inner) => Self::Pointer(Box::new(inner.map_names(f))),
            Self::Slice(inner) => Self::Slice(Box::new(inner.map_names(f))),
            Self::Map { key, value } => Self::Map {
                key: Box::new(key.map_names(f)),
                value: Box::new(value.map_names(f)),
            },
        }
    }

    /// The token with its top-level pointer removed.
    pub fn without_pointer(&self) -> &Self {
        match self {
            Self::Pointer(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(x) => write!(f, "{x}"),
            Self::Pointer(inner) => write!(f, "*{inner}"),
            Self::Slice(inner) => write!(f, "[]{inner}"),
            Self::Map { key, value } => write!(f, "map[{key}]{value}"),
        }
    }
}

// `rest` starts right after `map[`
fn matching_bracket(rest: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, b) in rest.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

impl Struct {
    pub fn new(name: impl Into<String>, is_model: bool) -> Self {
        Self { is_model, name: name.into(), metadata: IndexMap::new(), fields: Vec::new() }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.metadata.insert(TABLE_NAME_KEY.to_string(), table.into());
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.metadata.get(TABLE_NAME_KEY).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if some field other than `except` starts with `prefix`.
    pub fn has_field_prefixed(&self, prefix: &str, except: &str) -> bool {
        self.fields.iter().any(|f| f.name != except && f.name.starts_with(prefix))
    }

    pub(crate) fn remove_fields(&mut self, names: &[String]) {
        self.fields.retain(|f| !names.iter().any(|n| n == &f.name));
    }

    /// Remove-then-append, so re-adding a field never duplicates it.
    pub(crate) fn add_fields(&mut self, fields: &[Field]) {
        let names = fields.iter().map(|f| f.name.clone()).collect::<Vec<_>>();
        self.remove_fields(&names);
        self.fields.extend(fields.iter().cloned());
    }
}

impl Field {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self { name: name.into(), declared_type: declared_type.into(), tags: IndexMap::new() }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag.name.clone(), tag);
        self
    }

    pub fn ty(&self) -> TypeToken {
        TypeToken::parse(&self.declared_type)
    }

    pub fn find_tag(&self, kind: TagKind) -> Option<&Tag> {
        self.tags.values().find(|t| t.kind() == kind)
    }

    pub fn has_tag(&self, kind: TagKind) -> bool {
        self.find_tag(kind).is_some()
    }

    pub fn is_embedded(&self) -> bool {
        self.tags.values().any(Tag::is_embedded)
    }

    pub fn is_primary_key(&self, identifier: &str) -> bool {
        self.name == identifier && self.tags.values().any(Tag::is_primary_key)
    }

    /// Back-reference name from a non-empty foreign-key tag, minus the id suffix.
    pub fn foreign_key(&self, id_suffix: &str) -> Option<String> {
        let tag = self.tags.values().find(|t| t.is_foreign_key())?;
        let value = tag.value.trim();
        if value.is_empty() {
            return None;
        }
        let name = value.strip_suffix(id_suffix).filter(|x| !x.is_empty()).unwrap_or(value);
        Some(name.to_string())
    }

    /// Join table name from a non-empty many-to-many tag.
    pub fn many_to_many(&self) -> Option<&str> {
        self.tags
            .values()
            .find(|t| t.is_many_to_many())
            .map(|t| t.value.trim())
            .filter(|x| !x.is_empty())
    }

    pub fn constraints(&self) -> IndexMap<String, String> {
        self.tags.values().find_map(Tag::has_constraints).unwrap_or_default()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STRUCT SET
// ————————————————————————————————————————————————————————————————————————————

impl StructSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous declaration when `name` was already taken.
    pub fn insert(&mut self, s: Struct) -> Option<Struct> {
        self.structs.insert(s.name.clone(), s)
    }

    pub fn get(&self, name: &str) -> Option<&Struct> {
        self.structs.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Struct> {
        self.structs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Name order.
    pub fn iter(&self) -> impl Iterator<Item = &Struct> {
        self.structs.values()
    }

    pub fn models(&self) -> impl Iterator<Item = &Struct> {
        self.iter().filter(|s| s.is_model)
    }
}

impl FromIterator<Struct> for StructSet {
    fn from_iter<I: IntoIterator<Item = Struct>>(iter: I) -> Self {
        let mut set = Self::new();
        for s in iter {
            set.insert(s);
        }
        set
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tokens_parse_wrappers() {
        assert_eq!(TypeToken::parse("int64"), TypeToken::Named("int64".into()));
        let t = TypeToken::parse("[]*Category");
        assert!(t.is_slice());
        assert!(!t.is_pointer());
        assert_eq!(t.base_name(), Some("Category"));

        let t = TypeToken::parse("*map[string][]int");
        assert!(t.is_pointer());
        assert!(t.is_map());
        assert_eq!(t.base_name(), None);
        assert_eq!(t.to_string(), "*map[string][]int");
    }

    #[test]
    fn unbalanced_map_stays_named() {
        let t = TypeToken::parse("map[string");
        assert_eq!(t, TypeToken::Named("map[string".into()));
    }

    #[test]
    fn foreign_key_strips_id_suffix() {
        let f = Field::new("Events", "[]*Event").with_tag(Tag::gorm("foreignKey", "GenreID"));
        assert_eq!(f.foreign_key("ID").as_deref(), Some("Genre"));
        let f = Field::new("Owner", "*User").with_tag(Tag::gorm("foreignKey", "Creator"));
        assert_eq!(f.foreign_key("ID").as_deref(), Some("Creator"));
        let f = Field::new("Owner", "*User").with_tag(Tag::gorm("foreignKey", ""));
        assert!(f.foreign_key("ID").is_none());
    }

    #[test]
    fn add_fields_replaces_same_name() {
        let mut s = Struct::new("Event", true)
            .with_field(Field::new("ID", "int64"))
            .with_field(Field::new("Genre", "*Genre"));
        s.add_fields(&[Field::new("Genre", "*Category")]);
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.fields[1].declared_type, "*Category");
    }

    #[test]
    fn structs_decode_from_extractor_dump() {
        let src = r#"{
            "IsModel": true,
            "Name": "Genre",
            "Metadata": {"tablename": "genres"},
            "Fields": [
                {"Name": "ID", "Type": "int64", "Tags": {"primaryKey": {"Name": "primaryKey", "Value": ""}}},
                {"Name": "Name", "Type": "string", "Tags": null}
            ]
        }"#;
        let s: Struct = serde_json::from_str(src).unwrap();
        assert_eq!(s.table_name(), Some("genres"));
        assert!(s.fields[0].is_primary_key("ID"));
        assert!(s.fields[1].tags.is_empty());
    }
}
