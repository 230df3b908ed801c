//! Namespaced field annotations.
//!
//! A field can carry tags from two dialects at once: the source ORM dialect
//! (`gorm:"primaryKey;size:64"`) and the target hint dialect
//! (`django:"display_list"`). Raw tag names are mapped onto [`TagKind`] once,
//! here, so nothing downstream compares tag-name strings.
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Which annotation dialect produced a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    /// Source ORM tags.
    #[default]
    Gorm,
    /// Target-framework display hints.
    Django,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    #[serde(rename = "Source", default)]
    pub namespace: Namespace,
}

/// Closed set of tag names the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    PrimaryKey,
    AutoIncrement,
    NotNull,
    Unique,
    Index,
    Size,
    Embedded,
    EmbeddedPrefix,
    ForeignKey,
    ManyToMany,
    AutoCreateTime,
    AutoUpdateTime,
    Constraint,
    DisplayList,
    ReadonlyField,
    Other(String),
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Namespace {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gorm => "gorm",
            Self::Django => "django",
            Self::Other(x) => x.as_str(),
        }
    }
}

impl From<&str> for Namespace {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "gorm" => Self::Gorm,
            "django" => Self::Django,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for Namespace {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Namespace::from).unwrap_or_default())
    }
}

impl TagKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "primarykey" | "primary_key" => Self::PrimaryKey,
            "autoincrement" => Self::AutoIncrement,
            "not null" => Self::NotNull,
            "unique" => Self::Unique,
            "index" => Self::Index,
            "size" => Self::Size,
            "embedded" => Self::Embedded,
            "embeddedprefix" => Self::EmbeddedPrefix,
            "foreignkey" => Self::ForeignKey,
            "many2many" => Self::ManyToMany,
            "autocreatetime" => Self::AutoCreateTime,
            "autoupdatetime" => Self::AutoUpdateTime,
            "constraint" | "constraints" => Self::Constraint,
            "display_list" => Self::DisplayList,
            "readonly_field" => Self::ReadonlyField,
            _ => Self::Other(raw.to_string()),
        }
    }
}

impl Tag {
    pub fn new(namespace: Namespace, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), namespace }
    }
    pub fn gorm(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Namespace::Gorm, name, value)
    }
    pub fn django(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Namespace::Django, name, value)
    }

    /// Hint-dialect tags never alias source-dialect kinds.
    pub fn kind(&self) -> TagKind {
        let kind = TagKind::parse(&self.name);
        match (&self.namespace, kind) {
            (Namespace::Gorm, kind) => kind,
            (Namespace::Django, kind @ (TagKind::DisplayList | TagKind::ReadonlyField)) => kind,
            _ => TagKind::Other(self.name.clone()),
        }
    }

    pub fn is_primary_key(&self) -> bool { self.kind() == TagKind::PrimaryKey }
    pub fn is_foreign_key(&self) -> bool { self.kind() == TagKind::ForeignKey }
    pub fn is_many_to_many(&self) -> bool { self.kind() == TagKind::ManyToMany }
    pub fn is_embedded(&self) -> bool { self.kind() == TagKind::Embedded }
    pub fn is_auto_create_time(&self) -> bool { self.kind() == TagKind::AutoCreateTime }
    pub fn is_auto_update_time(&self) -> bool { self.kind() == TagKind::AutoUpdateTime }

    /// `Some(options)` when this is a constraint tag. Entries without a colon
    /// are skipped rather than rejected.
    pub fn has_constraints(&self) -> Option<IndexMap<String, String>> {
        if self.kind() != TagKind::Constraint {
            return None;
        }
        Some(parse_constraints(&self.value))
    }
}

/// `OnUpdate:CASCADE,OnDelete:SET NULL` → `{on_update: CASCADE, on_delete: SET NULL}`
pub fn parse_constraints(raw: &str) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for record in raw.split(',') {
        let Some((key, value)) = record.split_once(':') else { continue };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_case(Case::Snake), value.trim().to_string());
    }
    out
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_map_case_insensitively() {
        assert_eq!(TagKind::parse("primaryKey"), TagKind::PrimaryKey);
        assert_eq!(TagKind::parse("PRIMARYKEY"), TagKind::PrimaryKey);
        assert_eq!(TagKind::parse("many2many"), TagKind::ManyToMany);
        assert_eq!(TagKind::parse("constraints"), TagKind::Constraint);
        assert_eq!(TagKind::parse("serializer"), TagKind::Other("serializer".into()));
    }

    #[test]
    fn constraints_skip_entries_without_colon() {
        let tag = Tag::gorm("constraint", "OnUpdate:CASCADE, garbage ,OnDelete: SET NULL");
        let c = tag.has_constraints().unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c["on_update"], "CASCADE");
        assert_eq!(c["on_delete"], "SET NULL");
    }

    #[test]
    fn non_constraint_tag_has_no_constraints() {
        assert!(Tag::gorm("index", "a:b").has_constraints().is_none());
    }

    #[test]
    fn namespace_defaults_to_source_dialect() {
        let tag: Tag = serde_json::from_str(r#"{"Name": "primaryKey", "Value": ""}"#).unwrap();
        assert_eq!(tag.namespace, Namespace::Gorm);
        let tag: Tag = serde_json::from_str(r#"{"Name": "display_list", "Source": "django"}"#).unwrap();
        assert_eq!(tag.namespace, Namespace::Django);
        assert!(tag.value.is_empty());
    }

    #[test]
    fn hint_tags_do_not_act_as_source_tags() {
        assert_eq!(Tag::django("unique", "").kind(), TagKind::Other("unique".into()));
        assert_eq!(Tag::django("display_list", "").kind(), TagKind::DisplayList);
        assert_eq!(Tag::gorm("unique", "").kind(), TagKind::Unique);
    }
}
