//! Go source extractor.
//!
//! A line scanner, not a Go parser: it understands gofmt-shaped struct
//! declarations and nothing else.
//!
//! ```go
//! // Event is a happening.
//! // g2d tablename:events
//! type Event struct {
//!     ID       int64   `gorm:"primaryKey"`
//!     Genre    *Genre  `gorm:"constraint:OnDelete:CASCADE" django:"display_list"`
//! }
//! ```
//!
//! Every struct is extracted; the `g2d` marker in the doc comment is what
//! makes it a model. Local `type X <builtin>` declarations are resolved in
//! field types once the whole file has been read.
use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ir::{Field, Struct, TypeToken};
use crate::tag::{Namespace, Tag};

pub const MODEL_MARKER: &str = "g2d";

static STRUCT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:type\s+)?(\w+)\s+struct\s*\{\s*(\})?$").unwrap());
static TYPE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^type\s*\($").unwrap());
static ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:type\s+)?(\w+)\s*=?\s*([a-z][\w.]*)$").unwrap());
static TAG_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+):"([^"]*)""#).unwrap());
static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*$").unwrap());

const BUILTINS: &[&str] = &[
    "bool", "string", "byte", "rune", "int", "int8", "int16", "int32", "int64", "uint", "uint8",
    "uint16", "uint32", "uint64", "float32", "float64", "time.Time", "time.Duration",
];

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

pub fn extract_file(path: &Path) -> Result<Vec<Struct>> {
    let src = std::fs::read_to_string(path)?;
    extract_source(&path.display().to_string(), &src)
}

/// Structs declared in `src`, in declaration order. `file` is only used in
/// error messages.
pub fn extract_source(file: &str, src: &str) -> Result<Vec<Struct>> {
    let mut scanner = Scanner { file, ..Scanner::default() };
    for (index, line) in src.lines().enumerate() {
        scanner.line(index + 1, line.trim())?;
    }
    scanner.finish()
}

// ————————————————————————————————————————————————————————————————————————————
// SCANNER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Default)]
struct Scanner<'a> {
    file: &'a str,
    /// Contiguous `//` lines right above the current line.
    doc: Vec<String>,
    in_type_group: bool,
    current: Option<(usize, Struct)>,
    structs: Vec<Struct>,
    aliases: HashMap<String, String>,
}

impl Scanner<'_> {
    fn line(&mut self, number: usize, line: &str) -> Result<()> {
        if self.current.is_some() {
            return self.struct_body(number, line);
        }

        if let Some(comment) = line.strip_prefix("//") {
            self.doc.push(comment.trim().to_string());
            return Ok(());
        }
        let doc = std::mem::take(&mut self.doc);

        if TYPE_GROUP.is_match(line) {
            self.in_type_group = true;
            return Ok(());
        }
        if self.in_type_group && line == ")" {
            self.in_type_group = false;
            return Ok(());
        }
        let declares = self.in_type_group || line.starts_with("type ");
        if !declares {
            return Ok(());
        }

        if let Some(caps) = STRUCT_HEADER.captures(line) {
            let mut s = Struct::new(&caps[1], false);
            apply_doc(&mut s, &doc);
            if caps.get(2).is_some() {
                self.structs.push(s);
            } else {
                self.current = Some((number, s));
            }
            return Ok(());
        }
        if let Some(caps) = ALIAS.captures(line) {
            if BUILTINS.contains(&&caps[2]) {
                debug!(alias = &caps[1], builtin = &caps[2], "type alias");
                self.aliases.insert(caps[1].to_string(), caps[2].to_string());
            }
        }
        Ok(())
    }

    fn struct_body(&mut self, number: usize, line: &str) -> Result<()> {
        if line.starts_with('}') {
            if let Some((_, s)) = self.current.take() {
                self.structs.push(s);
            }
            return Ok(());
        }
        if line.is_empty() || line.starts_with("//") {
            return Ok(());
        }
        let fields = self.field_line(number, line)?;
        if let Some((_, s)) = self.current.as_mut() {
            s.fields.extend(fields);
        }
        Ok(())
    }

    fn field_line(&self, number: usize, line: &str) -> Result<Vec<Field>> {
        let (decl, tags) = split_tag(line);
        let decl = decl.split("//").next().unwrap_or_default().trim();
        if decl.ends_with('{') {
            return Err(self.error(number, "inline struct types are not supported"));
        }
        let Some((names, ty)) = decl.rsplit_once(char::is_whitespace) else {
            warn!(file = self.file, line = number, field = decl, "skipping anonymous field");
            return Ok(Vec::new());
        };

        let tags = parse_tags(tags.unwrap_or_default());
        let mut out = Vec::new();
        for name in names.split(',').map(str::trim) {
            if !IDENT.is_match(name) {
                return Err(self.error(number, &format!("cannot read field declaration `{decl}`")));
            }
            let mut field = Field::new(name, ty.trim());
            field.tags = tags.clone();
            out.push(field);
        }
        Ok(out)
    }

    fn finish(mut self) -> Result<Vec<Struct>> {
        if let Some((start, s)) = self.current.take() {
            return Err(self.error(start, &format!("struct {} is never closed", s.name)));
        }
        let aliases = &self.aliases;
        let resolve = |name: &str| aliases.get(name).cloned().unwrap_or_else(|| name.to_string());
        for field in self.structs.iter_mut().flat_map(|s| s.fields.iter_mut()) {
            field.declared_type = TypeToken::parse(&field.declared_type).map_names(&resolve).to_string();
        }
        Ok(self.structs)
    }

    fn error(&self, line: usize, message: &str) -> Error {
        Error::Extract { file: self.file.to_string(), line, message: message.to_string() }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// The marker line makes the struct a model; its `key:value` words are metadata.
fn apply_doc(s: &mut Struct, doc: &[String]) {
    let Some(marker) = doc.iter().find(|l| l.split_whitespace().next() == Some(MODEL_MARKER)) else {
        return;
    };
    s.is_model = true;
    for word in marker.split_whitespace().skip(1) {
        if let Some((key, value)) = word.split_once(':') {
            s.metadata.insert(key.to_string(), value.to_string());
        }
    }
}

fn split_tag(line: &str) -> (&str, Option<&str>) {
    let Some(open) = line.find('`') else {
        return (line, None);
    };
    let rest = &line[open + 1..];
    match rest.find('`') {
        Some(close) => (&line[..open], Some(&rest[..close])),
        None => (&line[..open], Some(rest)),
    }
}

/// `gorm:"primaryKey;size:64" django:"display_list"` → tags keyed by name;
/// hint tags are keyed `django:<name>` so they never shadow source tags.
fn parse_tags(raw: &str) -> indexmap::IndexMap<String, Tag> {
    let mut out = indexmap::IndexMap::new();
    for caps in TAG_PAIR.captures_iter(raw) {
        let namespace = match &caps[1] {
            "gorm" => Namespace::Gorm,
            "django" => Namespace::Django,
            _ => continue,
        };
        for entry in caps[2].split(';').map(str::trim).filter(|x| !x.is_empty()) {
            let (name, value) = entry.split_once(':').unwrap_or((entry, ""));
            let key = match namespace {
                Namespace::Gorm => name.to_string(),
                _ => format!("{}:{name}", namespace.as_str()),
            };
            out.insert(key, Tag::new(namespace.clone(), name, value));
        }
    }
    out
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
