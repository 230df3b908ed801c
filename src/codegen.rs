//! Django emitter: `models.py` and `admin.py` text from assembled models.
//!
//! All schema decisions were made upstream; this only maps roles and scalar
//! types onto Django field classes and spells out their arguments.
use tracing::debug;

use crate::assemble::Model;
use crate::classify::{FieldRole, KeyWidth, ModelField};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{TypeToken, TABLE_NAME_KEY};

const INDENT: &str = "    ";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DjangoField {
    AutoField,
    BigAutoField,
    ForeignKey,
    ManyToManyField,
    JsonField,
    BinaryField,
    SmallIntegerField,
    IntegerField,
    BigIntegerField,
    PositiveSmallIntegerField,
    PositiveIntegerField,
    PositiveBigIntegerField,
    FloatField,
    CharField,
    TextField,
    BooleanField,
    DateTimeField,
    DurationField,
}

pub struct Codegen<'a> {
    config: &'a Config,
    out: String,
}

// ————————————————————————————————————————————————————————————————————————————
// FIELD MAPPING
// ————————————————————————————————————————————————————————————————————————————

impl DjangoField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoField => "AutoField",
            Self::BigAutoField => "BigAutoField",
            Self::ForeignKey => "ForeignKey",
            Self::ManyToManyField => "ManyToManyField",
            Self::JsonField => "JSONField",
            Self::BinaryField => "BinaryField",
            Self::SmallIntegerField => "SmallIntegerField",
            Self::IntegerField => "IntegerField",
            Self::BigIntegerField => "BigIntegerField",
            Self::PositiveSmallIntegerField => "PositiveSmallIntegerField",
            Self::PositiveIntegerField => "PositiveIntegerField",
            Self::PositiveBigIntegerField => "PositiveBigIntegerField",
            Self::FloatField => "FloatField",
            Self::CharField => "CharField",
            Self::TextField => "TextField",
            Self::BooleanField => "BooleanField",
            Self::DateTimeField => "DateTimeField",
            Self::DurationField => "DurationField",
        }
    }

    pub fn for_field(field: &ModelField, config: &Config) -> Option<Self> {
        match &field.role {
            FieldRole::PrimaryKey { width: KeyWidth::Standard } => Some(Self::AutoField),
            FieldRole::PrimaryKey { width: KeyWidth::Big } => Some(Self::BigAutoField),
            FieldRole::Relationship { .. } => Some(Self::ForeignKey),
            FieldRole::ManyToMany { .. } => Some(Self::ManyToManyField),
            FieldRole::StructuredScalar => Some(Self::JsonField),
            FieldRole::Scalar => Self::for_scalar(&TypeToken::parse(&field.ty), field, config),
        }
    }

    fn for_scalar(ty: &TypeToken, field: &ModelField, config: &Config) -> Option<Self> {
        let name = match ty.without_pointer() {
            TypeToken::Named(name) => config.resolve_alias(name),
            TypeToken::Slice(inner) => {
                let byte_slice = matches!(inner.as_ref(), TypeToken::Named(x) if matches!(config.resolve_alias(x), "byte" | "uint8"));
                return Some(if byte_slice { Self::BinaryField } else { Self::JsonField });
            }
            TypeToken::Map { .. } => return Some(Self::JsonField),
            TypeToken::Pointer(_) => return None,
        };
        let out = match name {
            "int8" | "int16" => Self::SmallIntegerField,
            "int" | "int32" => Self::IntegerField,
            "int64" => Self::BigIntegerField,
            "uint8" | "uint16" | "byte" => Self::PositiveSmallIntegerField,
            "uint" | "uint32" => Self::PositiveIntegerField,
            "uint64" => Self::PositiveBigIntegerField,
            "float32" | "float64" => Self::FloatField,
            "string" if field.options.max_length.is_some() => Self::CharField,
            "string" => Self::TextField,
            "bool" => Self::BooleanField,
            "time.Time" => Self::DateTimeField,
            "time.Duration" => Self::DurationField,
            _ => return None,
        };
        Some(out)
    }
}

/// `models.<Class>(...)` arguments, in a fixed order.
pub fn django_args(field: &ModelField) -> String {
    let mut args = Vec::<String>::new();
    let is_key = matches!(field.role, FieldRole::PrimaryKey { .. });
    let is_relation = matches!(field.role, FieldRole::Relationship { .. });

    match &field.role {
        FieldRole::Relationship { target } => {
            args.push(format!("'{target}'"));
            args.push(format!("on_delete=models.{}", on_delete(field)));
        }
        FieldRole::ManyToMany { target, through } => {
            args.push(format!("'{target}'"));
            args.push(format!("through='{through}'"));
        }
        FieldRole::PrimaryKey { .. } => args.push("primary_key=True".to_string()),
        _ => {}
    }
    if field.nullable {
        args.push("null=True".to_string());
    }
    if let Some(n) = field.options.max_length {
        args.push(format!("max_length={n}"));
    }
    if field.options.indexed {
        args.push("db_index=True".to_string());
    }
    if field.options.unique {
        args.push("unique=True".to_string());
    }
    if field.options.auto_create {
        args.push("auto_now_add=True".to_string());
    }
    if field.options.auto_update {
        args.push("auto_now=True".to_string());
    }
    if !is_key && !is_relation {
        args.push("blank=True".to_string());
    }
    args.join(", ")
}

/// `on_delete` constraint as a Django handler name; `DO_NOTHING` when absent.
pub fn on_delete(field: &ModelField) -> String {
    let Some(raw) = field.constraints.get("on_delete") else {
        return "DO_NOTHING".to_string();
    };
    match raw.trim().to_ascii_uppercase().as_str() {
        "NO ACTION" | "NO_ACTION" | "" => "DO_NOTHING".to_string(),
        other => other.replace(' ', "_"),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// EMITTER
// ————————————————————————————————————————————————————————————————————————————

impl<'a> Codegen<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, out: String::new() }
    }

    pub fn emit_models(&mut self, models: &[Model]) -> Result<()> {
        self.out.push_str("from django.db import models\n");
        for model in models {
            self.emit_model(model)?;
        }
        Ok(())
    }

    fn emit_model(&mut self, model: &Model) -> Result<()> {
        let mut body = String::new();
        for field in &model.fields {
            let class = DjangoField::for_field(field, self.config).ok_or_else(|| Error::UnhandledType {
                model: model.name.clone(),
                field: field.source_name.clone(),
                ty: field.ty.clone(),
            })?;
            body.push_str(&format!("{INDENT}{} = models.{}({})\n", field.name, class.as_str(), django_args(field)));
        }

        self.out.push_str(&format!("\n\nclass {}(models.Model):\n", model.name));
        self.out.push_str(&body);
        if !body.is_empty() {
            self.out.push('\n');
        }
        self.out.push_str(&format!("{INDENT}class Meta:\n"));
        self.out.push_str(&format!("{INDENT}{INDENT}managed = False\n"));
        for (key, value) in &model.metadata {
            if key == TABLE_NAME_KEY {
                self.out.push_str(&format!("{INDENT}{INDENT}db_table = '{value}'\n"));
            } else {
                debug!(model = %model.name, %key, "metadata has no Meta counterpart");
            }
        }

        let identifier = self.config.conventions.model_identifier();
        let display = if model.field(&self.config.conventions.name_field).is_some() {
            format!("self.{}", self.config.conventions.name_field)
        } else if model.field(&identifier).is_some() {
            format!("str(self.{identifier})")
        } else {
            "str(self.pk)".to_string()
        };
        self.out.push_str(&format!("\n{INDENT}def __str__(self):\n{INDENT}{INDENT}return {display}\n"));
        Ok(())
    }

    pub fn emit_admin(&mut self, models: &[Model]) {
        self.out.push_str("from django.contrib import admin\n\nfrom .models import (\n");
        for model in models {
            self.out.push_str(&format!("{INDENT}{},\n", model.name));
        }
        self.out.push_str(")\n");

        for model in models {
            self.out.push_str(&format!("\n\nclass {}Admin(admin.ModelAdmin):\n", model.name));
            let list_display = quoted(&self.list_display(model));
            self.out.push_str(&format!("{INDENT}list_display = [{list_display}]\n"));
            self.out.push_str(&format!("{INDENT}readonly_fields = [{}]\n", quoted(&readonly_fields(model))));
        }

        self.out.push_str("\n\n");
        for model in models {
            self.out.push_str(&format!("admin.site.register({0}, {0}Admin)\n", model.name));
        }
    }

    fn list_display(&self, model: &Model) -> Vec<String> {
        let hinted = hinted(model, "display_list");
        if !hinted.is_empty() {
            return hinted;
        }
        let name_field = &self.config.conventions.name_field;
        if model.field(name_field).is_some() {
            return vec![name_field.clone()];
        }
        vec![self.config.conventions.model_identifier()]
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

fn readonly_fields(model: &Model) -> Vec<String> {
    let hinted = hinted(model, "readonly_field");
    if !hinted.is_empty() {
        return hinted;
    }
    model.fields.iter().map(|f| f.name.clone()).collect()
}

fn hinted(model: &Model, hint: &str) -> Vec<String> {
    model
        .fields
        .iter()
        .filter(|f| f.hints.contains_key(hint))
        .map(|f| f.name.clone())
        .collect()
}

fn quoted(names: &[String]) -> String {
    names.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ")
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
