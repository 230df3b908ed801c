//! Front API: feed structs in, get ordered models out.
//!
//! ```text
//! observe_struct* → resolve (collect updates, apply) → assemble → Vec<Model>
//! ```
//!
//! Output is all-or-nothing: any schema error means no models.
use tracing::info;

use crate::assemble::{assemble_all, Model};
use crate::config::{Config, Mode};
use crate::error::{Error, Result, SchemaError};
use crate::ir::{Struct, StructSet};
use crate::resolve::resolve;

pub struct Engine {
    config: Config,
    structs: StructSet,
    // duplicates are held back so batch mode can report them with the rest
    duplicates: Vec<SchemaError>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config, structs: StructSet::new(), duplicates: Vec::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn structs(&self) -> &StructSet {
        &self.structs
    }

    /// Rejects a second declaration with the same name. The first one is kept.
    pub fn observe_struct(&mut self, s: Struct) -> Result<()> {
        if self.structs.contains(&s.name) {
            let error = SchemaError::DuplicateStruct { name: s.name };
            self.duplicates.push(error.clone());
            return match self.config.mode {
                Mode::FailFast => Err(error.into()),
                Mode::Batch => Ok(()),
            };
        }
        self.structs.insert(s);
        Ok(())
    }

    pub fn observe_all<I>(&mut self, structs: I) -> Result<()>
    where
        I: IntoIterator<Item = Struct>,
    {
        for s in structs {
            self.observe_struct(s)?;
        }
        Ok(())
    }

    /// Normalize in the configured mode.
    pub fn solve(&self) -> Result<Vec<Model>> {
        match self.config.mode {
            Mode::FailFast => self.run(false).map_err(|mut errors| Error::Schema(errors.remove(0))),
            Mode::Batch => self.run(true).map_err(Error::Batch),
        }
    }

    /// Every independent error across the input; empty means `solve` succeeds.
    pub fn validate(&self) -> Vec<SchemaError> {
        match self.run(true) {
            Ok(_) => Vec::new(),
            Err(errors) => errors,
        }
    }

    // Err is never empty.
    fn run(&self, keep_going: bool) -> std::result::Result<Vec<Model>, Vec<SchemaError>> {
        if !self.duplicates.is_empty() && !keep_going {
            return Err(self.duplicates.clone());
        }
        let mut errors = self.duplicates.clone();

        let resolution = resolve(&self.structs, &self.config);
        info!(
            structs = self.structs.len(),
            updates = resolution.updates.len(),
            errors = resolution.errors.len(),
            "relationships resolved"
        );
        errors.extend(resolution.errors);
        if !errors.is_empty() && !keep_going {
            return Err(errors);
        }

        let (models, assemble_errors) = assemble_all(&resolution.structs, &self.config.conventions);
        info!(models = models.len(), errors = assemble_errors.len(), "models assembled");
        errors.extend(assemble_errors);

        if errors.is_empty() { Ok(models) } else { Err(errors) }
    }
}

/// One-shot convenience over [`Engine`].
pub fn normalize<I>(structs: I, config: Config) -> Result<Vec<Model>>
where
    I: IntoIterator<Item = Struct>,
{
    let mut engine = Engine::new(config);
    engine.observe_all(structs)?;
    engine.solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Field;
    use crate::tag::Tag;

    fn pk() -> Field {
        Field::new("ID", "int64").with_tag(Tag::gorm("primaryKey", ""))
    }

    fn broken_input() -> Vec<Struct> {
        vec![
            Struct::new("Event", true).with_field(pk()).with_field(Field::new("VenueID", "int64")),
            Struct::new("Genre", true).with_field(Field::new("ID", "string").with_tag(Tag::gorm("primaryKey", ""))),
            Struct::new("Show", true)
                .with_field(pk())
                .with_field(Field::new("Price", "Money").with_tag(Tag::gorm("embedded", ""))),
        ]
    }

    #[test]
    fn fail_fast_reports_the_first_error_only() {
        let err = normalize(broken_input(), Config::default()).unwrap_err();
        assert_eq!(err.schema_errors().len(), 1);
        assert_eq!(err.schema_errors()[0].code(), "OrphanRelationshipID");
    }

    #[test]
    fn batch_collects_errors_across_structs() {
        let err = normalize(broken_input(), Config::default().with_mode(Mode::Batch)).unwrap_err();
        let codes = err.schema_errors().iter().map(SchemaError::code).collect::<Vec<_>>();
        assert_eq!(codes, vec!["OrphanRelationshipID", "InvalidKeyType", "UnknownEmbeddedType"]);
    }

    #[test]
    fn duplicate_struct_names_are_rejected() {
        let mut engine = Engine::new(Config::default());
        engine.observe_struct(Struct::new("Genre", true)).unwrap();
        let err = engine.observe_struct(Struct::new("Genre", false)).unwrap_err();
        assert_eq!(err.schema_errors()[0].code(), "DuplicateStruct");
        assert!(engine.structs().get("Genre").unwrap().is_model);
    }

    #[test]
    fn validate_is_empty_for_a_clean_schema() {
        let mut engine = Engine::new(Config::default());
        engine
            .observe_all([Struct::new("Genre", true).with_field(pk()).with_field(Field::new("Name", "string"))])
            .unwrap();
        assert!(engine.validate().is_empty());
        let models = engine.solve().unwrap();
        assert_eq!(models[0].fields[0].name, "id");
    }
}
