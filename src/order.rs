// Deterministic output ordering. Cosmetic, but renderers and tests rely on
// exact positions.
use std::cmp::Ordering;

use crate::assemble::Model;
use crate::classify::ModelField;
use crate::config::Conventions;

/// identifier, `name`, everything else, then timestamps; ties by name.
pub fn sort_fields(fields: &mut [ModelField], conventions: &Conventions) {
    let identifier = conventions.model_identifier();
    fields.sort_by(|a, b| compare_fields(&a.name, &b.name, &identifier, conventions));
}

pub fn sort_models(models: &mut [Model]) {
    models.sort_by(|a, b| a.name.cmp(&b.name));
}

fn compare_fields(a: &str, b: &str, identifier: &str, conventions: &Conventions) -> Ordering {
    let rank = |name: &str| -> u8 {
        if name == identifier {
            0
        } else if name == conventions.name_field {
            1
        } else if name.ends_with(conventions.timestamp_suffix.as_str()) {
            3
        } else {
            2
        }
    };
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}
