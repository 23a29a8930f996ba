//! Field projections for `find` results and `$project` stages.
//!
//! A projection is either inclusive (only the listed and computed fields are kept)
//! or exclusive (the listed fields are dropped). `_id` is kept unless it is explicitly
//! excluded, and excluding `_id` is the one exclusion allowed in an inclusive projection.

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    expression::Expression,
};

/// What a projection does with one field.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionField {
    Include,
    Exclude,
    /// Replaces the field with the value of an expression.
    Computed(Expression),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ProjectionField)>,
}

impl Projection {
    pub fn new() -> Self {
        Projection::default()
    }

    /// Keeps `field` (a dotted path).
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), ProjectionField::Include));
        self
    }

    /// Drops `field` (a dotted path).
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), ProjectionField::Exclude));
        self
    }

    /// Adds `field` holding the value of `expression`.
    pub fn computed(mut self, field: impl Into<String>, expression: Expression) -> Self {
        self.fields.push((field.into(), ProjectionField::Computed(expression)));
        self
    }

    pub fn fields(&self) -> &[(String, ProjectionField)] {
        &self.fields
    }

    /// Returns `true` when the projection keeps only the fields it names.
    pub fn is_inclusive(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, field)| !matches!(field, ProjectionField::Exclude))
    }

    /// Returns `true` when `_id` is explicitly excluded.
    pub fn excludes_id(&self) -> bool {
        self.fields
            .iter()
            .any(|(name, field)| name == ID_FIELD && matches!(field, ProjectionField::Exclude))
    }

    /// Checks field paths and mode consistency.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty projection, an invalid or repeated path,
    /// an invalid computed expression, or a mix of inclusions and non-`_id` exclusions.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.fields.is_empty() {
            return Err(DocumentStoreError::validation("projection must name at least one field"));
        }

        let inclusive = self.is_inclusive();

        for (index, (name, field)) in self.fields.iter().enumerate() {
            if name.is_empty() || name.starts_with('$') || name.split('.').any(str::is_empty) {
                return Err(DocumentStoreError::validation(format!("invalid projection path '{name}'")));
            }

            if self.fields[..index].iter().any(|(other, _)| other == name) {
                return Err(DocumentStoreError::validation(format!("projection names '{name}' twice")));
            }

            match field {
                ProjectionField::Exclude if inclusive && name != ID_FIELD => {
                    return Err(DocumentStoreError::validation(format!(
                        "cannot exclude '{name}' in an inclusion projection"
                    )));
                }
                ProjectionField::Computed(expression) => expression.validate()?,
                _ => {}
            }
        }

        Ok(())
    }
}

/// Parses MongoDB projection syntax: `1`/`true` includes, `0`/`false` excludes,
/// anything else is a computed expression.
impl TryFrom<&Document> for Projection {
    type Error = DocumentStoreError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let mut projection = Projection::new();

        for (name, value) in document {
            projection = match value {
                Bson::Boolean(true) => projection.include(name.as_str()),
                Bson::Boolean(false) => projection.exclude(name.as_str()),
                Bson::Int32(0) | Bson::Int64(0) => projection.exclude(name.as_str()),
                Bson::Int32(_) | Bson::Int64(_) => projection.include(name.as_str()),
                Bson::Double(n) if *n == 0.0 => projection.exclude(name.as_str()),
                Bson::Double(_) => projection.include(name.as_str()),
                other => projection.computed(name.as_str(), Expression::try_from(other)?),
            };
        }

        projection.validate()?;
        Ok(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn allows_id_exclusion_in_inclusive_projection() {
        let projection = Projection::try_from(&doc! { "name": 1, "city": 1, "_id": 0 }).unwrap();

        assert!(projection.is_inclusive());
        assert!(projection.excludes_id());
    }

    #[test]
    fn rejects_mixed_modes() {
        assert!(Projection::new().include("name").exclude("age").validate().is_err());
        assert!(Projection::new().validate().is_err());
    }

    #[test]
    fn parses_computed_fields() {
        let projection = Projection::try_from(&doc! { "name": 1, "orderCount": { "$size": "$orders" } }).unwrap();

        assert_eq!(
            projection.fields()[1],
            ("orderCount".to_string(), ProjectionField::Computed(Expression::size(Expression::field("orders")))),
        );
    }
}
