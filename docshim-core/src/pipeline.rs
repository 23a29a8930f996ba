//! Aggregation pipeline model.
//!
//! A [`Pipeline`] is an ordered list of [`PipelineStage`]s evaluated left to right, each
//! stage consuming the documents produced by the previous one. Stages are closed and
//! immutable; their constructors validate their arguments, and [`Pipeline::validate`]
//! re-checks every stage before a backend runs it.
//!
//! # Example
//!
//! ```ignore
//! use docshim::pipeline::{Accumulator, Pipeline, PipelineStage};
//! use docshim::expression::Expression;
//! use docshim::query::Sort;
//!
//! let pipeline = Pipeline::new()
//!     .stage(PipelineStage::group(
//!         Expression::field("city"),
//!         [
//!             ("userCount", Accumulator::Count),
//!             ("averageAge", Accumulator::Avg(Expression::field("age"))),
//!         ],
//!     )?)
//!     .stage(PipelineStage::Sort(vec![Sort::desc("userCount")]));
//! ```

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    expression::Expression,
    projection::Projection,
    query::{Expr, Sort, SortDirection},
};

/// A group accumulator, computing one output field per partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Number of documents in the partition.
    Count,
    /// Sum of the numeric values; non-numeric values are ignored.
    Sum(Expression),
    /// Mean of the numeric values, or null when there are none.
    Avg(Expression),
    /// Value for the first document of the partition.
    First(Expression),
    /// Value for the last document of the partition.
    Last(Expression),
    /// Every value, in document order. Missing values are skipped.
    Push(Expression),
    Min(Expression),
    Max(Expression),
}

impl Accumulator {
    /// The expression this accumulator reads, if any.
    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Accumulator::Count => None,
            Accumulator::Sum(expr)
            | Accumulator::Avg(expr)
            | Accumulator::First(expr)
            | Accumulator::Last(expr)
            | Accumulator::Push(expr)
            | Accumulator::Min(expr)
            | Accumulator::Max(expr) => Some(expr),
        }
    }
}

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    /// Keeps the documents matching the filter.
    Match(Expr),
    /// Partitions documents by `key` and emits one document per partition, in order of
    /// first appearance, with `_id` set to the key value.
    Group {
        key: Expression,
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Stable multi-key sort.
    Sort(Vec<Sort>),
    /// Emits one document per element of the array at `path`.
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
    },
    /// Reshapes each document.
    Project(Projection),
    /// Left outer equi-join against another collection of the same database.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Keeps at most `n` documents. `n` must be positive.
    Limit(usize),
    /// Drops the first `n` documents.
    Skip(usize),
}

impl PipelineStage {
    /// Creates a validated group stage.
    ///
    /// # Errors
    ///
    /// Returns a validation error when an output name is empty, dotted, starts with `$`,
    /// is `_id`, or is repeated.
    pub fn group<N: Into<String>>(
        key: Expression,
        accumulators: impl IntoIterator<Item = (N, Accumulator)>,
    ) -> DocumentStoreResult<Self> {
        let stage = PipelineStage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(name, accumulator)| (name.into(), accumulator))
                .collect(),
        };

        stage.validate()?;
        Ok(stage)
    }

    /// Creates a validated unwind stage over `path` (with or without the leading `$`).
    pub fn unwind(path: impl AsRef<str>, preserve_null_and_empty: bool) -> DocumentStoreResult<Self> {
        let path = path.as_ref();
        let stage = PipelineStage::Unwind {
            path: path.strip_prefix('$').unwrap_or(path).to_string(),
            preserve_null_and_empty,
        };

        stage.validate()?;
        Ok(stage)
    }

    /// Creates a validated lookup stage.
    pub fn lookup(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> DocumentStoreResult<Self> {
        let stage = PipelineStage::Lookup {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        };

        stage.validate()?;
        Ok(stage)
    }

    /// Creates a validated projection stage.
    pub fn project(projection: Projection) -> DocumentStoreResult<Self> {
        projection.validate()?;
        Ok(PipelineStage::Project(projection))
    }

    /// Creates a limit stage; zero is rejected.
    pub fn limit(n: usize) -> DocumentStoreResult<Self> {
        let stage = PipelineStage::Limit(n);
        stage.validate()?;
        Ok(stage)
    }

    /// The MongoDB name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Match(_) => "$match",
            PipelineStage::Group { .. } => "$group",
            PipelineStage::Sort(_) => "$sort",
            PipelineStage::Unwind { .. } => "$unwind",
            PipelineStage::Project(_) => "$project",
            PipelineStage::Lookup { .. } => "$lookup",
            PipelineStage::Limit(_) => "$limit",
            PipelineStage::Skip(_) => "$skip",
        }
    }

    /// Checks the stage's arguments.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        match self {
            PipelineStage::Match(filter) => filter.validate(),
            PipelineStage::Group { key, accumulators } => {
                key.validate()?;

                for (index, (name, accumulator)) in accumulators.iter().enumerate() {
                    if name.is_empty() || name.starts_with('$') || name.contains('.') {
                        return Err(DocumentStoreError::validation(format!(
                            "invalid accumulator name '{name}'"
                        )));
                    }
                    if name == ID_FIELD {
                        return Err(DocumentStoreError::validation("_id is reserved for the group key"));
                    }
                    if accumulators[..index].iter().any(|(other, _)| other == name) {
                        return Err(DocumentStoreError::validation(format!("accumulator '{name}' defined twice")));
                    }
                    if let Some(expression) = accumulator.expression() {
                        expression.validate()?;
                    }
                }

                Ok(())
            }
            PipelineStage::Sort(keys) => {
                if keys.is_empty() {
                    return Err(DocumentStoreError::validation("$sort requires at least one key"));
                }
                keys.iter().try_for_each(|key| check_path("$sort", &key.field))
            }
            PipelineStage::Unwind { path, .. } => check_path("$unwind", path),
            PipelineStage::Project(projection) => projection.validate(),
            PipelineStage::Lookup { from, local_field, foreign_field, as_field } => {
                if from.is_empty() {
                    return Err(DocumentStoreError::validation("$lookup requires a 'from' collection"));
                }
                check_path("$lookup", local_field)?;
                check_path("$lookup", foreign_field)?;
                check_path("$lookup", as_field)
            }
            PipelineStage::Limit(0) => Err(DocumentStoreError::validation("$limit must be positive")),
            PipelineStage::Limit(_) | PipelineStage::Skip(_) => Ok(()),
        }
    }
}

fn check_path(stage: &str, path: &str) -> DocumentStoreResult<()> {
    if path.is_empty() || path.starts_with('$') || path.split('.').any(str::is_empty) {
        return Err(DocumentStoreError::validation(format!("{stage}: invalid field path '{path}'")));
    }

    Ok(())
}

/// An ordered sequence of pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Checks every stage.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        self.stages
            .iter()
            .try_for_each(PipelineStage::validate)
    }
}

impl From<Vec<PipelineStage>> for Pipeline {
    fn from(stages: Vec<PipelineStage>) -> Self {
        Pipeline { stages }
    }
}

/// Parses a pipeline written in MongoDB syntax, one single-key document per stage.
impl TryFrom<Vec<Document>> for Pipeline {
    type Error = DocumentStoreError;

    fn try_from(documents: Vec<Document>) -> Result<Self, Self::Error> {
        let stages = documents
            .iter()
            .map(PipelineStage::try_from)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(Pipeline { stages })
    }
}

impl TryFrom<&Document> for PipelineStage {
    type Error = DocumentStoreError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let (name, spec) = match (document.len(), document.iter().next()) {
            (1, Some(entry)) => entry,
            _ => return Err(DocumentStoreError::validation("a pipeline stage must have exactly one key")),
        };

        let stage = match name.as_str() {
            "$match" => PipelineStage::Match(Expr::try_from(stage_document(name, spec)?)?),
            "$group" => parse_group(stage_document(name, spec)?)?,
            "$sort" => PipelineStage::Sort(
                stage_document(name, spec)?
                    .iter()
                    .map(|(field, direction)| {
                        let direction = match direction {
                            Bson::Int32(1) | Bson::Int64(1) => SortDirection::Asc,
                            Bson::Int32(-1) | Bson::Int64(-1) => SortDirection::Desc,
                            Bson::Double(d) if *d == 1.0 => SortDirection::Asc,
                            Bson::Double(d) if *d == -1.0 => SortDirection::Desc,
                            _ => {
                                return Err(DocumentStoreError::validation(format!(
                                    "$sort direction for '{field}' must be 1 or -1"
                                )));
                            }
                        };

                        Ok(Sort { field: field.clone(), direction })
                    })
                    .collect::<DocumentStoreResult<_>>()?,
            ),
            "$unwind" => match spec {
                Bson::String(path) if path.starts_with('$') => PipelineStage::unwind(path, false)?,
                Bson::Document(options) => {
                    let path = match options.get("path") {
                        Some(Bson::String(path)) if path.starts_with('$') => path,
                        _ => return Err(DocumentStoreError::validation("$unwind requires a '$'-prefixed path")),
                    };
                    let preserve = match options.get("preserveNullAndEmptyArrays") {
                        None => false,
                        Some(Bson::Boolean(preserve)) => *preserve,
                        Some(_) => {
                            return Err(DocumentStoreError::validation(
                                "preserveNullAndEmptyArrays must be a boolean",
                            ));
                        }
                    };

                    PipelineStage::unwind(path, preserve)?
                }
                _ => return Err(DocumentStoreError::validation("$unwind requires a '$'-prefixed path")),
            },
            "$project" => PipelineStage::Project(Projection::try_from(stage_document(name, spec)?)?),
            "$lookup" => {
                let options = stage_document(name, spec)?;
                let text = |key: &str| match options.get(key) {
                    Some(Bson::String(value)) => Ok(value.clone()),
                    _ => Err(DocumentStoreError::validation(format!("$lookup requires a string '{key}'"))),
                };

                PipelineStage::lookup(text("from")?, text("localField")?, text("foreignField")?, text("as")?)?
            }
            "$limit" => PipelineStage::limit(stage_count(name, spec)?)?,
            "$skip" => PipelineStage::Skip(stage_count(name, spec)?),
            other => {
                return Err(DocumentStoreError::validation(format!("unknown pipeline stage {other}")));
            }
        };

        stage.validate()?;
        Ok(stage)
    }
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> DocumentStoreResult<&'a Document> {
    spec.as_document()
        .ok_or_else(|| DocumentStoreError::validation(format!("{name} requires a document")))
}

fn stage_count(name: &str, spec: &Bson) -> DocumentStoreResult<usize> {
    let count = match spec {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => return Err(DocumentStoreError::validation(format!("{name} requires an integer"))),
    };

    usize::try_from(count).map_err(|_| DocumentStoreError::validation(format!("{name} cannot be negative")))
}

fn parse_group(spec: &Document) -> DocumentStoreResult<PipelineStage> {
    let key = spec
        .get(ID_FIELD)
        .ok_or_else(|| DocumentStoreError::validation("$group requires an _id expression"))?;

    let mut accumulators = Vec::with_capacity(spec.len().saturating_sub(1));

    for (name, value) in spec.iter().filter(|(name, _)| name.as_str() != ID_FIELD) {
        let (operator, operand) = match value.as_document().map(|d| (d.len(), d.iter().next())) {
            Some((1, Some(entry))) => entry,
            _ => {
                return Err(DocumentStoreError::validation(format!(
                    "accumulator '{name}' must be a single-operator document"
                )));
            }
        };

        let operand_expr = || Expression::try_from(operand);
        let accumulator = match operator.as_str() {
            "$count" => Accumulator::Count,
            "$sum" => Accumulator::Sum(operand_expr()?),
            "$avg" => Accumulator::Avg(operand_expr()?),
            "$first" => Accumulator::First(operand_expr()?),
            "$last" => Accumulator::Last(operand_expr()?),
            "$push" => Accumulator::Push(operand_expr()?),
            "$min" => Accumulator::Min(operand_expr()?),
            "$max" => Accumulator::Max(operand_expr()?),
            other => {
                return Err(DocumentStoreError::validation(format!("unknown accumulator {other}")));
            }
        };

        accumulators.push((name.clone(), accumulator));
    }

    PipelineStage::group(Expression::try_from(key)?, accumulators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_grouping_pipeline() {
        let pipeline = Pipeline::try_from(vec![
            doc! { "$group": { "_id": "$city", "userCount": { "$sum": 1 }, "averageAge": { "$avg": "$age" } } },
            doc! { "$sort": { "userCount": -1 } },
        ])
        .unwrap();

        assert_eq!(
            pipeline.stages(),
            &[
                PipelineStage::Group {
                    key: Expression::field("city"),
                    accumulators: vec![
                        ("userCount".to_string(), Accumulator::Sum(Expression::literal(1))),
                        ("averageAge".to_string(), Accumulator::Avg(Expression::field("age"))),
                    ],
                },
                PipelineStage::Sort(vec![Sort::desc("userCount")]),
            ],
        );
    }

    #[test]
    fn parses_unwind_and_lookup() {
        let pipeline = Pipeline::try_from(vec![
            doc! { "$unwind": "$purchasedProducts" },
            doc! { "$lookup": {
                "from": "products_inventory",
                "localField": "purchasedProducts",
                "foreignField": "_id",
                "as": "productDetails",
            } },
            doc! { "$unwind": { "path": "$productDetails", "preserveNullAndEmptyArrays": true } },
        ])
        .unwrap();

        assert_eq!(
            pipeline.stages()[2],
            PipelineStage::Unwind { path: "productDetails".into(), preserve_null_and_empty: true },
        );
        assert!(matches!(&pipeline.stages()[1], PipelineStage::Lookup { from, .. } if from == "products_inventory"));
    }

    #[test]
    fn rejects_invalid_stages() {
        assert!(Pipeline::try_from(vec![doc! { "$out": "elsewhere" }]).is_err());
        assert!(Pipeline::try_from(vec![doc! { "$limit": 0 }]).is_err());
        assert!(Pipeline::try_from(vec![doc! { "$unwind": "orders" }]).is_err());
        assert!(Pipeline::try_from(vec![doc! { "$group": { "_id": null, "_id2": 1 } }]).is_err());
        assert!(PipelineStage::group(Expression::field("city"), [("", Accumulator::Count)]).is_err());
        assert!(PipelineStage::unwind("", false).is_err());
    }
}
