//! Declarative event queries: filter, score, group, sort and limit.

mod engine;

pub use engine::evaluate;

use crate::error::{Result, ScannerError};
use crate::event::{normalize_str, Event, FieldPath};
use serde::Serialize;

/// Field-value containment test. The field's normalized value must contain
/// the normalized filter value; it does not have to equal it.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FieldPath,
    pub value: String,
}

/// One sort key. `score` is synthetic; anything else names an event field,
/// or for grouped queries one of `count`, `avg_score`, `group`.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Score,
    Field(FieldPath),
}

impl SortKey {
    pub fn parse(key: &str) -> Result<Self> {
        if key.trim() == "score" {
            Ok(SortKey::Score)
        } else {
            FieldPath::parse(key).map(SortKey::Field)
        }
    }

    /// Key name as typed by the user.
    pub fn name(&self) -> String {
        match self {
            SortKey::Score => "score".to_string(),
            SortKey::Field(path) => path.to_string(),
        }
    }
}

/// Query over a collection of events.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Free text, split on whitespace. Every token must match in strict mode.
    pub text: Option<String>,
    /// Scope for `text`. Empty means the default four fields.
    pub fields: Vec<FieldPath>,
    pub filters: Vec<Filter>,
    pub group_by: Option<FieldPath>,
    /// Highest priority first. Empty means the default order.
    pub sort: Vec<SortKey>,
    /// `None` or `Some(0)` is unbounded.
    pub limit: Option<usize>,
    /// Hard filtering when true, scored ranking when false.
    pub strict: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            text: None,
            fields: Vec::new(),
            filters: Vec::new(),
            group_by: None,
            sort: Vec::new(),
            limit: None,
            strict: true,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_filter(mut self, field: FieldPath, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            field,
            value: value.into(),
        });
        self
    }

    pub fn with_group_by(mut self, field: FieldPath) -> Self {
        self.group_by = Some(field);
        self
    }

    pub fn with_sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Normalized text tokens; empty when there is no usable text.
    pub fn tokens(&self) -> Vec<String> {
        self.text
            .as_deref()
            .map(|t| t.split_whitespace().map(normalize_str).collect())
            .unwrap_or_default()
    }

    /// True when none of text, filters, group field or sort keys is set.
    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
            && self.filters.is_empty()
            && self.group_by.is_none()
            && self.sort.is_empty()
    }
}

/// Event annotated with its query score. Borrows from the input collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredEvent<'a> {
    pub event: &'a Event,
    pub score: u32,
}

/// Statistics for one distinct normalized value of the group field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupResult {
    pub group: String,
    pub count: usize,
    pub avg_score: f64,
}

/// Either ranked events or grouped statistics, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet<'a> {
    Events(Vec<ScoredEvent<'a>>),
    Groups(Vec<GroupResult>),
}

impl<'a> ResultSet<'a> {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Events(events) => events.len(),
            ResultSet::Groups(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Option<&[ScoredEvent<'a>]> {
        match self {
            ResultSet::Events(events) => Some(events),
            ResultSet::Groups(_) => None,
        }
    }

    pub fn groups(&self) -> Option<&[GroupResult]> {
        match self {
            ResultSet::Groups(groups) => Some(groups),
            ResultSet::Events(_) => None,
        }
    }
}

/// Parse a user supplied limit. Non-numeric and negative values are rejected.
pub fn parse_limit(raw: &str) -> Result<usize> {
    let raw = raw.trim();
    let value: i64 = raw
        .parse()
        .map_err(|_| ScannerError::InvalidQuery(format!("limit '{}' is not an integer", raw)))?;
    usize::try_from(value)
        .map_err(|_| ScannerError::InvalidQuery(format!("limit {} must not be negative", value)))
}

/// Parse `true`/`false` for the strict flag.
pub fn parse_strict(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(ScannerError::InvalidQuery(format!(
            "strict expects true or false, got '{}'",
            other
        ))),
    }
}
