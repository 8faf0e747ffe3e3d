use clap::Args;
use scanner_core::{parse_limit, parse_strict, FieldPath, Query, ScannerError, SortKey};

/// Options shared by `search` and `rank`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    /// Match all words in the searched fields
    #[arg(long, num_args = 1.., value_name = "WORD")]
    pub text: Vec<String>,

    /// Fields used for text matching (default: name summary type location.name)
    #[arg(long, num_args = 1.., value_name = "FIELD")]
    pub fields: Vec<String>,

    /// Field/value pairs; the field must contain the value
    #[arg(long, num_args = 1.., value_name = "FIELD VALUE")]
    pub filters: Vec<String>,

    /// Sort keys in priority order
    #[arg(long, num_args = 1.., value_name = "KEY")]
    pub sort: Vec<String>,

    /// Maximum number of results (0 = unbounded)
    #[arg(long, allow_hyphen_values = true)]
    pub limit: Option<String>,

    /// true: hard filtering only, false: relevance scoring and ranking
    #[arg(long)]
    pub strict: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RankArgs {
    /// Field used for grouping
    #[arg(long)]
    pub group: Option<String>,

    #[command(flatten)]
    pub query: QueryArgs,
}

impl QueryArgs {
    pub fn to_query(&self) -> scanner_core::Result<Query> {
        let mut query = Query::new();

        if !self.text.is_empty() {
            query = query.with_text(self.text.join(" "));
        }

        if !self.fields.is_empty() {
            let fields = self
                .fields
                .iter()
                .map(|f| FieldPath::parse(f))
                .collect::<scanner_core::Result<Vec<_>>>()?;
            query = query.with_fields(fields);
        }

        if self.filters.len() % 2 != 0 {
            return Err(ScannerError::InvalidQuery(
                "--filters expects field/value pairs".into(),
            ));
        }
        for pair in self.filters.chunks(2) {
            query = query.with_filter(FieldPath::parse(&pair[0])?, pair[1].clone());
        }

        if !self.sort.is_empty() {
            let keys = self
                .sort
                .iter()
                .map(|k| SortKey::parse(k))
                .collect::<scanner_core::Result<Vec<_>>>()?;
            query = query.with_sort(keys);
        }

        if let Some(limit) = &self.limit {
            query = query.with_limit(parse_limit(limit)?);
        }

        if let Some(strict) = &self.strict {
            query = query.with_strict(parse_strict(strict)?);
        }

        Ok(query)
    }
}

impl RankArgs {
    /// `None` when `--group` is missing.
    pub fn to_query(&self) -> scanner_core::Result<Option<Query>> {
        let Some(group) = &self.group else {
            return Ok(None);
        };
        let query = self.query.to_query()?.with_group_by(FieldPath::parse(group)?);
        Ok(Some(query))
    }
}
