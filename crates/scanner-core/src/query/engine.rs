use super::{GroupResult, Query, ResultSet, ScoredEvent, SortKey};
use crate::error::{Result, ScannerError};
use crate::event::{normalize, normalize_str, Event, FieldPath};
use std::cmp::Ordering;
use serde_json::Value;
use std::collections::HashMap;

/// Evaluate `query` against `events`.
///
/// Stages run in a fixed order: reject empty queries, hard filter (strict
/// mode only), then either group or score, sort and limit. The input slice is
/// never modified; results borrow from it.
pub fn evaluate<'a>(events: &'a [Event], query: &Query) -> Result<ResultSet<'a>> {
    if query.is_empty() {
        return Err(ScannerError::EmptyQuery);
    }

    let matcher = Matcher::new(query);

    // Non-strict mode does no hard rejection at all, filters included.
    // Relevance comes from the score alone.
    let survivors: Vec<&Event> = events
        .iter()
        .filter(|e| !query.strict || matcher.matches(e))
        .collect();

    log::debug!(
        "query: {} of {} events survive filtering (strict={})",
        survivors.len(),
        events.len(),
        query.strict
    );

    if let Some(group_by) = &query.group_by {
        let order = GroupOrder::from_keys(&query.sort)?;
        let mut groups = group_events(&survivors, group_by, &matcher);
        groups.sort_by(|a, b| order.compare(a, b));
        truncate(&mut groups, query.limit);
        return Ok(ResultSet::Groups(groups));
    }

    let scored: Vec<ScoredEvent<'a>> = if query.strict {
        survivors
            .into_iter()
            .map(|event| ScoredEvent { event, score: 0 })
            .collect()
    } else {
        survivors
            .into_iter()
            .map(|event| ScoredEvent {
                event,
                score: matcher.score(event),
            })
            .filter(|s| s.score > 0)
            .collect()
    };

    let mut ranked = sort_events(scored, &query.sort);
    truncate(&mut ranked, query.limit);
    Ok(ResultSet::Events(ranked))
}

/// Normalized query signals shared by filtering and scoring.
struct Matcher {
    tokens: Vec<String>,
    fields: Vec<FieldPath>,
    filters: Vec<(FieldPath, String)>,
}

impl Matcher {
    fn new(query: &Query) -> Self {
        let fields = if query.fields.is_empty() {
            FieldPath::default_search_fields()
        } else {
            query.fields.clone()
        };

        Self {
            tokens: query.tokens(),
            fields,
            filters: query
                .filters
                .iter()
                .map(|f| (f.field.clone(), normalize_str(&f.value)))
                .collect(),
        }
    }

    /// Normalized values of the scoped fields joined by single spaces.
    /// Absent and null fields are skipped.
    fn blob(&self, event: &Event) -> String {
        self.fields
            .iter()
            .filter_map(|path| path.resolve(event))
            .filter(|value| !value.is_null())
            .map(|value| normalize(Some(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn filter_hit(path: &FieldPath, value: &str, event: &Event) -> bool {
        normalize(path.resolve(event)).contains(value)
    }

    /// Every filter contained and every token present in the blob.
    fn matches(&self, event: &Event) -> bool {
        let filters_ok = self
            .filters
            .iter()
            .all(|(path, value)| Self::filter_hit(path, value, event));
        if !filters_ok {
            return false;
        }
        if self.tokens.is_empty() {
            return true;
        }
        let blob = self.blob(event);
        self.tokens.iter().all(|t| blob.contains(t.as_str()))
    }

    /// Matched tokens plus matched filters.
    fn score(&self, event: &Event) -> u32 {
        let token_hits = if self.tokens.is_empty() {
            0
        } else {
            let blob = self.blob(event);
            self.tokens
                .iter()
                .filter(|t| blob.contains(t.as_str()))
                .count()
        };
        let filter_hits = self
            .filters
            .iter()
            .filter(|(path, value)| Self::filter_hit(path, value, event))
            .count();
        (token_hits + filter_hits) as u32
    }
}

fn group_events(events: &[&Event], group_by: &FieldPath, matcher: &Matcher) -> Vec<GroupResult> {
    // First-seen order is kept so that unresolved ties stay deterministic.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut totals: Vec<(String, usize, u64)> = Vec::new();

    for event in events {
        let key = normalize(group_by.resolve(event));
        if key.is_empty() {
            continue;
        }
        let score = u64::from(matcher.score(event));
        match index.get(&key) {
            Some(&i) => {
                totals[i].1 += 1;
                totals[i].2 += score;
            }
            None => {
                index.insert(key.clone(), totals.len());
                totals.push((key, 1, score));
            }
        }
    }

    totals
        .into_iter()
        .map(|(group, count, score_sum)| GroupResult {
            avg_score: score_sum as f64 / count as f64,
            group,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GroupKey {
    Count,
    AvgScore,
    Group,
}

enum GroupOrder {
    /// `(avg_score desc, count desc, group asc)`
    Default,
    /// Every key descending, first key wins.
    Keys(Vec<GroupKey>),
}

impl GroupOrder {
    fn from_keys(keys: &[SortKey]) -> Result<Self> {
        if keys.is_empty() {
            return Ok(GroupOrder::Default);
        }

        keys.iter()
            .map(|key| match key.name().as_str() {
                "count" => Ok(GroupKey::Count),
                "avg_score" => Ok(GroupKey::AvgScore),
                "group" => Ok(GroupKey::Group),
                other => Err(ScannerError::InvalidQuery(format!(
                    "cannot sort groups by '{}' (use count, avg_score or group)",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(GroupOrder::Keys)
    }

    fn compare(&self, a: &GroupResult, b: &GroupResult) -> Ordering {
        match self {
            GroupOrder::Default => b
                .avg_score
                .total_cmp(&a.avg_score)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.group.cmp(&b.group)),
            GroupOrder::Keys(keys) => keys
                .iter()
                .map(|key| match key {
                    GroupKey::Count => b.count.cmp(&a.count),
                    GroupKey::AvgScore => b.avg_score.total_cmp(&a.avg_score),
                    GroupKey::Group => b.group.cmp(&a.group),
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Value of one sort key for one event.
///
/// Variant order is the rank across types: absent or null fields sort
/// lowest, then numbers, then text.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Absent,
    Score(u32),
    Number(Num),
    Text(String),
}

impl SortValue {
    fn of_field(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => SortValue::Absent,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(n) => SortValue::Number(Num(n)),
                None => SortValue::Text(normalize(value)),
            },
            Some(_) => SortValue::Text(normalize(value)),
        }
    }
}

/// JSON number with a total order.
#[derive(Debug, Clone, Copy)]
struct Num(f64);

impl PartialEq for Num {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Num {}

impl PartialOrd for Num {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Num {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn sort_events<'a>(scored: Vec<ScoredEvent<'a>>, keys: &[SortKey]) -> Vec<ScoredEvent<'a>> {
    let datetime = SortKey::Field(FieldPath::from_static("datetime"));
    let default_keys = [SortKey::Score, datetime];
    let keys = if keys.is_empty() { &default_keys[..] } else { keys };

    let mut keyed: Vec<(Vec<SortValue>, ScoredEvent<'a>)> = scored
        .into_iter()
        .map(|item| {
            let tuple = keys
                .iter()
                .map(|key| match key {
                    SortKey::Score => SortValue::Score(item.score),
                    SortKey::Field(path) => SortValue::of_field(path.resolve(item.event)),
                })
                .collect();
            (tuple, item)
        })
        .collect();

    // Descending on every key is the reverse of the lexicographic tuple order.
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed.into_iter().map(|(_, item)| item).collect()
}

fn truncate<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit.filter(|l| *l > 0) {
        items.truncate(limit);
    }
}
