//! Filter expressions to bool query translation
//!
//! AND filters land in `filter`, OR filters in one `should` group, negated
//! predicates in `must_not`. Fields with a `.` belong to a nested document;
//! predicates on the same path share one `nested` wrapper per clause.

use crate::entity::Timestamp;
use crate::error::{Error, Result};
use crate::filter::{Filter, LikePolarity, Operator};
use elastore_dsl::query::{BoolQuery, Query, RangeParams};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Range format for epoch millisecond bounds
pub const EPOCH_MILLIS: &str = "epoch_millis";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslatorOptions {
    pub like_polarity: LikePolarity,
}

/// Compiled predicate and the clause side it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub query: Query,
    pub negated: bool,
}

impl Predicate {
    fn positive(query: Query) -> Option<Self> {
        Some(Self {
            query,
            negated: false,
        })
    }

    fn negated(query: Query) -> Option<Self> {
        Some(Self {
            query,
            negated: true,
        })
    }
}

type PredicateFn = fn(&Filter, &TranslatorOptions) -> Result<Option<Predicate>>;

/// Operator registry, built once and read-only afterwards
fn registry() -> &'static HashMap<Operator, PredicateFn> {
    static REGISTRY: OnceLock<HashMap<Operator, PredicateFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut builders: HashMap<Operator, PredicateFn> = HashMap::new();
        builders.insert(Operator::Eq, build_eq);
        builders.insert(Operator::Neq, build_neq);
        builders.insert(Operator::Like, build_like);
        builders.insert(Operator::Gt, build_gt);
        builders.insert(Operator::Gte, build_gte);
        builders.insert(Operator::Lt, build_lt);
        builders.insert(Operator::Lte, build_lte);
        builders.insert(Operator::In, build_in);
        builders.insert(Operator::NotIn, build_not_in);
        builders.insert(Operator::Between, build_between);
        builders.insert(Operator::Contains, build_contains);
        builders
    })
}

fn build_eq(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    Ok(f.first()
        .and_then(|v| Predicate::positive(Query::term(f.field(), v.clone()))))
}

fn build_neq(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    Ok(f.first()
        .and_then(|v| Predicate::negated(Query::term(f.field(), v.clone()))))
}

fn build_like(f: &Filter, opts: &TranslatorOptions) -> Result<Option<Predicate>> {
    let Some(first) = f.first() else {
        return Ok(None);
    };
    let mut pattern = match first {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if pattern.contains('*') {
        pattern.push('*');
    }
    let query = Query::wildcard(f.field(), pattern);
    Ok(match opts.like_polarity {
        LikePolarity::Include => Predicate::positive(query),
        LikePolarity::Exclude => Predicate::negated(query),
    })
}

fn comparison(f: &Filter, set: fn(&mut RangeParams, Value)) -> Result<Option<Predicate>> {
    let Some(n) = f.number_at(0)? else {
        return Ok(None);
    };
    let mut params = RangeParams::default();
    set(&mut params, Value::from(n));
    Ok(Predicate::positive(Query::range(f.field(), params)))
}

fn build_gt(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    comparison(f, |p, v| p.gt = Some(v))
}

fn build_gte(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    comparison(f, |p, v| p.gte = Some(v))
}

fn build_lt(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    comparison(f, |p, v| p.lt = Some(v))
}

fn build_lte(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    comparison(f, |p, v| p.lte = Some(v))
}

fn build_in(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    if f.values().is_empty() {
        return Ok(None);
    }
    Ok(Predicate::positive(Query::terms(f.field(), f.values().to_vec())))
}

fn build_not_in(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    if f.values().is_empty() {
        return Ok(None);
    }
    Ok(Predicate::negated(Query::terms(f.field(), f.values().to_vec())))
}

fn build_between(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    let Some(from) = f.number_at(0)? else {
        return Ok(None);
    };
    let params = RangeParams {
        gte: Some(Value::from(from)),
        lte: f.number_at(1)?.map(Value::from),
        ..Default::default()
    };
    Ok(Predicate::positive(Query::range(f.field(), params)))
}

fn build_contains(f: &Filter, _: &TranslatorOptions) -> Result<Option<Predicate>> {
    Ok(f.first()
        .and_then(|v| Predicate::positive(Query::terms_set(f.field(), vec![v.clone()]))))
}

/// Closed epoch-millisecond range on one field
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub field: String,
    pub from: Timestamp,
    pub to: Timestamp,
}

impl RangeFilter {
    pub fn to_query(&self) -> Query {
        Query::range(
            self.field.clone(),
            RangeParams {
                gte: Some(self.from.into()),
                lte: Some(self.to.into()),
                format: Some(EPOCH_MILLIS.to_string()),
                ..Default::default()
            },
        )
    }
}

#[derive(Debug)]
enum Entry {
    Plain(Query),
    Nested { path: String, queries: Vec<Query> },
}

/// One clause list, grouping nested predicates by path in first-seen order.
/// Predicates sharing a path are joined with `must` inside their wrapper.
#[derive(Debug, Default)]
struct Clause {
    entries: Vec<Entry>,
}

impl Clause {
    fn push(&mut self, path: Option<&str>, query: Query) {
        let Some(path) = path else {
            self.entries.push(Entry::Plain(query));
            return;
        };
        let group = self
            .entries
            .iter()
            .position(|e| matches!(e, Entry::Nested { path: p, .. } if p == path));
        match group {
            Some(idx) => {
                if let Entry::Nested { queries, .. } = &mut self.entries[idx] {
                    queries.push(query);
                }
            }
            None => self.entries.push(Entry::Nested {
                path: path.to_string(),
                queries: vec![query],
            }),
        }
    }

    fn build(self) -> Vec<Query> {
        self.entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Plain(q) => q,
                Entry::Nested { path, queries } => Query::nested(
                    path,
                    Query::Bool(BoolQuery {
                        must: queries,
                        ..Default::default()
                    }),
                ),
            })
            .collect()
    }
}

/// The three clause lists before they are assembled into one bool query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolClauses {
    /// Positive AND predicates
    pub filter: Vec<Query>,
    /// Positive OR predicates, across every OR group
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub range: Option<Query>,
}

impl BoolClauses {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.range.is_none()
    }

    /// Assemble the root bool query. The range joins `filter`; OR predicates
    /// are wrapped in one `bool.should` that must match at least once.
    pub fn into_query(self) -> Query {
        if self.is_empty() {
            return Query::match_all();
        }
        let mut filter = self.filter;
        filter.extend(self.range);

        let (should, minimum_should_match) = if self.should.is_empty() {
            (Vec::new(), None)
        } else {
            let group = Query::Bool(BoolQuery {
                should: self.should,
                ..Default::default()
            });
            (vec![group], Some(Value::from(1)))
        };

        Query::Bool(BoolQuery {
            filter,
            should,
            must_not: self.must_not,
            minimum_should_match,
            ..Default::default()
        })
    }
}

/// Translation output: the clauses plus filters dropped on conversion errors
#[derive(Debug, Default)]
pub struct Translation {
    pub clauses: BoolClauses,
    pub dropped: Vec<Error>,
}

impl Translation {
    pub fn into_query(self) -> Query {
        self.clauses.into_query()
    }
}

/// Compiles filter groups into the engine's bool query
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTranslator {
    options: TranslatorOptions,
}

impl QueryTranslator {
    pub fn new(options: TranslatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TranslatorOptions {
        &self.options
    }

    /// Compile one filter. `Ok(None)` when it contributes nothing.
    pub fn predicate(&self, filter: &Filter) -> Result<Option<Predicate>> {
        let build = registry()
            .get(&filter.operator())
            .ok_or_else(|| Error::UnsupportedOperator(filter.operator().to_string()))?;
        build(filter, &self.options)
    }

    pub fn translate(
        &self,
        and_filters: &[Filter],
        or_filters: &[Filter],
        range: Option<&RangeFilter>,
    ) -> Result<Translation> {
        let mut filter = Clause::default();
        let mut should = Clause::default();
        let mut must_not = Clause::default();
        let mut dropped = Vec::new();

        for f in and_filters {
            self.place(f, &mut filter, &mut must_not, &mut dropped)?;
        }
        for f in or_filters {
            self.place(f, &mut should, &mut must_not, &mut dropped)?;
        }

        Ok(Translation {
            clauses: BoolClauses {
                filter: filter.build(),
                should: should.build(),
                must_not: must_not.build(),
                range: range.map(RangeFilter::to_query),
            },
            dropped,
        })
    }

    fn place(
        &self,
        f: &Filter,
        positive: &mut Clause,
        negative: &mut Clause,
        dropped: &mut Vec<Error>,
    ) -> Result<()> {
        if !f.is_active() {
            return Ok(());
        }
        match self.predicate(f) {
            Ok(Some(pred)) => {
                let clause = if pred.negated { negative } else { positive };
                clause.push(f.nested_path(), pred.query);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err @ Error::Conversion { .. }) => {
                tracing::warn!("Dropping {} filter on '{}': {}", f.operator(), f.field(), err);
                crate::metrics::record_dropped_filter(f.operator().as_str());
                dropped.push(err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
