//! Splitting list filters into request-sized batches.

use crate::baq::filters::{FilterScalar, FilterValue, Filters, or_clause};

/// Server-side limit on values per list filter in one request.
pub const MAX_BATCH_SIZE: usize = 50;

/// Splits `values` into consecutive chunks of at most `size` elements.
pub fn chunk_list<T>(values: &[T], size: usize) -> Vec<&[T]> {
    values.chunks(size.max(1)).collect()
}

/// One concrete combination of chunks; issues exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<'a> {
    pub index: usize,
    pub chunks: Vec<(&'a str, &'a [FilterScalar])>,
}

impl Plan<'_> {
    pub fn chunk(&self, key: &str) -> Option<&[FilterScalar]> {
        self.chunks
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, chunk)| *chunk)
    }
}

/// Filters partitioned into scalars and lists, plus the ordered plans.
#[derive(Debug, Clone)]
pub struct BatchPlan<'a> {
    pub scalars: Vec<(&'a str, &'a FilterScalar)>,
    pub lists: Vec<(&'a str, &'a [FilterScalar])>,
    pub plans: Vec<Plan<'a>>,
}

impl<'a> BatchPlan<'a> {
    /// True when everything fits into one request.
    pub fn is_single(&self) -> bool {
        self.plans.len() == 1
    }

    /// `$filter` for `plan`: scalar clauses first, then one disjunction per chunk.
    pub fn filter_expression(&self, plan: &Plan<'a>) -> Option<String> {
        let clauses = self
            .scalar_clauses()
            .chain(plan.chunks.iter().map(|(key, chunk)| or_clause(key, chunk)))
            .collect::<Vec<_>>();
        join_clauses(clauses)
    }

    /// `$filter` for the alternate-method retry: the list chunks are replaced by
    /// a single `method eq '<method>'` clause.
    pub fn retry_expression(&self, method: &str) -> Option<String> {
        let method = FilterValue::from(method).clause("method");
        let clauses = self
            .scalar_clauses()
            .chain(std::iter::once(method))
            .collect::<Vec<_>>();
        join_clauses(clauses)
    }

    fn scalar_clauses(&self) -> impl Iterator<Item = String> + '_ {
        self.scalars.iter().map(|(key, value)| value.eq_clause(key))
    }
}

fn join_clauses(clauses: Vec<String>) -> Option<String> {
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

/// Plans requests with the default batch size.
pub fn plan_batches(filters: &Filters) -> BatchPlan<'_> {
    plan_batches_with(filters, MAX_BATCH_SIZE)
}

/// Plans requests: the Cartesian product of per-key chunk lists, in key order,
/// with the last list key varying fastest.
pub fn plan_batches_with(filters: &Filters, batch_size: usize) -> BatchPlan<'_> {
    let mut scalars = Vec::new();
    let mut lists = Vec::new();
    for (key, value) in filters.iter() {
        match value {
            FilterValue::Scalar(scalar) => scalars.push((key, scalar)),
            FilterValue::List(values) => lists.push((key, values.as_slice())),
        }
    }

    let mut combinations: Vec<Vec<(&str, &[FilterScalar])>> = vec![Vec::new()];
    for &(key, values) in &lists {
        let chunks = chunk_list(values, batch_size);
        let mut next = Vec::with_capacity(combinations.len() * chunks.len());
        for prefix in &combinations {
            for chunk in &chunks {
                let mut combination = prefix.clone();
                combination.push((key, *chunk));
                next.push(combination);
            }
        }
        combinations = next;
    }

    let plans = combinations
        .into_iter()
        .enumerate()
        .map(|(index, chunks)| Plan { index, chunks })
        .collect();

    BatchPlan {
        scalars,
        lists,
        plans,
    }
}
