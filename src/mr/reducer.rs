use std::collections::BTreeMap;

use super::{AggregatedResult, PartialResult};

/// Job-wide total per status code.
pub type Totals = BTreeMap<String, i64>;

/// Sums counts per key. Order of the input does not matter and repeated keys
/// add up.
pub fn reduce<'a, I>(partials: I) -> Totals
where
    I: IntoIterator<Item = &'a PartialResult>,
{
    let mut totals = Totals::new();
    merge_into(&mut totals, partials);
    totals
}

pub fn merge_into<'a, I>(totals: &mut Totals, partials: I)
where
    I: IntoIterator<Item = &'a PartialResult>,
{
    for pr in partials {
        *totals.entry(pr.key.clone()).or_insert(0) += pr.count;
    }
}

pub fn to_aggregated(totals: &Totals) -> Vec<AggregatedResult> {
    totals
        .iter()
        .map(|(key, &total_count)| AggregatedResult {
            key: key.clone(),
            total_count,
        })
        .collect()
}

/// Inverse of [`to_aggregated`]; duplicate keys in a remote reply are summed.
pub fn from_aggregated(results: Vec<AggregatedResult>) -> Totals {
    let mut totals = Totals::new();
    for r in results {
        *totals.entry(r.key).or_insert(0) += r.total_count;
    }
    totals
}
