use crate::error::IndexError;
use core_types::{CompositionChange, DateRange, IndexComposition, TradingDate};
use database::CompositionStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Reports entries and exits between consecutive stored snapshots.
pub struct CompositionDiffer<S: ?Sized> {
    store: Arc<S>,
}

impl<S: CompositionStore + ?Sized> CompositionDiffer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Changes within `range`, ascending by date.
    ///
    /// The first stored date in the range has no predecessor and is never
    /// reported. Dates without a stored snapshot are skipped, so a change is
    /// always relative to the previous date that does have one.
    pub async fn diff(&self, range: DateRange) -> Result<Vec<CompositionChange>, IndexError> {
        let rows = self.store.compositions_between(range).await?;
        let snapshots = group_by_date(rows);
        let changes = changes_between(&snapshots);
        tracing::debug!(
            %range,
            snapshots = snapshots.len(),
            changes = changes.len(),
            "Computed composition changes."
        );
        Ok(changes)
    }
}

/// Collects composition rows into one symbol set per date.
pub fn group_by_date(rows: Vec<IndexComposition>) -> BTreeMap<TradingDate, BTreeSet<String>> {
    let mut snapshots: BTreeMap<TradingDate, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        snapshots.entry(row.date).or_default().insert(row.symbol);
    }
    snapshots
}

/// Diffs each snapshot against the one before it, omitting dates where
/// nothing entered or exited.
pub fn changes_between(
    snapshots: &BTreeMap<TradingDate, BTreeSet<String>>,
) -> Vec<CompositionChange> {
    let ordered: Vec<(&TradingDate, &BTreeSet<String>)> = snapshots.iter().collect();
    ordered
        .windows(2)
        .map(|pair| diff_snapshots(*pair[1].0, pair[0].1, pair[1].1))
        .filter(|change| !change.entered.is_empty() || !change.exited.is_empty())
        .collect()
}

/// `entered = current - previous`, `exited = previous - current`, both sorted.
pub fn diff_snapshots(
    date: TradingDate,
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> CompositionChange {
    CompositionChange {
        date,
        entered: current.difference(previous).cloned().collect(),
        exited: previous.difference(current).cloned().collect(),
    }
}
