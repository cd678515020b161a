use core_types::TradingDate;
use index_engine::{changes_between, diff_snapshots, equal_weight};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

fn symbol() -> impl Strategy<Value = String> {
    "[A-Z]{1,4}"
}

proptest! {
    #[test]
    fn equal_weights_sum_to_one(count in 1usize..=500) {
        let weight = equal_weight(count);
        let total = weight * Decimal::from(count);
        prop_assert!((total - Decimal::ONE).abs() < Decimal::new(1, 9));
        prop_assert!(weight > Decimal::ZERO && weight <= Decimal::ONE);
    }

    #[test]
    fn diff_accounts_for_every_symbol(
        previous in btree_set(symbol(), 0..30),
        current in btree_set(symbol(), 0..30),
    ) {
        let date = TradingDate::from_ymd(2024, 6, 3).unwrap();
        let change = diff_snapshots(date, &previous, &current);

        let entered: BTreeSet<String> = change.entered.iter().cloned().collect();
        let exited: BTreeSet<String> = change.exited.iter().cloned().collect();

        prop_assert!(entered.is_disjoint(&exited));
        prop_assert!(entered.iter().all(|s| current.contains(s) && !previous.contains(s)));
        prop_assert!(exited.iter().all(|s| previous.contains(s) && !current.contains(s)));

        // previous - exited + entered reproduces the current snapshot.
        let rebuilt: BTreeSet<String> = previous
            .difference(&exited)
            .cloned()
            .chain(entered.iter().cloned())
            .collect();
        prop_assert_eq!(rebuilt, current);

        let mut sorted = change.entered.clone();
        sorted.sort();
        prop_assert_eq!(sorted, change.entered);
    }

    #[test]
    fn reported_changes_are_never_empty(
        snapshots in vec(btree_set(symbol(), 0..8), 0..12),
    ) {
        let by_date: BTreeMap<TradingDate, BTreeSet<String>> = snapshots
            .into_iter()
            .enumerate()
            .map(|(i, set)| (TradingDate::from_ymd(2024, 1, 1 + i as u32).unwrap(), set))
            .collect();

        let changes = changes_between(&by_date);
        prop_assert!(changes.len() < by_date.len().max(1));
        for change in &changes {
            prop_assert!(!change.entered.is_empty() || !change.exited.is_empty());
        }
    }
}
