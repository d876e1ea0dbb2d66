//! Ordered, deduplicating merge of transaction batches.
//!
//! Stored lists are newest first. A merge never reorders entries that are
//! already stored and never stores the same transaction id twice, so merging
//! a batch a second time is a no-op.

use std::collections::HashSet;

use ember_core::models::{BatchType, HasTransactionId, TransactionsBatchInfo};

/// Merge `batch` into `known`, returning the entries that were inserted, in
/// batch order.
///
/// - `Old` batches (history backfill) are appended after the oldest entry.
/// - `New` batches are inserted before the first stored entry whose logical
///   time is lower than the batch's `max_lt`.
///
/// Batch entries keep their relative order.
pub fn merge_transactions<T: HasTransactionId + Clone>(
    known: &mut Vec<T>,
    batch: Vec<T>,
    info: &TransactionsBatchInfo,
) -> Vec<T> {
    let mut seen: HashSet<_> = known
        .iter()
        .map(|t| t.transaction_id().clone())
        .collect();
    let fresh: Vec<T> = batch
        .into_iter()
        .filter(|t| seen.insert(t.transaction_id().clone()))
        .collect();
    if fresh.is_empty() {
        return fresh;
    }
    let inserted = fresh.clone();

    match info.batch_type {
        BatchType::Old => known.extend(fresh),
        BatchType::New => {
            let at = known
                .iter()
                .position(|t| t.transaction_id().lt < info.max_lt)
                .unwrap_or(known.len());
            let _ = known.splice(at..at, fresh);
        }
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::models::TransactionId;
    use proptest::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Tx(TransactionId);

    impl HasTransactionId for Tx {
        fn transaction_id(&self) -> &TransactionId {
            &self.0
        }
    }

    fn tx(lt: u64) -> Tx {
        Tx(TransactionId {
            lt,
            hash: format!("h{lt}"),
        })
    }

    fn info(batch: &[Tx], batch_type: BatchType) -> TransactionsBatchInfo {
        let lts = batch.iter().map(|t| t.0.lt);
        TransactionsBatchInfo {
            min_lt: lts.clone().min().unwrap_or(0),
            max_lt: lts.max().unwrap_or(0),
            batch_type,
        }
    }

    fn lts(list: &[Tx]) -> Vec<u64> {
        list.iter().map(|t| t.0.lt).collect()
    }

    #[test]
    fn new_batch_goes_in_front() {
        let mut known = vec![tx(20), tx(10)];
        let batch = vec![tx(40), tx(30)];
        let i = info(&batch, BatchType::New);
        assert_eq!(lts(&merge_transactions(&mut known, batch, &i)), vec![40, 30]);
        assert_eq!(lts(&known), vec![40, 30, 20, 10]);
    }

    #[test]
    fn old_batch_is_appended() {
        let mut known = vec![tx(40), tx(30)];
        let batch = vec![tx(20), tx(10)];
        let i = info(&batch, BatchType::Old);
        assert_eq!(merge_transactions(&mut known, batch, &i).len(), 2);
        assert_eq!(lts(&known), vec![40, 30, 20, 10]);
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut known = vec![tx(30), tx(20)];
        let batch = vec![tx(40), tx(30)];
        let i = info(&batch, BatchType::New);
        assert_eq!(lts(&merge_transactions(&mut known, batch, &i)), vec![40]);
        assert_eq!(lts(&known), vec![40, 30, 20]);
    }

    #[test]
    fn duplicates_within_batch_are_dropped() {
        let mut known = Vec::new();
        let batch = vec![tx(5), tx(5)];
        let i = info(&batch, BatchType::New);
        assert_eq!(lts(&merge_transactions(&mut known, batch, &i)), vec![5]);
    }

    #[test]
    fn empty_known_list() {
        let mut known = Vec::new();
        let batch = vec![tx(2), tx(1)];
        let i = info(&batch, BatchType::New);
        let _ = merge_transactions(&mut known, batch, &i);
        assert_eq!(lts(&known), vec![2, 1]);
    }

    proptest! {
        #[test]
        fn merge_is_idempotent_and_keeps_order(
            first in proptest::collection::vec(1u64..500, 0..20),
            second in proptest::collection::vec(1u64..500, 0..20),
            old in any::<bool>(),
        ) {
            let batch_type = if old { BatchType::Old } else { BatchType::New };
            let mut known = Vec::new();
            let b1: Vec<Tx> = first.iter().map(|lt| tx(*lt)).collect();
            let i1 = info(&b1, BatchType::New);
            let _ = merge_transactions(&mut known, b1, &i1);
            let before = known.clone();

            let b2: Vec<Tx> = second.iter().map(|lt| tx(*lt)).collect();
            let i2 = info(&b2, batch_type);
            let _ = merge_transactions(&mut known, b2.clone(), &i2);

            // previously stored entries keep their relative order
            let kept: Vec<Tx> = known.iter().filter(|t| before.contains(t)).cloned().collect();
            prop_assert_eq!(&kept, &before);

            // no duplicate ids
            let unique: HashSet<_> = known.iter().map(|t| t.0.clone()).collect();
            prop_assert_eq!(unique.len(), known.len());

            // merging the same batch again changes nothing
            let after = known.clone();
            prop_assert!(merge_transactions(&mut known, b2, &i2).is_empty());
            prop_assert_eq!(known, after);
        }
    }
}
