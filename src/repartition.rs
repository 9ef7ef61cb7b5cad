//! Re-chunking of raw batches towards a target row count.
//!
//! The algorithm runs with the registry lock held. It drains the contiguous
//! prefix of raw batches admitted by the watermark, regroups their rows into
//! collections of roughly `target` rows and never reorders rows: the emitted
//! collections concatenated equal the drained batches concatenated in batch
//! index order.

use std::collections::BTreeMap;

use crate::{
    batch::{BatchIndex, Watermark},
    collection::RowCollection,
    error::Result,
};

/// Result of one repartition pass.
#[derive(Debug)]
pub enum RepartitionOutcome {
    /// No raw batch lies below the watermark.
    Idle,
    /// Candidates exist but hold fewer rows than the target; nothing was
    /// consumed.
    Deferred {
        /// Rows that were available below the watermark.
        candidate_rows: usize,
    },
    /// Raw batches were consumed.
    Emitted {
        /// Highest batch index consumed by the pass.
        last_index: BatchIndex,
        /// Sized collections in row order.
        batches: Vec<RowCollection>,
        /// Rows put back into the raw map under `last_index`.
        carried_rows: usize,
    },
}

/// Remove and return every raw batch admitted by `watermark`, in increasing
/// index order.
pub(crate) fn drain_below(
    raw: &mut BTreeMap<BatchIndex, RowCollection>,
    watermark: Watermark,
) -> Vec<(BatchIndex, RowCollection)> {
    let rest = match watermark {
        Watermark::Unbounded => BTreeMap::new(),
        Watermark::At(min_in_flight) => raw.split_off(&min_in_flight),
    };
    let drained = std::mem::replace(raw, rest);
    drained.into_iter().collect()
}

/// Run one repartition pass over `raw`.
///
/// When `final_pass` is false and the rows below the watermark do not add up
/// to `target`, nothing is consumed. A trailing remainder that is not close
/// enough to `target` goes back into `raw` under the last consumed index,
/// unless this is the final pass.
pub fn repartition(
    raw: &mut BTreeMap<BatchIndex, RowCollection>,
    watermark: Watermark,
    target: usize,
    final_pass: bool,
) -> Result<RepartitionOutcome> {
    debug_assert!(target > 0, "repartition requires a target batch size");

    let candidate_rows: usize = raw
        .iter()
        .take_while(|(index, _)| watermark.admits(**index))
        .map(|(_, collection)| collection.len())
        .sum();
    let has_candidates = raw
        .first_key_value()
        .is_some_and(|(index, _)| watermark.admits(*index));
    if !has_candidates {
        return Ok(RepartitionOutcome::Idle);
    }
    if !final_pass && candidate_rows < target {
        return Ok(RepartitionOutcome::Deferred { candidate_rows });
    }

    let drained = drain_below(raw, watermark);
    let mut last_index = 0;
    let mut current: Option<RowCollection> = None;
    let mut batches = Vec::new();

    for (index, collection) in drained {
        last_index = index;
        if current.is_none() {
            if collection.is_sized_for(target) {
                batches.push(collection);
                continue;
            }
            if collection.len() < target {
                current = Some(collection);
                continue;
            }
        }

        let acc = current.get_or_insert_with(|| collection.empty_like());
        for chunk in collection.into_chunks() {
            acc.append(chunk)?;
            if acc.len() >= target {
                let fresh = acc.empty_like();
                batches.push(std::mem::replace(acc, fresh));
            }
        }
    }

    let mut carried_rows = 0;
    if let Some(rest) = current.filter(|rest| !rest.is_empty()) {
        if final_pass || rest.is_sized_for(target) {
            batches.push(rest);
        } else {
            carried_rows = rest.len();
            raw.insert(last_index, rest);
        }
    }

    Ok(RepartitionOutcome::Emitted {
        last_index,
        batches,
        carried_rows,
    })
}
