//! Corruption handling for decoded checkouts
//!
//! A record whose payload cannot be decoded is deleted on the spot and left
//! out of the batch. It is never retried and never reported to the caller
//! as a failure: one unreadable record must not block the rest of the
//! queue.

use std::collections::BTreeSet;

use spool_core::{Checkout, CodecError, Record};
use tracing::{debug, warn};

use crate::LogBackend;
use crate::error::StorageError;
use crate::store::StoreInner;

/// Select, mark pending, and decode up to `max` records of `group`
///
/// Runs entirely under the caller's store lock. When every selected record
/// turns out to be corrupt, selection repeats; each round deletes at least
/// one record, so the loop ends once the group runs out of records.
pub(crate) fn checkout_decoded<B, T, F>(
    inner: &mut StoreInner<B>,
    group: &str,
    max: usize,
    page_size: usize,
    mut decode: F,
) -> Result<Option<Checkout<T>>, StorageError>
where
    B: LogBackend,
    F: FnMut(&Record) -> Result<T, CodecError>,
{
    loop {
        let records = inner.select_unclaimed(group, max, page_size)?;
        if records.is_empty() {
            return Ok(None);
        }

        let batch_id = inner.tracker.begin(group, records.iter().map(|r| r.id));
        let mut items = Vec::with_capacity(records.len());
        let mut purged = 0;

        for record in &records {
            let error = match decode(record) {
                Ok(item) => {
                    items.push(item);
                    continue;
                }
                Err(error) => error,
            };

            warn!(
                group,
                id = %record.id,
                batch = %batch_id,
                error = %error,
                "Purging record that failed to decode"
            );

            let ids = BTreeSet::from([record.id]);
            if let Err(e) = inner.purge(&ids) {
                // Hand the unreturned records back before surfacing the failure
                inner.tracker.complete(group, &batch_id);
                return Err(e);
            }
            purged += 1;
        }

        if !items.is_empty() {
            if purged > 0 {
                debug!(group, batch = %batch_id, purged, returned = items.len(), "Checkout shrunk by corrupt records");
            }
            return Ok(Some(Checkout {
                batch_id,
                group: group.to_string(),
                items,
            }));
        }

        debug!(group, purged, "Every selected record was corrupt, selecting again");
    }
}
