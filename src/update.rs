use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;

use crate::{
    id::{object_list_id, ObjectKey},
    set::{IndexEntry, IndexSet},
    store::{SessionContext, Store},
    Error, RawId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndexAction {
    Insert,
    Remove,
}

// bookkeeping shared by every outstanding index-record write of one update;
// dropped when the last leg completes
struct UpdateOp<S> {
    store: Arc<S>,
    ctx: SessionContext,
    object_id: RawId,
    state: Mutex<FanoutState>,
    // old payloads overwritten on the index side, kept for rollback
    previous_payloads: Mutex<BTreeMap<RawId, Vec<u8>>>,
}

#[derive(Default)]
struct FanoutState {
    success_inserted: Vec<RawId>,
    success_removed: Vec<RawId>,
    first_error: Option<Error>,
}

impl<S: Store + Send + Sync + 'static> UpdateOp<S> {
    async fn apply(&self, index: RawId, action: IndexAction, payload: Vec<u8>) -> Result<(), Error> {
        self.store
            .cas_write(
                index,
                |current| self.convert_index_record(index, current, action, &payload),
                &self.ctx,
            )
            .await
    }

    // runs inside the CAS and may be retried with a fresh value
    fn convert_index_record(
        &self,
        index: RawId,
        current: Option<&[u8]>,
        action: IndexAction,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut set = IndexSet::decode_or_empty(current)?;

        match set.position(self.object_id) {
            Ok(pos) => match action {
                IndexAction::Insert => {
                    if set.entries[pos].data == payload {
                        // already bound with the same payload, keep the
                        // record untouched
                        return Ok(current.unwrap_or_default().to_vec());
                    }
                    let old = std::mem::replace(&mut set.entries[pos].data, payload.to_vec());
                    self.previous_payloads.lock().unwrap().insert(index, old);
                }
                IndexAction::Remove => {
                    set.entries.remove(pos);
                }
            },
            Err(pos) => match action {
                IndexAction::Insert => {
                    set.entries.insert(
                        pos,
                        IndexEntry {
                            index: self.object_id,
                            data: payload.to_vec(),
                        },
                    );
                }
                IndexAction::Remove => {
                    // not bound, nothing to erase
                    return Ok(current.unwrap_or_default().to_vec());
                }
            },
        }

        Ok(set.encode())
    }

    fn record(&self, index: RawId, action: IndexAction, result: Result<(), Error>) {
        let mut state = self.state.lock().unwrap();
        match result {
            Ok(()) => match action {
                IndexAction::Insert => state.success_inserted.push(index),
                IndexAction::Remove => state.success_removed.push(index),
            },
            Err(err) => {
                if state.first_error.is_none() {
                    state.first_error = Some(err);
                }
            }
        }
    }
}

pub(crate) async fn update_indexes<S>(
    store: Arc<S>,
    ctx: SessionContext,
    revert_on_total_failure: bool,
    key: ObjectKey,
    entries: Vec<IndexEntry>,
) -> Result<(), Error>
where
    S: Store + Send + Sync + 'static,
{
    let desired = IndexSet::from_unsorted(entries);
    let encoded = desired.encode();
    let list_id = object_list_id(&key);

    // the object-list CAS serializes concurrent updates of the same object;
    // the diffs below are computed against the value actually replaced
    let mut previous = IndexSet::default();
    store
        .cas_write(
            list_id,
            |current| {
                previous = IndexSet::decode_or_empty(current)?;
                Ok(encoded.clone())
            },
            &ctx,
        )
        .await?;

    // A changed payload is re-inserted so the index side picks up the new
    // bytes; removals compare by id only.
    let mut to_insert: Vec<IndexEntry> = Vec::new();
    for entry in desired.entries() {
        match previous.get(entry.index) {
            Some(prev) if prev.data == entry.data => {}
            _ => to_insert.push(entry.clone()),
        }
    }
    let mut to_remove: Vec<IndexEntry> = Vec::new();
    for entry in previous.entries() {
        if desired.get(entry.index).is_none() {
            to_remove.push(entry.clone());
        }
    }

    if to_insert.is_empty() && to_remove.is_empty() {
        return Ok(());
    }

    let op = Arc::new(UpdateOp {
        store: Arc::clone(&store),
        ctx: ctx.clone(),
        object_id: key.raw_id(),
        state: Mutex::new(FanoutState::default()),
        previous_payloads: Mutex::new(BTreeMap::new()),
    });

    log::debug!(
        "updating indexes of {:?}: {} to insert, {} to remove",
        op.object_id,
        to_insert.len(),
        to_remove.len()
    );

    let mut legs: Vec<(RawId, IndexAction, Vec<u8>)> =
        Vec::with_capacity(to_insert.len() + to_remove.len());
    for entry in &to_insert {
        legs.push((entry.index, IndexAction::Insert, entry.data.clone()));
    }
    for entry in &to_remove {
        legs.push((entry.index, IndexAction::Remove, Vec::new()));
    }

    let handles: Vec<_> = legs
        .into_iter()
        .map(|(index, action, payload)| {
            let op = Arc::clone(&op);
            tokio::spawn(async move {
                let result = op.apply(index, action, payload).await;
                op.record(index, action, result);
            })
        })
        .collect();
    for joined in join_all(handles).await {
        if let Err(err) = joined {
            let mut state = op.state.lock().unwrap();
            if state.first_error.is_none() {
                state.first_error =
                    Some(Error::Internal(format!("index update task failed: {err}")));
            }
        }
    }

    let state = std::mem::take(&mut *op.state.lock().unwrap());
    let Some(first_error) = state.first_error else {
        return Ok(());
    };

    if state.success_inserted.is_empty() && state.success_removed.is_empty() {
        // No index record changed, but the object-list record has already
        // been advanced past them.
        if revert_on_total_failure {
            let restored = previous.encode();
            if let Err(err) = store
                .cas_write(list_id, |_| Ok(restored.clone()), &ctx)
                .await
            {
                log::error!("failed to restore object-list record {:?}: {}", list_id, err);
                return Err(Error::Inconsistent(Box::new(first_error)));
            }
        }
        return Err(first_error);
    }

    log::warn!(
        "update of {:?} failed ({}), rolling back {} index records",
        op.object_id,
        first_error,
        state.success_inserted.len() + state.success_removed.len()
    );

    let mut reverts = Vec::with_capacity(state.success_inserted.len() + state.success_removed.len());
    for index in state.success_inserted {
        reverts.push((index, IndexAction::Remove, Vec::new()));
    }
    for index in state.success_removed {
        let payload = op
            .previous_payloads
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .or_else(|| previous.get(index).map(|entry| entry.data.clone()))
            .unwrap_or_default();
        reverts.push((index, IndexAction::Insert, payload));
    }

    let handles: Vec<_> = reverts
        .into_iter()
        .map(|(index, action, payload)| {
            let op = Arc::clone(&op);
            tokio::spawn(async move { op.apply(index, action, payload).await })
        })
        .collect();
    let mut rollback_failed = false;
    for joined in join_all(handles).await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::error!("rollback of {:?} left an index record behind: {}", op.object_id, err);
                rollback_failed = true;
            }
            Err(err) => {
                log::error!("rollback task of {:?} failed: {}", op.object_id, err);
                rollback_failed = true;
            }
        }
    }

    if rollback_failed {
        return Err(Error::Inconsistent(Box::new(first_error)));
    }
    Err(first_error)
}
