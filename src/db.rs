use std::sync::{mpsc, Arc};

use tokio::runtime::Handle;

use crate::{
    find,
    id::{index_id, object_list_id, ObjectKey},
    set::{IndexEntry, IndexSet},
    store::{SessionContext, Store},
    update, Error, FindResultEntry, RawId,
};

pub struct DB<S> {
    store: Arc<S>,
    ctx: SessionContext,
    revert_on_total_failure: bool,
}

impl<S> Clone for DB<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ctx: self.ctx.clone(),
            revert_on_total_failure: self.revert_on_total_failure,
        }
    }
}

impl<S: Store + Send + Sync + 'static> DB<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            ctx: SessionContext::default(),
            revert_on_total_failure: false,
        }
    }

    pub fn with_context(mut self, ctx: SessionContext) -> Self {
        self.ctx = ctx;
        self
    }

    // opt-in compensation when every index-record write fails after the
    // object-list record was already advanced
    pub fn revert_object_list_on_total_failure(mut self, revert: bool) -> Self {
        self.revert_on_total_failure = revert;
        self
    }

    pub async fn update_indexes(
        &self,
        key: impl Into<ObjectKey>,
        entries: Vec<IndexEntry>,
    ) -> Result<(), Error> {
        update::update_indexes(
            Arc::clone(&self.store),
            self.ctx.clone(),
            self.revert_on_total_failure,
            key.into(),
            entries,
        )
        .await
    }

    pub async fn update_indexes_by_name(
        &self,
        key: impl Into<ObjectKey>,
        names: &[&str],
        payloads: &[&[u8]],
    ) -> Result<(), Error> {
        if names.len() != payloads.len() {
            return Err(Error::SizeMismatch {
                indexes: names.len(),
                payloads: payloads.len(),
            });
        }
        let entries = names
            .iter()
            .zip(payloads)
            .map(|(name, payload)| IndexEntry {
                index: index_id(name.as_bytes()),
                data: payload.to_vec(),
            })
            .collect();
        self.update_indexes(key, entries).await
    }

    pub async fn find_indexes(&self, indexes: &[RawId]) -> Result<Vec<FindResultEntry>, Error> {
        find::find_indexes(self.store.as_ref(), &self.ctx, indexes).await
    }

    pub async fn find_indexes_by_name(
        &self,
        names: &[&str],
    ) -> Result<Vec<FindResultEntry>, Error> {
        let ids: Vec<RawId> = names.iter().map(|name| index_id(name.as_bytes())).collect();
        self.find_indexes(&ids).await
    }

    pub async fn list_indexes(&self, key: impl Into<ObjectKey>) -> Result<Vec<IndexEntry>, Error> {
        let record = self
            .store
            .read_latest(object_list_id(&key.into()), &self.ctx)
            .await?;
        Ok(IndexSet::decode(&record.data)?.into_entries())
    }

    pub fn update_indexes_blocking(
        &self,
        handle: &Handle,
        key: impl Into<ObjectKey>,
        entries: Vec<IndexEntry>,
    ) -> Result<(), Error> {
        let db = self.clone();
        let key = key.into();
        block_on(handle, async move { db.update_indexes(key, entries).await })
    }

    pub fn find_indexes_blocking(
        &self,
        handle: &Handle,
        indexes: Vec<RawId>,
    ) -> Result<Vec<FindResultEntry>, Error> {
        let db = self.clone();
        block_on(handle, async move { db.find_indexes(&indexes).await })
    }

    pub fn list_indexes_blocking(
        &self,
        handle: &Handle,
        key: impl Into<ObjectKey>,
    ) -> Result<Vec<IndexEntry>, Error> {
        let db = self.clone();
        let key = key.into();
        block_on(handle, async move { db.list_indexes(key).await })
    }
}

// one-shot waiter: the spawned operation sends its result exactly once and
// the caller thread blocks on the receive
fn block_on<T, F>(handle: &Handle, future: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, Error>> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    handle.spawn(async move {
        let _ = tx.send(future.await);
    });
    rx.recv()
        .map_err(|_| Error::Internal("index operation dropped before completion".to_string()))?
}
