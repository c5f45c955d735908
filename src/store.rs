use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use crate::{Error, RawId};

#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub groups: Vec<u32>,
    pub flags: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: RawId,
    pub data: Vec<u8>,
}

pub trait Store {
    /// Read-transform-write, atomic against other writers of the same id;
    /// an unchanged transform result skips the write.
    fn cas_write(
        &self,
        id: RawId,
        transform: impl FnMut(Option<&[u8]>) -> Result<Vec<u8>, Error> + Send,
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// One batch round trip; ids without a record are omitted, an entirely
    /// empty batch is [`Error::NotFound`].
    fn bulk_read(
        &self,
        ids: &[RawId],
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<Vec<Record>, Error>> + Send;

    fn read_latest(
        &self,
        id: RawId,
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<Record, Error>> + Send;
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RawId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    async fn cas_write(
        &self,
        id: RawId,
        mut transform: impl FnMut(Option<&[u8]>) -> Result<Vec<u8>, Error> + Send,
        _ctx: &SessionContext,
    ) -> Result<(), Error> {
        loop {
            let current = self.records.lock().unwrap().get(&id).cloned();
            let next = transform(current.as_deref())?;
            let unchanged = match &current {
                Some(bytes) => bytes.as_slice() == next.as_slice(),
                None => next.is_empty(),
            };
            let mut records = self.records.lock().unwrap();
            if records.get(&id).map(|bytes| bytes.as_slice()) == current.as_deref() {
                if !unchanged {
                    records.insert(id, next);
                }
                return Ok(());
            }
            // lost the race, re-read and retry
        }
    }

    async fn bulk_read(&self, ids: &[RawId], _ctx: &SessionContext) -> Result<Vec<Record>, Error> {
        let records = self.records.lock().unwrap();
        let found: Vec<Record> = ids
            .iter()
            .filter_map(|id| {
                records.get(id).map(|data| Record {
                    id: *id,
                    data: data.clone(),
                })
            })
            .collect();
        if found.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(found)
    }

    async fn read_latest(&self, id: RawId, _ctx: &SessionContext) -> Result<Record, Error> {
        let data = self
            .records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound)?;
        Ok(Record { id, data })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::index_id;

    fn ctx() -> SessionContext {
        SessionContext::default()
    }

    #[tokio::test]
    async fn cas_creates_and_replaces() {
        let store = MemoryStore::new();
        let id = index_id(b"counter");

        store
            .cas_write(
                id,
                |current| {
                    assert!(current.is_none());
                    Ok(b"1".to_vec())
                },
                &ctx(),
            )
            .await
            .unwrap();

        store
            .cas_write(
                id,
                |current| {
                    assert_eq!(current, Some(b"1".as_slice()));
                    Ok(b"2".to_vec())
                },
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(store.read_latest(id, &ctx()).await.unwrap().data, b"2");
    }

    #[tokio::test]
    async fn unchanged_transform_skips_the_write() {
        let store = MemoryStore::new();
        let id = index_id(b"noop");

        // absent record, empty result: still absent afterwards
        store
            .cas_write(id, |_| Ok(Vec::new()), &ctx())
            .await
            .unwrap();
        assert!(matches!(
            store.read_latest(id, &ctx()).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn transform_errors_abort() {
        let store = MemoryStore::new();
        let id = index_id(b"bad");
        let err = store
            .cas_write(id, |_| Err(Error::Internal("boom".into())), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn contended_cas_loses_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let id = index_id(b"contended");

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        store
                            .cas_write(
                                id,
                                |current| {
                                    let n: u64 = current
                                        .map(|bytes| {
                                            String::from_utf8_lossy(bytes).parse().unwrap()
                                        })
                                        .unwrap_or(0);
                                    Ok((n + 1).to_string().into_bytes())
                                },
                                &SessionContext::default(),
                            )
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let record = store.read_latest(id, &ctx()).await.unwrap();
        assert_eq!(String::from_utf8(record.data).unwrap(), "200");
    }

    #[tokio::test]
    async fn bulk_read_omits_missing_records() {
        let store = MemoryStore::new();
        let a = index_id(b"a");
        let b = index_id(b"b");
        store.cas_write(a, |_| Ok(b"va".to_vec()), &ctx()).await.unwrap();

        let records = store.bulk_read(&[a, b], &ctx()).await.unwrap();
        assert_eq!(records, vec![Record { id: a, data: b"va".to_vec() }]);

        assert!(matches!(
            store.bulk_read(&[b], &ctx()).await,
            Err(Error::NotFound)
        ));
    }
}
