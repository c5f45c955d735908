use tikv_client::RawClient;

use crate::{
    store::{Record, SessionContext, Store},
    Error, RawId,
};

// raw-mode client; must stay in atomic mode for compare_and_swap
#[derive(Clone)]
pub struct TikvStore {
    client: RawClient,
}

impl TikvStore {
    pub async fn connect(pd_endpoints: Vec<String>) -> Result<Self, Error> {
        let client = RawClient::new(pd_endpoints)
            .await
            .map_err(Error::Tikv)?
            .with_atomic_for_cas();
        Ok(Self { client })
    }
}

impl Store for TikvStore {
    async fn cas_write(
        &self,
        id: RawId,
        mut transform: impl FnMut(Option<&[u8]>) -> Result<Vec<u8>, Error> + Send,
        _ctx: &SessionContext,
    ) -> Result<(), Error> {
        loop {
            let current = self
                .client
                .get(id.as_bytes().to_vec())
                .await
                .map_err(Error::Tikv)?;
            let next = transform(current.as_deref())?;
            let unchanged = match &current {
                Some(bytes) => bytes.as_slice() == next.as_slice(),
                None => next.is_empty(),
            };
            if unchanged {
                return Ok(());
            }
            let (_, swapped) = self
                .client
                .compare_and_swap(id.as_bytes().to_vec(), current, next)
                .await
                .map_err(Error::Tikv)?;
            if swapped {
                return Ok(());
            }
            // another writer got in between, re-read and retry
        }
    }

    async fn bulk_read(&self, ids: &[RawId], _ctx: &SessionContext) -> Result<Vec<Record>, Error> {
        let keys: Vec<Vec<u8>> = ids.iter().map(|id| id.as_bytes().to_vec()).collect();
        let pairs = self.client.batch_get(keys).await.map_err(Error::Tikv)?;
        if pairs.is_empty() {
            return Err(Error::NotFound);
        }
        pairs
            .into_iter()
            .map(|pair| {
                let key: Vec<u8> = pair.key().clone().into();
                Ok(Record {
                    id: RawId::try_from(key.as_slice())?,
                    data: pair.value().clone(),
                })
            })
            .collect()
    }

    async fn read_latest(&self, id: RawId, _ctx: &SessionContext) -> Result<Record, Error> {
        let data = self
            .client
            .get(id.as_bytes().to_vec())
            .await
            .map_err(Error::Tikv)?
            .ok_or(Error::NotFound)?;
        Ok(Record { id, data })
    }
}
