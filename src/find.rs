use crate::{
    set::IndexSet,
    store::{SessionContext, Store},
    Error, RawId,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FindResultEntry {
    pub id: RawId,
    pub indexes: Vec<(RawId, Vec<u8>)>,
}

pub(crate) async fn find_indexes<S: Store>(
    store: &S,
    ctx: &SessionContext,
    indexes: &[RawId],
) -> Result<Vec<FindResultEntry>, Error> {
    if indexes.is_empty() {
        return Ok(Vec::new());
    }

    let records = match store.bulk_read(indexes, ctx).await {
        Ok(records) => records,
        // none of the indexes has a record
        Err(Error::NotFound) => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    if records.len() != indexes.len() {
        // at least one index has no entries, the intersection is empty
        return Ok(Vec::new());
    }

    let mut records = records.into_iter();
    let Some(first) = records.next() else {
        return Ok(Vec::new());
    };
    let set = IndexSet::decode(&first.data)?;
    let mut result: Vec<FindResultEntry> = set
        .entries()
        .iter()
        .map(|entry| FindResultEntry {
            id: entry.index,
            indexes: vec![(first.id, entry.data.clone())],
        })
        .collect();

    for record in records {
        if result.is_empty() {
            break;
        }
        let set = IndexSet::decode(&record.data)?;
        result = intersect(result, &set, record.id);
    }

    Ok(result)
}

// ordered merge on object id, payload-ignoring; survivors pick up the
// record's payload
fn intersect(result: Vec<FindResultEntry>, set: &IndexSet, index: RawId) -> Vec<FindResultEntry> {
    let mut out = Vec::with_capacity(result.len().min(set.len()));
    let mut entries = set.entries().iter().peekable();
    for mut item in result {
        while let Some(entry) = entries.peek() {
            if entry.index < item.id {
                entries.next();
            } else {
                break;
            }
        }
        if let Some(entry) = entries.peek() {
            if entry.index == item.id {
                item.indexes.push((index, entry.data.clone()));
                out.push(item);
                entries.next();
            }
        }
    }
    out
}
