use prost::Message;

use crate::{Error, RawId};

const WIRE_VERSION: u32 = 1;

// The same shape is stored on both sides of the relation: entries of an
// object-list record carry index ids, entries of an index-list record carry
// object ids. The non-default version field keeps an empty set from encoding
// to zero bytes, so "record exists, list empty" stays distinguishable from
// "no record".
#[derive(Clone, PartialEq, ::prost::Message)]
struct WireSet {
    #[prost(uint32, tag = "1")]
    version: u32,
    #[prost(message, repeated, tag = "2")]
    entries: ::prost::alloc::vec::Vec<WireEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct WireEntry {
    #[prost(bytes = "vec", tag = "1")]
    index: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: RawId,
    pub data: Vec<u8>,
}

// entries stay sorted ascending by id, no duplicates
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSet {
    pub(crate) entries: Vec<IndexEntry>,
}

impl IndexSet {
    pub fn from_unsorted(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by_key(|entry| entry.index);
        entries.dedup_by(|a, b| a.index == b.index);
        Self { entries }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: RawId) -> Option<&IndexEntry> {
        self.position(id).ok().map(|pos| &self.entries[pos])
    }

    pub(crate) fn position(&self, id: RawId) -> Result<usize, usize> {
        self.entries.binary_search_by(|entry| entry.index.cmp(&id))
    }

    pub fn encode(&self) -> Vec<u8> {
        let wire = WireSet {
            version: WIRE_VERSION,
            entries: self
                .entries
                .iter()
                .map(|entry| WireEntry {
                    index: entry.index.as_bytes().to_vec(),
                    data: entry.data.clone(),
                })
                .collect(),
        };
        wire.encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let wire = WireSet::decode(bytes)?;
        if wire.version != WIRE_VERSION {
            return Err(Error::UnsupportedVersion(wire.version));
        }
        let entries = wire
            .entries
            .into_iter()
            .map(|entry| {
                Ok(IndexEntry {
                    index: RawId::try_from(entry.index.as_slice())?,
                    data: entry.data,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { entries })
    }

    pub(crate) fn decode_or_empty(bytes: Option<&[u8]>) -> Result<Self, Error> {
        match bytes {
            Some(bytes) if !bytes.is_empty() => Self::decode(bytes),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_id;

    fn entry(name: &str, data: &[u8]) -> IndexEntry {
        IndexEntry {
            index: index_id(name.as_bytes()),
            data: data.to_vec(),
        }
    }

    #[test]
    fn from_unsorted_sorts_and_dedups() {
        let set = IndexSet::from_unsorted(vec![
            entry("c", b"3"),
            entry("a", b"1"),
            entry("b", b"2"),
            entry("a", b"other"),
        ]);
        assert_eq!(set.len(), 3);
        let ids: Vec<_> = set.entries().iter().map(|e| e.index).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(set.get(index_id(b"a")).map(|e| e.data.as_slice()), Some(b"1".as_slice()));
    }

    #[test]
    fn encoding_is_canonical() {
        let set = IndexSet::from_unsorted(vec![entry("a", b"1"), entry("b", b"2")]);
        let bytes = set.encode();
        let decoded = IndexSet::decode(&bytes).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn empty_set_encodes_to_non_empty_bytes() {
        let bytes = IndexSet::default().encode();
        assert!(!bytes.is_empty());
        assert!(IndexSet::decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn absent_record_decodes_to_empty_set() {
        assert!(IndexSet::decode_or_empty(None).unwrap().is_empty());
        assert!(IndexSet::decode_or_empty(Some(b"")).unwrap().is_empty());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let wire = WireSet {
            version: 2,
            entries: Vec::new(),
        };
        let err = IndexSet::decode(&wire.encode_to_vec()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(2)));
    }

    #[test]
    fn short_ids_are_rejected() {
        let wire = WireSet {
            version: WIRE_VERSION,
            entries: vec![WireEntry {
                index: vec![1, 2, 3],
                data: Vec::new(),
            }],
        };
        let err = IndexSet::decode(&wire.encode_to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidIdLength(3)));
    }
}
