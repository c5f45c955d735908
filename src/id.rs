use sha2::{Digest, Sha256};

use crate::Error;

// keeps object-list records from colliding with the object's own key
const OBJECT_LIST_SUFFIX: &[u8] = b"index";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RawId(pub [u8; 32]);

impl RawId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for RawId {
    fn from(raw: [u8; 32]) -> Self {
        Self(raw)
    }
}

impl TryFrom<&[u8]> for RawId {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Error> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidIdLength(bytes.len()))?;
        Ok(Self(raw))
    }
}

fn digest(parts: &[&[u8]]) -> RawId {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    RawId(hasher.finalize().into())
}

pub fn index_id(name: &[u8]) -> RawId {
    digest(&[name])
}

pub fn object_list_id(key: &ObjectKey) -> RawId {
    digest(&[key.raw_id().as_bytes(), OBJECT_LIST_SUFFIX])
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ObjectKey {
    raw: RawId,
}

impl ObjectKey {
    pub fn raw_id(&self) -> RawId {
        self.raw
    }
}

impl From<RawId> for ObjectKey {
    fn from(raw: RawId) -> Self {
        Self { raw }
    }
}

impl From<&[u8]> for ObjectKey {
    fn from(key: &[u8]) -> Self {
        Self { raw: digest(&[key]) }
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        key.as_bytes().into()
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        key.as_str().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(index_id(b"tag:red"), index_id(b"tag:red"));
        assert_ne!(index_id(b"tag:red"), index_id(b"tag:blue"));
    }

    #[test]
    fn object_list_id_differs_from_object_id() {
        let key = ObjectKey::from("obj1");
        assert_ne!(object_list_id(&key), key.raw_id());
        assert_ne!(object_list_id(&key), object_list_id(&ObjectKey::from("obj2")));
    }

    #[test]
    fn prehashed_keys_keep_their_id() {
        let raw = index_id(b"anything");
        assert_eq!(ObjectKey::from(raw).raw_id(), raw);
    }

    #[test]
    fn string_and_byte_keys_agree() {
        assert_eq!(
            ObjectKey::from("obj1").raw_id(),
            ObjectKey::from(b"obj1".as_slice()).raw_id()
        );
    }
}
