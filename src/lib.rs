mod db;
mod error;
mod find;
mod id;
mod set;
mod store;
#[cfg(feature = "tikv")]
mod tikv;
mod update;

pub use db::DB;
pub use error::Error;
pub use find::FindResultEntry;
pub use id::{index_id, object_list_id, ObjectKey, RawId};
pub use set::{IndexEntry, IndexSet};
pub use store::{MemoryStore, Record, SessionContext, Store};
#[cfg(feature = "tikv")]
pub use tikv::TikvStore;
