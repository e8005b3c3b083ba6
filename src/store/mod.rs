mod notion;
mod types;

pub use notion::{NotionStore, DEFAULT_BASE_URL};
pub use types::{
    EpisodeRecord, IdPage, RecordStatus, RecordStore, StoreError, StoreErrorKind,
};
