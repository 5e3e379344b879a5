//! Paged file store: one physical file per open table, laid out as a
//! header page followed by node/free-list pages.

mod fileid;
mod store;

pub use fileid::file_id_from_path;
pub use store::FileStore;
