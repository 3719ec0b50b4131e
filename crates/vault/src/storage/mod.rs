//! Row-store schema and ingest writer

mod schema;
mod writer;

pub use schema::{enable_search_index, open_row_store, open_row_store_in_memory, search_index_exists};
pub use writer::{NewAttachment, NewConversation, NewMessage, RawBody, StoreWriter};
