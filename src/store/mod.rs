//! Durable, ordered registry of recorded chunks.

mod chunk;
mod store;

pub use chunk::{chunk_file_name, parse_chunk_file_name, AudioChunk, ClassificationVerdict};
pub use store::{ChunkStore, ChunkView};
