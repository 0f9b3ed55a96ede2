//! GraphRAG layer: Document/Chunk nodes over filing text, and retrieval
//! that combines vector search with multi-hop graph traversal.

pub mod chunks;
pub mod documents;
pub mod filing_text;
pub mod retrieval;

pub use chunks::{chunk_filing_sections, chunk_text, DocumentChunk};
pub use documents::create_documents_and_chunks;
pub use retrieval::{answer_question, RetrievalAnswer};
