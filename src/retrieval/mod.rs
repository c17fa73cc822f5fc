pub mod embedder;
pub mod index;
pub mod retriever;

pub use embedder::{Embedder, Embedding, OpenAiEmbedder};
pub use index::{load_examples, EmbeddingIndex, QueryExample, SearchHit, SimilarityIndex};
pub use retriever::QueryExampleRetriever;
