pub mod engine;

pub use engine::{
    FileSummary, IndexStatus, MAX_SNIPPET_LINES, NextAction, NodeExplanation, QueryEngine, SearchHit,
    SimilarFile, Snippet, TableDescription,
};
