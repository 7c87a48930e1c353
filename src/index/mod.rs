//! Derived index: sqlite store, vault walker, and reindexer

mod database;
mod reindex;

pub use database::{
    Database, DateEntry, DateKind, IndexStats, IndexedFile, ObjectRow, RefRow, SearchHit, TraitRow,
};
pub use reindex::{reindex, reindex_paths, walk_vault, ReindexMode, ReindexReport, WalkedFile};
