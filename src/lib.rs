//! Raven - a personal knowledge system over plain markdown files
//!
//! The authoritative state is a vault of markdown files; everything
//! else is a disposable index. The crate is organised around four
//! subsystems: the parser (`parser`), schema validation (`schema`),
//! the derived index (`index`), and the query engine (`query`), with
//! the mutation layer (`mutate`) and typed API surface (`api`) on top.

pub mod api;
pub mod cancel;
pub mod config;
pub mod dates;
pub mod error;
pub mod index;
pub mod mutate;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod slug;
pub mod vault;
