//! Markdown, frontmatter, typedecl, trait, and reference parsing

mod document;
mod frontmatter;
mod markdown;
mod refs;
mod traits;
mod type_decl;

pub use document::{
    file_id_for_path, parse_document, ParseOptions, ParsedDocument, ParsedObject, ParsedRef,
    ParsedTrait, TraitSource,
};
pub use markdown::{find_heading_scope, Heading, MarkdownStructure};
pub use refs::{is_embedded_ref, short_name, split_embedded_ref};
pub use type_decl::parse_value;
