//! Formatted context text — a pure projection of the assembled fragments.
//!
//! Each non-empty section gets a header; fragments render exactly as the
//! token estimator saw them.

use contextloom_core::chunk::RetrievedChunk;
use contextloom_core::entity::Entity;
use contextloom_core::token::Fragment;

pub const PRIMARY_HEADER: &str = "[Primary Entity]";
pub const RELATED_HEADER: &str = "[Related Entities]";
pub const RETRIEVED_HEADER: &str = "[Retrieved Context]";

pub fn format_context(primary: Option<&Entity>, related: &[Entity], chunks: &[RetrievedChunk]) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(primary) = primary {
        sections.push(format!("{PRIMARY_HEADER}\n{}", Fragment::Primary(primary).render()));
    }

    if !related.is_empty() {
        let body: String = related.iter().map(|e| Fragment::Related(e).render()).collect();
        sections.push(format!("{RELATED_HEADER}\n{body}"));
    }

    if !chunks.is_empty() {
        let body: String = chunks.iter().map(|c| Fragment::Chunk(c).render()).collect();
        sections.push(format!("{RETRIEVED_HEADER}\n{body}"));
    }

    sections.join("\n")
}
