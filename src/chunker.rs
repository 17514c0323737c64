//! Markdown section chunker.
//!
//! Splits a note's markdown body into retrieval-sized chunks that respect
//! header boundaries. Each chunk carries the header path of its enclosing
//! section so downstream consumers can label results and the embedding text
//! can be prefixed with structural context.
//!
//! # Algorithm
//!
//! 1. Parse the markdown into sections: a header line (`#`..`######`) plus
//!    the body until the next header of any level. Text before the first
//!    header is an implicit level-0 section with no title.
//! 2. Compute each section's path by walking backwards over headers of
//!    strictly lower level, then appending the section's own title.
//! 3. Sections over `target_max_tokens` are split on paragraph boundaries
//!    with an accumulate-and-flush rule; pieces still over 1.5× the ceiling
//!    are re-split on sentence boundaries the same way.
//! 4. A single left-to-right merge pass folds undersized pieces into their
//!    successor. Merging across section boundaries is allowed only for very
//!    tiny fragments, and a merged piece is never re-examined.
//! 5. Each final chunk gets a synthesized embedding header
//!    (`Title: … | Section: … | Course: …`) and a 0-based index.
//!
//! The chunker is pure and never fails for well-formed UTF-8: non-empty
//! input always yields at least one chunk, and only empty or whitespace-only
//! input yields none.

use crate::models::ChunkDraft;
use crate::token::TokenEstimator;

/// Fragments under this many tokens may merge across section boundaries.
const TINY_FRAGMENT_TOKENS: usize = 40;

/// Pieces this far over the ceiling fall back to sentence splitting.
const OVERSIZE_SPLIT_FACTOR: f64 = 1.5;

/// Merged pieces may exceed the ceiling by at most this factor.
const MERGE_CAP_FACTOR: f64 = 1.2;

/// Size heuristics for chunk construction.
#[derive(Debug, Clone)]
pub struct ChunkerOptions {
    /// Below this, a piece becomes a merge candidate.
    pub min_tokens: usize,
    /// Inputs smaller than this are emitted as a single unsplit chunk.
    pub target_min_tokens: usize,
    /// Soft ceiling before a section is force-split.
    pub target_max_tokens: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            min_tokens: 80,
            target_min_tokens: 250,
            target_max_tokens: 350,
        }
    }
}

struct Section {
    /// 1-6 for real headers, 0 for the implicit preamble section.
    level: u8,
    title: String,
    body: String,
}

#[derive(Clone)]
struct Piece {
    content: String,
    path: Vec<String>,
}

/// Chunk a note's markdown content into ordered [`ChunkDraft`]s.
///
/// Returns an empty list only for empty or whitespace-only content.
pub fn chunk_note(
    note_title: &str,
    content: &str,
    course_tag: Option<&str>,
    opts: &ChunkerOptions,
    tokens: &TokenEstimator,
) -> Vec<ChunkDraft> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let sections = parse_sections(content);

    // Sections with empty bodies are dropped entirely.
    let mut sectioned: Vec<(String, Vec<String>)> = Vec::new();
    for (idx, section) in sections.iter().enumerate() {
        let body = section.body.trim();
        if body.is_empty() {
            continue;
        }
        sectioned.push((body.to_string(), section_path(&sections, idx)));
    }
    if sectioned.is_empty() {
        return Vec::new();
    }

    // A note smaller than the target minimum is one unsplit chunk carrying
    // the path of the first section that contributed body text.
    let pieces: Vec<Piece> = if tokens.count(content) < opts.target_min_tokens {
        let path = sectioned[0].1.clone();
        let body = sectioned
            .iter()
            .map(|(body, _)| body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        vec![Piece {
            content: body,
            path,
        }]
    } else {
        let mut pieces = Vec::new();
        for (body, path) in &sectioned {
            if tokens.count(body) > opts.target_max_tokens {
                for content in split_section(body, opts, tokens) {
                    pieces.push(Piece {
                        content,
                        path: path.clone(),
                    });
                }
            } else {
                pieces.push(Piece {
                    content: body.clone(),
                    path: path.clone(),
                });
            }
        }
        merge_pass(pieces, opts, tokens)
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| ChunkDraft {
            content_embed: synthesize_embed(note_title, &piece.path, course_tag, &piece.content),
            section_path: piece.path,
            content_raw: piece.content,
            chunk_index: i as i64,
        })
        .collect()
}

/// Parse an ATX header line into `(level, title)`.
fn parse_header(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((hashes as u8, rest.trim().to_string()))
}

fn parse_sections(content: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        level: 0,
        title: String::new(),
        body: String::new(),
    }];

    for line in content.lines() {
        if let Some((level, title)) = parse_header(line) {
            sections.push(Section {
                level,
                title,
                body: String::new(),
            });
        } else {
            let last = sections.len() - 1;
            sections[last].body.push_str(line);
            sections[last].body.push('\n');
        }
    }

    sections
}

/// Header titles enclosing `sections[idx]`, outermost first, ending with the
/// section's own title. Untitled sections contribute nothing to the path.
fn section_path(sections: &[Section], idx: usize) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    let mut ceiling = sections[idx].level;

    for section in sections[..idx].iter().rev() {
        if ceiling <= 1 {
            break;
        }
        if section.level > 0 && section.level < ceiling && !section.title.is_empty() {
            path.push(section.title.clone());
            ceiling = section.level;
        }
    }
    path.reverse();

    if !sections[idx].title.is_empty() {
        path.push(sections[idx].title.clone());
    }
    path
}

/// Split an oversized section body on paragraph boundaries, falling back to
/// sentence boundaries for pieces still far over the ceiling.
fn split_section(body: &str, opts: &ChunkerOptions, tokens: &TokenEstimator) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in body.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if !buf.is_empty() && tokens.count(&buf) + tokens.count(para) > opts.target_max_tokens {
            pieces.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    let sentence_limit = (opts.target_max_tokens as f64 * OVERSIZE_SPLIT_FACTOR) as usize;
    let mut out = Vec::new();
    for piece in pieces {
        if tokens.count(&piece) > sentence_limit {
            out.extend(split_by_sentences(&piece, opts, tokens));
        } else {
            out.push(piece);
        }
    }
    out
}

fn split_by_sentences(text: &str, opts: &ChunkerOptions, tokens: &TokenEstimator) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for sentence in text.split_inclusive(". ") {
        if !buf.is_empty() && tokens.count(&buf) + tokens.count(sentence) > opts.target_max_tokens {
            pieces.push(std::mem::take(&mut buf).trim_end().to_string());
        }
        buf.push_str(sentence);
    }
    if !buf.is_empty() {
        pieces.push(buf.trim_end().to_string());
    }
    pieces
}

/// Single left-to-right merge pass over the flat piece list.
///
/// An undersized piece merges with its successor when they share a section
/// path (or when the piece itself is tiny enough to cross sections) and
/// the combined size stays under the cap. A merged piece keeps the first
/// piece's path and is not re-evaluated.
fn merge_pass(pieces: Vec<Piece>, opts: &ChunkerOptions, tokens: &TokenEstimator) -> Vec<Piece> {
    let merge_cap = (opts.target_max_tokens as f64 * MERGE_CAP_FACTOR) as usize;
    let mut out = Vec::with_capacity(pieces.len());
    let mut i = 0;

    while i < pieces.len() {
        let piece = &pieces[i];
        let count = tokens.count(&piece.content);
        if count < opts.min_tokens && i + 1 < pieces.len() {
            let next = &pieces[i + 1];
            let compatible = piece.path == next.path || count < TINY_FRAGMENT_TOKENS;
            let combined = count + tokens.count(&next.content);
            if compatible && combined <= merge_cap {
                out.push(Piece {
                    content: format!("{}\n\n{}", piece.content, next.content),
                    path: piece.path.clone(),
                });
                i += 2;
                continue;
            }
        }
        out.push(piece.clone());
        i += 1;
    }
    out
}

/// Contextual header prepended to the text sent to the embedding model.
/// Never shown to end users as chunk content.
fn synthesize_embed(
    note_title: &str,
    path: &[String],
    course_tag: Option<&str>,
    content: &str,
) -> String {
    let section = if path.is_empty() {
        "Main".to_string()
    } else {
        path.join(" > ")
    };
    match course_tag {
        Some(tag) => format!("Title: {note_title} | Section: {section} | Course: {tag}\n\n{content}"),
        None => format!("Title: {note_title} | Section: {section}\n\n{content}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ChunkerOptions {
        ChunkerOptions::default()
    }

    fn est() -> TokenEstimator {
        TokenEstimator::default()
    }

    /// Roughly `n` tokens of filler prose (5 chars per word, 4 chars/token).
    fn prose(n_tokens: usize) -> String {
        "word ".repeat(n_tokens * 4 / 5 + 1).trim_end().to_string()
    }

    /// Roughly `n` tokens of sentence-delimited prose for sentence splitting.
    fn sentences(n_tokens: usize) -> String {
        let sentence = "This is one filler sentence about studying. ";
        let per = est().count(sentence);
        sentence.repeat(n_tokens / per + 1).trim_end().to_string()
    }

    fn chunk(content: &str) -> Vec<ChunkDraft> {
        chunk_note("Test Note", content, None, &opts(), &est())
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk("").is_empty());
        assert!(chunk("   \n\n  \t ").is_empty());
    }

    #[test]
    fn test_plain_text_single_chunk() {
        let chunks = chunk("Just a short line.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_raw, "Just a short line.");
        assert!(chunks[0].section_path.is_empty());
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_tiny_note_emitted_unsplit() {
        let chunks = chunk("# Groceries\n\nMilk.\n\nEggs.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_raw, "Milk.\n\nEggs.");
        assert_eq!(chunks[0].section_path, vec!["Groceries".to_string()]);
    }

    #[test]
    fn test_preamble_has_empty_path() {
        let content = format!("{}\n\n# A\n\n{}", prose(260), prose(260));
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].section_path.is_empty());
        assert_eq!(chunks[1].section_path, vec!["A".to_string()]);
    }

    #[test]
    fn test_section_paths_follow_nesting() {
        let content = format!(
            "# Top\n\n{}\n\n## Sub\n\n{}\n\n### Leaf\n\n{}\n\n## Sub2\n\n{}",
            prose(250),
            prose(250),
            prose(250),
            prose(250)
        );
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].section_path, vec!["Top"]);
        assert_eq!(chunks[1].section_path, vec!["Top", "Sub"]);
        assert_eq!(chunks[2].section_path, vec!["Top", "Sub", "Leaf"]);
        assert_eq!(chunks[3].section_path, vec!["Top", "Sub2"]);
    }

    #[test]
    fn test_section_path_skips_missing_levels() {
        let content = format!("# A\n\n{}\n\n### Deep\n\n{}", prose(250), prose(250));
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].section_path, vec!["A", "Deep"]);
    }

    #[test]
    fn test_empty_sections_dropped() {
        let content = format!("# A\n\n# B\n\n{}\n\n# C", prose(260));
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_path, vec!["B"]);
    }

    #[test]
    fn test_oversized_section_splits_on_paragraphs() {
        let content = format!(
            "# Long\n\n{}\n\n{}\n\n{}",
            prose(200),
            prose(200),
            prose(200)
        );
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 3);
        let tokens = est();
        for c in &chunks {
            assert!(tokens.count(&c.content_raw) <= opts().target_max_tokens);
            assert_eq!(c.section_path, vec!["Long"]);
        }
    }

    #[test]
    fn test_huge_paragraph_splits_on_sentences() {
        // ~900 tokens, single paragraph, no headers.
        let chunks = chunk(&sentences(900));
        assert!(
            (2..=4).contains(&chunks.len()),
            "expected 2-4 chunks, got {}",
            chunks.len()
        );
        let tokens = est();
        let hard_cap = (opts().target_max_tokens as f64 * 1.5) as usize;
        for c in &chunks {
            assert!(tokens.count(&c.content_raw) <= hard_cap);
            assert!(c.section_path.is_empty());
        }
    }

    #[test]
    fn test_tiny_intro_merges_into_body() {
        // "Intro" is tiny, merges forward across the section boundary;
        // "End" is last and stays alone.
        let content = format!(
            "## Intro\n\nShort line.\n\n## Body\n\n{}\n\n## End\n\nTiny closer.",
            prose(300)
        );
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content_raw.starts_with("Short line."));
        assert_eq!(chunks[0].section_path, vec!["Intro"]);
        assert_eq!(chunks[1].content_raw, "Tiny closer.");
        assert_eq!(chunks[1].section_path, vec!["End"]);
    }

    #[test]
    fn test_small_leading_piece_merges_within_section() {
        let content = format!("# S\n\n{}\n\n{}", prose(30), prose(340));
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_path, vec!["S"]);
    }

    #[test]
    fn test_merge_respects_combined_cap() {
        // 70 + 380 tokens exceeds target_max * 1.2, so no merge.
        let content = format!("# S\n\n{}\n\n{}", prose(70), prose(380));
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_cross_section_merge_requires_tiny_fragment() {
        // 60 tokens is under min_tokens but not under the tiny threshold,
        // so it cannot merge across a section boundary.
        let stay = format!("# A\n\n{}\n\n# B\n\n{}", prose(60), prose(300));
        assert_eq!(chunk(&stay).len(), 2);

        // 20 tokens is tiny enough to cross; merged piece keeps A's path.
        let merged = format!("# A\n\n{}\n\n# B\n\n{}", prose(20), prose(300));
        let chunks = chunk(&merged);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_path, vec!["A"]);
    }

    #[test]
    fn test_merge_is_single_pass() {
        // A+B merge into a 40-token piece that is still under min_tokens,
        // but a merged piece is never reconsidered; C then merges with D.
        let content = format!(
            "# A\n\n{}\n\n# B\n\n{}\n\n# C\n\n{}\n\n# D\n\n{}",
            prose(20),
            prose(20),
            prose(20),
            prose(250)
        );
        let chunks = chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_path, vec!["A"]);
        assert_eq!(chunks[1].section_path, vec!["C"]);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let content = format!(
            "# A\n\n{}\n\n# B\n\n{}\n\n# C\n\n{}",
            prose(300),
            prose(300),
            prose(300)
        );
        let chunks = chunk(&content);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.content_raw.is_empty());
        }
    }

    #[test]
    fn test_round_trip_preserves_body_text() {
        let content = format!(
            "{}\n\n# Top\n\n{}\n\n## Sub\n\n{}",
            prose(120),
            prose(400),
            prose(300)
        );
        let chunks = chunk(&content);

        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        let reassembled: String = chunks.iter().map(|c| strip(&c.content_raw)).collect();
        let expected: String = content
            .lines()
            .filter(|line| parse_header(line).is_none())
            .map(strip)
            .collect();
        assert_eq!(reassembled, expected);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let content = format!(
            "# A\n\n{}\n\n## B\n\n{}\n\n{}",
            prose(50),
            prose(500),
            sentences(600)
        );
        let first = chunk(&content);
        let second = chunk(&content);
        assert_eq!(first, second);
    }

    #[test]
    fn test_content_embed_header_format() {
        let chunks = chunk_note(
            "Week 3",
            "# Derivatives\n\nThe derivative measures change.",
            Some("MATH101"),
            &opts(),
            &est(),
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].content_embed,
            format!(
                "Title: Week 3 | Section: Derivatives | Course: MATH101\n\n{}",
                chunks[0].content_raw
            )
        );
    }

    #[test]
    fn test_content_embed_defaults_to_main_section() {
        let chunks = chunk_note("Scratch", "No headers here.", None, &opts(), &est());
        assert!(chunks[0]
            .content_embed
            .starts_with("Title: Scratch | Section: Main\n\n"));
        assert!(!chunks[0].content_embed.contains("Course:"));
    }
}
