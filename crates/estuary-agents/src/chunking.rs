//! Boundary-priority text splitting with exact token accounting.
//!
//! Splitting tries coarse separators first (paragraph break, line break,
//! sentence terminators, space) and only falls back to the next-finer one
//! when a segment still exceeds the chunk size. Separators stay attached to
//! the preceding segment, so concatenating all segments reproduces the
//! input byte for byte.

use anyhow::Result;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Boundary priority, coarsest first; raw characters are the implicit
/// final fallback.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ".", "!", "?", " "];

fn tokenizer() -> Result<&'static CoreBPE> {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    if let Some(bpe) = BPE.get() {
        return Ok(bpe);
    }
    let bpe = tiktoken_rs::cl100k_base().map_err(|e| anyhow::anyhow!("Tokenizer error: {}", e))?;
    Ok(BPE.get_or_init(|| bpe))
}

/// Exact token count under the cl100k_base encoding
pub fn count_tokens(text: &str) -> Result<usize> {
    Ok(tokenizer()?.encode_ordinary(text).len())
}

/// Split `text` on `separator`, keeping the separator attached to the
/// preceding piece.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(separator) {
        let end = pos + separator.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Last-resort split of a separator-free run. Character counts carry no
/// token guarantee (a multi-byte character can encode to several tokens),
/// so every group is measured and halved until it fits the budget.
fn split_characters(text: &str, chunk_size: usize, bpe: &CoreBPE) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    for group in chars.chunks(chunk_size.max(1)) {
        push_within_budget(group.iter().collect(), chunk_size, bpe, &mut pieces);
    }
    pieces
}

fn push_within_budget(piece: String, chunk_size: usize, bpe: &CoreBPE, out: &mut Vec<String>) {
    let chars: Vec<char> = piece.chars().collect();
    // A single character is the splitting floor, whatever it encodes to
    if chars.len() <= 1 || bpe.encode_ordinary(&piece).len() <= chunk_size {
        out.push(piece);
        return;
    }
    let (left, right) = chars.split_at(chars.len() / 2);
    push_within_budget(left.iter().collect(), chunk_size, bpe, out);
    push_within_budget(right.iter().collect(), chunk_size, bpe, out);
}

/// Recursively break `text` into units no longer than `chunk_size` tokens,
/// preferring the coarsest boundary that works.
fn split_units(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    bpe: &CoreBPE,
) -> Vec<String> {
    let Some((separator, finer)) = separators.split_first() else {
        return split_characters(text, chunk_size, bpe);
    };

    let pieces = if text.contains(separator) {
        split_keeping_separator(text, separator)
    } else {
        vec![text.to_string()]
    };

    let mut units = Vec::new();
    for piece in pieces {
        if bpe.encode_ordinary(&piece).len() > chunk_size {
            units.extend(split_units(&piece, finer, chunk_size, bpe));
        } else {
            units.push(piece);
        }
    }
    units
}

/// Split text into chunks of at most `chunk_size` tokens, duplicating the
/// trailing `chunk_overlap` tokens of each chunk as the head of the next.
///
/// Overlap is carried in whole boundary units, so it never splits a word
/// or sentence mid-token. A single indivisible unit longer than the chunk
/// size is emitted intact rather than corrupted.
pub fn create_chunks(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let bpe = tokenizer()?;
    let units = split_units(text, &SEPARATORS, chunk_size, bpe);

    let sized: Vec<(String, usize)> = units
        .into_iter()
        .map(|unit| {
            let tokens = bpe.encode_ordinary(&unit).len();
            (unit, tokens)
        })
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<(String, usize)> = Vec::new();
    let mut current_tokens = 0usize;

    for (unit, tokens) in sized {
        if current_tokens + tokens > chunk_size && !current.is_empty() {
            chunks.push(current.iter().map(|(u, _)| u.as_str()).collect());

            // Keep trailing whole units up to the overlap budget
            let mut kept: Vec<(String, usize)> = Vec::new();
            let mut kept_tokens = 0usize;
            for (unit, tokens) in current.into_iter().rev() {
                if kept_tokens + tokens > chunk_overlap {
                    break;
                }
                kept_tokens += tokens;
                kept.push((unit, tokens));
            }
            kept.reverse();
            current = kept;
            current_tokens = kept_tokens;
        }

        current_tokens += tokens;
        current.push((unit, tokens));
    }

    if !current.is_empty() {
        chunks.push(current.iter().map(|(u, _)| u.as_str()).collect());
    }

    Ok(chunks)
}
