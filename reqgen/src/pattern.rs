//! Synthesis of strings matching a regular expression.
//!
//! The pattern is parsed into `regex-syntax` HIR and walked with the shared
//! random source. The result is checked against the compiled pattern before
//! it is handed out.

use regex::Regex;
use regex_syntax::hir::{Class, Hir, HirKind, Look};
use thiserror::Error;

use crate::random::Randomness;

/// Extra repetitions allowed beyond the minimum for `*`, `+` and `{n,}`.
const UNBOUNDED_REPEAT_CAP: u32 = 8;

const PRINTABLE_ASCII: (u32, u32) = (0x20, 0x7E);

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    Invalid { pattern: String, reason: String },
    #[error("Pattern '{pattern}' uses unsupported syntax: {feature}")]
    Unsupported { pattern: String, feature: String },
    #[error("Generated value '{value}' does not match pattern '{pattern}'")]
    Mismatch { pattern: String, value: String },
}

/// Generate a string that `pattern` matches.
///
/// # Errors
/// Returns `PatternError` when the pattern does not parse, uses word
/// boundaries, or the generated value fails verification.
pub fn generate_matching(pattern: &str, random: &mut Randomness) -> Result<String, PatternError> {
    let hir = regex_syntax::parse(pattern).map_err(|e| PatternError::Invalid {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })?;
    let regex = Regex::new(pattern).map_err(|e| PatternError::Invalid {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })?;

    let mut out = Vec::new();
    expand(&hir, random, &mut out).map_err(|feature| PatternError::Unsupported {
        pattern: pattern.to_owned(),
        feature,
    })?;
    let value = String::from_utf8(out).map_err(|e| PatternError::Invalid {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })?;

    if regex.is_match(&value) {
        tracing::debug!("Generated '{}' for pattern '{}'", value, pattern);
        Ok(value)
    } else {
        Err(PatternError::Mismatch {
            pattern: pattern.to_owned(),
            value,
        })
    }
}

fn expand(hir: &Hir, random: &mut Randomness, out: &mut Vec<u8>) -> Result<(), String> {
    match hir.kind() {
        HirKind::Empty => {}
        HirKind::Literal(literal) => out.extend_from_slice(&literal.0),
        HirKind::Class(Class::Unicode(class)) => {
            let ranges: Vec<(u32, u32)> = class
                .ranges()
                .iter()
                .map(|r| (u32::from(r.start()), u32::from(r.end())))
                .collect();
            let c = pick_char(&ranges, random).ok_or_else(|| "empty character class".to_owned())?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        HirKind::Class(Class::Bytes(class)) => {
            let ranges: Vec<(u32, u32)> = class
                .ranges()
                .iter()
                .map(|r| (u32::from(r.start()), u32::from(r.end())))
                .filter(|(start, _)| *start < 0x80)
                .map(|(start, end)| (start, end.min(0x7F)))
                .collect();
            let c = pick_char(&ranges, random).ok_or_else(|| "non-ASCII byte class".to_owned())?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        HirKind::Look(look) => match look {
            Look::Start
            | Look::End
            | Look::StartLF
            | Look::EndLF
            | Look::StartCRLF
            | Look::EndCRLF => {}
            _ => return Err("word boundary assertion".to_owned()),
        },
        HirKind::Repetition(rep) => {
            let max = rep.max.unwrap_or(rep.min.saturating_add(UNBOUNDED_REPEAT_CAP));
            let count = random.usize_in(
                usize::try_from(rep.min).unwrap_or(usize::MAX),
                usize::try_from(max).unwrap_or(usize::MAX),
            );
            for _ in 0..count {
                expand(&rep.sub, random, out)?;
            }
        }
        HirKind::Capture(capture) => expand(&capture.sub, random, out)?,
        HirKind::Concat(parts) => {
            for part in parts {
                expand(part, random, out)?;
            }
        }
        HirKind::Alternation(branches) => {
            let branch = random
                .choose(branches)
                .ok_or_else(|| "empty alternation".to_owned())?;
            expand(branch, random, out)?;
        }
    }
    Ok(())
}

/// Pick a char from inclusive code point ranges, preferring printable ASCII
/// when the class contains any.
fn pick_char(ranges: &[(u32, u32)], random: &mut Randomness) -> Option<char> {
    let printable: Vec<(u32, u32)> = ranges
        .iter()
        .filter_map(|&(start, end)| {
            let low = start.max(PRINTABLE_ASCII.0);
            let high = end.min(PRINTABLE_ASCII.1);
            (low <= high).then_some((low, high))
        })
        .collect();
    let pool = if printable.is_empty() { ranges } else { &printable };

    let total: u64 = pool.iter().map(|(s, e)| u64::from(e - s) + 1).sum();
    if total == 0 {
        return None;
    }
    let mut offset = u64::try_from(random.int_in(0, i64::try_from(total - 1).ok()?)).ok()?;
    for &(start, end) in pool {
        let size = u64::from(end - start) + 1;
        if offset < size {
            let code = start + u32::try_from(offset).ok()?;
            return char::from_u32(code).or_else(|| char::from_u32(start));
        }
        offset -= size;
    }
    None
}
