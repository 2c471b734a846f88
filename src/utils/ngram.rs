use std::ops::RangeInclusive;

/// A 1 or 2 character gram packed into a u64.
///
/// Bigram `ab` is `(a << 21) | b`; unigram `a` is `(a << 21) | UNIGRAM_TAIL`.
/// Every gram starting with the same char therefore lives in one contiguous
/// key range, which is what prefix lookups scan.
pub type Gram = u64;

const CHAR_BITS: u32 = 21;

/// Above every Unicode scalar value, so it never collides with a bigram tail.
const UNIGRAM_TAIL: u64 = (1 << CHAR_BITS) - 1;

/// Fold a char to lowercase when the mapping is one-to-one.
///
/// Multi-char lowercase expansions keep the original char so that folded
/// text has exactly as many chars as the source, which keeps line and
/// column positions valid across folding.
#[inline]
pub fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Fold a whole string char by char
pub fn fold_text(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

#[inline]
pub fn unigram(c: char) -> Gram {
    ((c as u64) << CHAR_BITS) | UNIGRAM_TAIL
}

#[inline]
pub fn bigram(a: char, b: char) -> Gram {
    ((a as u64) << CHAR_BITS) | (b as u64)
}

/// Key range holding every gram whose first char is `c`
pub fn prefix_range(c: char) -> RangeInclusive<Gram> {
    let base = (c as u64) << CHAR_BITS;
    base..=(base | UNIGRAM_TAIL)
}

/// Extract the unique unigrams and bigrams of a text, case-folded.
///
/// The result is sorted and deduplicated.
pub fn extract_grams(text: &str) -> Vec<Gram> {
    let mut grams = Vec::with_capacity(text.len().min(1 << 16) * 2);
    let mut prev: Option<char> = None;

    for c in text.chars().map(fold_char) {
        grams.push(unigram(c));
        if let Some(p) = prev {
            grams.push(bigram(p, c));
        }
        prev = Some(c);
    }

    grams.sort_unstable();
    grams.dedup();
    grams
}

/// Bigrams of a (folded) query string, used for phrase lookups
pub fn query_grams(query: &str) -> Vec<Gram> {
    let chars: Vec<char> = query.chars().map(fold_char).collect();
    let mut grams: Vec<Gram> = chars.windows(2).map(|w| bigram(w[0], w[1])).collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}

/// Check if content is likely binary
pub fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(8192);
    let sample = &content[..sample_size];

    if memchr::memchr(0, sample).is_some() {
        return true;
    }

    let non_text_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0c)
        .count();

    non_text_count > sample_size / 8
}
