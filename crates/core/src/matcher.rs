//! Sidecar-to-asset correlation on normalized filename stems.

/// Minimum similarity for a candidate to count as a match (inclusive).
pub const MATCH_THRESHOLD: f64 = 0.70;

/// Keeps ASCII letters and digits, lowercased.
pub fn normalize_stem(stem: &str) -> String {
    stem.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Longest-matching-block ratio `2*M / (len(a) + len(b))`.
///
/// `M` is the total length of the matching blocks found by taking the longest
/// common substring, then recursing on the unmatched text to its left and
/// right. Among equally long substrings the one starting earliest in `a`
/// (then in `b`) wins. Two empty strings score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matched_len(a, b);
    2.0 * matched as f64 / total as f64
}

fn matched_len(a: &[u8], b: &[u8]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, alo, ahi, b, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
fn longest_match(
    a: &[u8],
    alo: usize,
    ahi: usize,
    b: &[u8],
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // prev[k + 1] is the length of the common run ending at a[i-1], b[blo+k].
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];
    for i in alo..ahi {
        for k in 0..width {
            if a[i] == b[blo + k] {
                let size = prev[k] + 1;
                curr[k + 1] = size;
                if size > best_size {
                    best_size = size;
                    best_i = i + 1 - size;
                    best_j = blo + k + 1 - size;
                }
            } else {
                curr[k + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (best_i, best_j, best_size)
}

pub fn is_acceptable(score: f64) -> bool {
    score >= MATCH_THRESHOLD
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// Caller-supplied index of the winning candidate.
    pub index: usize,
    pub score: f64,
}

/// Picks the highest-scoring candidate stem for `sidecar_stem`.
///
/// Candidates are `(index, stem)` pairs scanned in the given order; a later
/// candidate only replaces the current best on a strictly greater score, so
/// ties go to the earliest. Returns `None` unless the best score reaches
/// [`MATCH_THRESHOLD`].
pub fn best_match<'a, I>(sidecar_stem: &str, candidates: I) -> Option<Scored>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let wanted = normalize_stem(sidecar_stem);
    let mut best: Option<Scored> = None;
    let mut highest = 0.0;

    for (index, stem) in candidates {
        let score = similarity(&wanted, &normalize_stem(stem));
        tracing::trace!(candidate = stem, score, "scored candidate");
        if score > highest {
            highest = score;
            best = Some(Scored { index, score });
        }
    }

    best.filter(|b| is_acceptable(b.score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed<'a>(stems: &'a [&'a str]) -> impl Iterator<Item = (usize, &'a str)> {
        stems.iter().copied().enumerate()
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_stem("vacation-edit(1)"), "vacationedit1");
        assert_eq!(normalize_stem("vacation_edit1"), "vacationedit1");
        assert_eq!(normalize_stem("IMG_0001"), "img0001");
        assert_eq!(normalize_stem("Ünïcode café"), "ncodecaf");
        assert_eq!(normalize_stem("--__--"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["IMG_0001 (2)", "a.b.c", "Already1", "", "ß-x-Y"] {
            let once = normalize_stem(s);
            assert_eq!(normalize_stem(&once), once);
        }
        assert_eq!(normalize_stem("Photo 12"), normalize_stem("photo-12!"));
    }

    #[test]
    fn similarity_of_identical_strings_is_one() {
        assert_eq!(similarity("img0001", "img0001"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn similarity_is_bounded() {
        let samples = ["", "a", "abc", "img0001", "vacationedit1", "zzzz", "abab"];
        for a in samples {
            for b in samples {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "{a} vs {b} gave {s}");
            }
        }
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn similarity_sums_blocks_on_both_sides() {
        // "abxcd" vs "abycd": blocks "ab" and "cd" → M = 4.
        assert_eq!(similarity("abxcd", "abycd"), 0.8);
        // "img0001jpg" vs "img0001": M = 7 over 17 chars.
        let s = similarity("img0001jpg", "img0001");
        assert!((s - 14.0 / 17.0).abs() < 1e-12);
    }

    #[test]
    fn longest_match_prefers_earliest_block() {
        // "ab" occurs twice in b; the first occurrence is chosen.
        assert_eq!(longest_match(b"ab", 0, 2, b"xabab", 0, 5), (0, 1, 2));
        assert_eq!(matched_len(b"abcab", b"ab"), 2);
        assert_eq!(matched_len(b"abxcd", b"abycd"), 4);
    }

    #[test]
    fn threshold_is_inclusive() {
        // 2*7 / (7 + 13) is exactly 0.70.
        let score = similarity("abcdefg", "abcdefgxyzuvw");
        assert_eq!(score, 0.7);
        assert!(is_acceptable(score));
        assert!(!is_acceptable(0.699_999_999));

        let hit = best_match("abcdefg", indexed(&["abcdefgxyzuvw"])).unwrap();
        assert_eq!(hit.index, 0);
        // 2*7 / (7 + 14) ≈ 0.667 is rejected.
        assert!(best_match("abcdefg", indexed(&["abcdefgxyzuvwq"])).is_none());
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let stems = ["photo-1a", "photo_1b", "PHOTO1C"];
        let hit = best_match("photo1", indexed(&stems)).unwrap();
        assert_eq!(hit.index, 0);
        assert!((hit.score - 12.0 / 13.0).abs() < 1e-12);
    }

    #[test]
    fn best_match_is_deterministic() {
        let stems = ["IMG_0002", "IMG_0001", "IMG_0001(1)", "unrelated"];
        let first = best_match("IMG_0001", indexed(&stems));
        for _ in 0..10 {
            assert_eq!(best_match("IMG_0001", indexed(&stems)), first);
        }
        assert_eq!(first.unwrap().index, 1);
    }

    #[test]
    fn drifted_names_still_match() {
        let stems = ["vacation_edit1", "unrelated"];
        let hit = best_match("vacation-edit(1)", indexed(&stems)).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.score, 1.0);

        assert!(best_match("random9999", indexed(&["IMG_0001", "vacation_edit1"])).is_none());
    }

    #[test]
    fn empty_candidate_list_has_no_match() {
        assert!(best_match("IMG_0001", indexed(&[])).is_none());
    }

    #[test]
    fn indices_come_from_the_caller() {
        let candidates = vec![(4usize, "IMG_0009"), (7, "IMG_0001")];
        let hit = best_match("IMG_0001", candidates).unwrap();
        assert_eq!(hit.index, 7);
    }
}
