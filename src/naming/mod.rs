//! Script-aware name normalization and similarity
//!
//! Family trees collect the same name written many ways: Arabic vs Persian
//! letter forms, optional diacritics, inconsistent spacing between name
//! parts. Normalization folds those variants so duplicate detection can
//! compare names structurally.

use unicode_normalization::char::is_combining_mark;

/// Map script-variant code points to a canonical form.
fn fold_char(c: char) -> char {
    match c {
        'ك' => 'ک', // Arabic kaf -> Persian kaf
        'ي' => 'ی', // Arabic ya -> Persian ya
        'ة' => 'ه', // ta marbuta -> he
        'ؤ' => 'و', // waw with hamza -> waw
        'إ' | 'أ' | 'آ' | 'ٱ' => 'ا', // hamza/madda/wasla alef variants -> bare alef
        'ئ' => 'ی', // ya with hamza -> ya
        'ى' => 'ی', // alef maksura -> ya
        c => c.to_ascii_lowercase(),
    }
}

/// Normalize a name for matching: fold script variants, drop combining
/// marks, lowercase ASCII, and remove all whitespace so that
/// "محمد علی" and "محمدعلی" compare equal.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !is_combining_mark(*c) && !c.is_whitespace())
        .map(fold_char)
        .collect()
}

/// Normalize but keep (collapsed) spaces, for display.
pub fn normalize_keep_spaces(name: &str) -> String {
    let folded: String = name
        .chars()
        .filter(|c| !is_combining_mark(*c))
        .map(fold_char)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein edit distance over code points.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row rolling matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity between two names after normalization, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    if norm_a == norm_b {
        return 1.0;
    }

    let max_len = norm_a.chars().count().max(norm_b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - levenshtein(&norm_a, &norm_b) as f64 / max_len as f64
}

/// Default similarity threshold for duplicate detection
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// A potential duplicate match
#[derive(Debug, Clone, serde::Serialize)]
pub struct NameMatch {
    pub person_id: String,
    pub name: String,
    pub similarity: f64,
    /// "exact", "normalized", or "similar"
    pub match_type: &'static str,
}

/// Find names similar to `target` among `(person_id, name)` pairs.
/// Returns matches with similarity >= threshold, best first.
pub fn find_similar_names<'a, I>(target: &str, existing: I, threshold: f64) -> Vec<NameMatch>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let lowered_target = target.to_lowercase();
    let normalized_target = normalize(target);
    let mut results = Vec::new();

    for (person_id, existing_name) in existing {
        // Full Unicode case fold, not just ASCII
        if lowered_target == existing_name.to_lowercase() {
            results.push(NameMatch {
                person_id: person_id.to_string(),
                name: existing_name.to_string(),
                similarity: 1.0,
                match_type: "exact",
            });
            continue;
        }

        if normalized_target == normalize(existing_name) {
            results.push(NameMatch {
                person_id: person_id.to_string(),
                name: existing_name.to_string(),
                similarity: 0.99,
                match_type: "normalized",
            });
            continue;
        }

        let score = similarity(target, existing_name);
        if score >= threshold {
            results.push(NameMatch {
                person_id: person_id.to_string(),
                name: existing_name.to_string(),
                similarity: score,
                match_type: "similar",
            });
        }
    }

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}
