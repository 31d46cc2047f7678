/// Lowercased alphanumerics only, so `get-product` and `GetProduct` compare equal.
fn fold(value: &str) -> Vec<char> {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b.len()]
}

fn tolerance(len: usize) -> usize {
    match len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        _ => (len / 3).max(3),
    }
}

/// Candidate names close to `input`, best match first.
pub fn closest_names<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    limit: usize,
) -> Vec<String> {
    let needle = fold(input);
    if needle.is_empty() {
        return Vec::new();
    }
    let allowed = tolerance(needle.len());
    let needle_text: String = needle.iter().collect();

    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let folded = fold(candidate);
            if folded.is_empty() {
                return None;
            }
            let folded_text: String = folded.iter().collect();
            let score = if folded_text.contains(&needle_text) || needle_text.contains(&folded_text) {
                usize::from(folded != needle)
            } else {
                edit_distance(&needle, &folded)
            };
            (score <= allowed).then_some((score, candidate))
        })
        .collect();

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit.max(1))
        .map(|(_, name)| name.to_string())
        .collect()
}
