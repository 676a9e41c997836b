fn normalize_token(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Distance between a typed tool name and a candidate; `None` when unrelated.
fn score_candidate(input: &str, candidate: &str, allowed: usize) -> Option<usize> {
    let a = normalize_token(input);
    let b = normalize_token(candidate);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(0);
    }
    if b.starts_with(&a) || a.starts_with(&b) {
        return Some(1);
    }
    // "messages" should find "list-mail-messages"
    let word_hit = candidate
        .split(['-', '_'])
        .any(|word| !word.is_empty() && normalize_token(word) == a);
    if word_hit {
        return Some(2);
    }
    let distance = levenshtein(&a, &b);
    (distance <= allowed).then_some(distance)
}

fn max_allowed_distance(input: &str) -> usize {
    let len = normalize_token(input).len();
    match len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        _ => ((len as f32) * 0.35).floor().max(3.0) as usize,
    }
}

pub fn suggest(input: &str, candidates: &[String], limit: usize) -> Vec<String> {
    if input.trim().is_empty() || candidates.is_empty() {
        return Vec::new();
    }
    let allowed = max_allowed_distance(input);
    let mut scored: Vec<(&String, usize)> = candidates
        .iter()
        .filter_map(|candidate| score_candidate(input, candidate, allowed).map(|s| (candidate, s)))
        .collect();
    scored.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then_with(|| a.0.len().cmp(&b.0.len()))
            .then_with(|| a.0.cmp(b.0))
    });
    scored.dedup_by(|a, b| a.0 == b.0);
    scored
        .into_iter()
        .take(limit.max(1))
        .map(|(candidate, _)| candidate.clone())
        .collect()
}
