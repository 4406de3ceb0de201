use crate::model::ImplicitLink;
use crate::similarity::jaro_winkler;

/// Pair two key lists: exact equality first, then best Jaro-Winkler score.
///
/// Greedy and order-sensitive on purpose: both phases walk `left_keys` in
/// input order, and each left key consumes the first equal (exact phase) or
/// best-scoring (approximate phase) right key still available. Permuting
/// either input can change which pairs are selected.
///
/// Total function: every input produces a valid, possibly empty, output.
pub fn compute_implicit_links(left_keys: &[String], right_keys: &[String]) -> Vec<ImplicitLink> {
    let mut left_used = vec![false; left_keys.len()];
    let mut right_used = vec![false; right_keys.len()];
    let mut links = Vec::new();

    // Exact phase. Duplicate keys are positional: each occurrence pairs at
    // most once.
    for (li, left) in left_keys.iter().enumerate() {
        for (ri, right) in right_keys.iter().enumerate() {
            if right_used[ri] || left != right {
                continue;
            }
            left_used[li] = true;
            right_used[ri] = true;
            links.push(ImplicitLink {
                left: left.clone(),
                right: right.clone(),
                correlation: 1.0,
            });
            break;
        }
    }

    // Approximate phase. Strict `>` keeps the first-seen candidate on ties;
    // a best score of 0.0 leaves the left key unmatched and omitted.
    for (li, left) in left_keys.iter().enumerate() {
        if left_used[li] {
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for (ri, right) in right_keys.iter().enumerate() {
            if right_used[ri] {
                continue;
            }
            let score = jaro_winkler(left, right);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((ri, score));
            }
        }

        if let Some((ri, score)) = best {
            if score > 0.0 {
                right_used[ri] = true;
                links.push(ImplicitLink {
                    left: left.clone(),
                    right: right_keys[ri].clone(),
                    correlation: score,
                });
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(links: &[ImplicitLink]) -> Vec<(&str, &str)> {
        links
            .iter()
            .map(|l| (l.left.as_str(), l.right.as_str()))
            .collect()
    }

    #[test]
    fn exact_matches_pair_with_full_correlation() {
        let left = keys(&["a", "b", "c"]);
        let right = keys(&["a", "b"]);
        let links = compute_implicit_links(&left, &right);

        // "c" has no candidates left and is omitted.
        assert_eq!(pairs(&links), vec![("a", "a"), ("b", "b")]);
        assert_eq!(links[0].correlation, 1.0);
        assert_eq!(links[1].correlation, 1.0);
    }

    #[test]
    fn exact_then_approximate() {
        let left = keys(&["foo", "bar", "baz"]);
        let right = keys(&["foob", "bar", "barr"]);
        let links = compute_implicit_links(&left, &right);

        // Exact phase claims bar<->bar; the approximate phase pairs the rest.
        assert_eq!(pairs(&links), vec![("bar", "bar"), ("foo", "foob"), ("baz", "barr")]);
        assert_eq!(links[0].correlation, 1.0);
        assert!(links[1].correlation < 1.0 && links[1].correlation > 0.0);
        assert!(links[2].correlation < 1.0 && links[2].correlation > 0.0);
    }

    #[test]
    fn empty_right_yields_empty_output() {
        let left = keys(&["foo", "bar", "baz"]);
        let links = compute_implicit_links(&left, &[]);
        assert!(links.is_empty());
    }

    #[test]
    fn empty_left_yields_empty_output() {
        let right = keys(&["foo", "bar"]);
        let links = compute_implicit_links(&[], &right);
        assert!(links.is_empty());
    }

    #[test]
    fn disjoint_keys_are_omitted() {
        let left = keys(&["abc"]);
        let right = keys(&["xyz"]);
        let links = compute_implicit_links(&left, &right);
        assert!(links.is_empty());
    }

    #[test]
    fn duplicates_match_positionally() {
        let left = keys(&["chem", "chem"]);
        let right = keys(&["chem", "chem", "chem"]);
        let links = compute_implicit_links(&left, &right);

        assert_eq!(pairs(&links), vec![("chem", "chem"), ("chem", "chem")]);
        assert!(links.iter().all(|l| l.correlation == 1.0));
    }

    #[test]
    fn greedy_selection_depends_on_left_order() {
        // Both left keys strictly prefer "foo" over "fo"; whichever is walked
        // first wins it and the loser falls back.
        let right = keys(&["foo", "fo"]);

        let first = compute_implicit_links(&keys(&["foo1", "fooo"]), &right);
        assert_eq!(pairs(&first), vec![("foo1", "foo"), ("fooo", "fo")]);

        let second = compute_implicit_links(&keys(&["fooo", "foo1"]), &right);
        assert_eq!(pairs(&second), vec![("fooo", "foo"), ("foo1", "fo")]);
    }

    #[test]
    fn equal_scores_keep_first_seen_candidate() {
        // "abc" and "abd" score identically against "ab"; strict `>` keeps
        // the earlier right key.
        let left = keys(&["ab"]);
        let right = keys(&["abc", "abd"]);
        let links = compute_implicit_links(&left, &right);

        assert_eq!(pairs(&links), vec![("ab", "abc")]);
    }

    #[test]
    fn exact_phase_runs_to_completion_before_approximate() {
        // A tempting approximate candidate must not steal a right key that a
        // later left key claims exactly.
        let left = keys(&["geometry 1", "geometry"]);
        let right = keys(&["geometry"]);
        let links = compute_implicit_links(&left, &right);

        assert_eq!(pairs(&links), vec![("geometry", "geometry")]);
        assert_eq!(links[0].correlation, 1.0);
    }
}
