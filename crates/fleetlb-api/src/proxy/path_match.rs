//! Path pattern matching for multi-endpoint workers (spec §4.I).
//!
//! A pattern is slash-separated; `*` matches exactly one segment, and a
//! trailing `/*` matches any non-empty suffix. Specificity ranks matches so
//! the most specific endpoint route wins.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    exact: bool,
    literal_prefix_len: usize,
    fewer_wildcards: std::cmp::Reverse<usize>,
}

/// Matches `path` against `pattern`, returning its specificity if it matches.
pub fn match_pattern(pattern: &str, path: &str) -> Option<Specificity> {
    if pattern == "/" || pattern == "*" {
        return Some(Specificity { exact: false, literal_prefix_len: 0, fewer_wildcards: std::cmp::Reverse(usize::MAX) });
    }

    let pattern_segs: Vec<&str> = pattern.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let path_segs: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    let trailing_wildcard = pattern.ends_with("/*") && pattern_segs.last().map(|s| *s == "*").unwrap_or(false);

    if trailing_wildcard {
        let prefix = &pattern_segs[..pattern_segs.len() - 1];
        if path_segs.len() <= prefix.len() {
            return None;
        }
        let mut literal_len = 0;
        let mut wildcards = 0;
        for (p, a) in prefix.iter().zip(path_segs.iter()) {
            if *p == "*" {
                wildcards += 1;
            } else if p == a {
                literal_len += p.len();
            } else {
                return None;
            }
        }
        return Some(Specificity {
            exact: false,
            literal_prefix_len: literal_len,
            fewer_wildcards: std::cmp::Reverse(wildcards),
        });
    }

    if pattern_segs.len() != path_segs.len() {
        return None;
    }

    let mut literal_len = 0;
    let mut wildcards = 0;
    let mut exact = true;
    for (p, a) in pattern_segs.iter().zip(path_segs.iter()) {
        if *p == "*" {
            wildcards += 1;
            exact = false;
        } else if p == a {
            literal_len += p.len();
        } else {
            return None;
        }
    }

    Some(Specificity { exact, literal_prefix_len: literal_len, fewer_wildcards: std::cmp::Reverse(wildcards) })
}

/// Picks the endpoint route whose pattern best matches `path`. Falls back to
/// the first configured route, or `None` if there are no routes at all.
pub fn best_match<'a>(
    routes: &'a [fleetlb_types::model::EndpointRoute],
    path: &str,
) -> Option<&'a fleetlb_types::model::EndpointRoute> {
    let mut best: Option<(Specificity, &fleetlb_types::model::EndpointRoute)> = None;
    for route in routes {
        for pattern in &route.paths {
            if let Some(spec) = match_pattern(pattern, path) {
                let better = match &best {
                    Some((best_spec, _)) => spec > *best_spec,
                    None => true,
                };
                if better {
                    best = Some((spec, route));
                }
            }
        }
    }
    best.map(|(_, r)| r).or_else(|| routes.first())
}
