//! Picks which of the eligible nodes (or pods) an experiment disrupts.
use crate::error::{self, Result};

use rand::seq::index;
use rand::Rng;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// How many of the eligible targets to act upon.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum SelectionPolicy {
    /// Every eligible target.
    All,
    /// Up to `k` distinct targets drawn uniformly at random.
    Random(NonZeroUsize),
    /// The first target, in the order the API listed them.
    #[default]
    First,
}

impl SelectionPolicy {
    pub fn random_one() -> Self {
        SelectionPolicy::Random(NonZeroUsize::MIN)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::All => write!(f, "all"),
            SelectionPolicy::Random(count) => write!(f, "random:{}", count),
            SelectionPolicy::First => write!(f, "first"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    /// Accepts `all`, `first`, `random` (one target) or `random:<count>`.
    fn from_str(policy: &str) -> std::result::Result<Self, Self::Err> {
        match policy.split_once(':') {
            None if policy == "all" => Ok(SelectionPolicy::All),
            None if policy == "first" => Ok(SelectionPolicy::First),
            None if policy == "random" => Ok(SelectionPolicy::random_one()),
            Some(("random", count)) => count
                .parse::<NonZeroUsize>()
                .map(SelectionPolicy::Random)
                .map_err(|e| format!("invalid random count '{}': {}", count, e)),
            _ => Err(format!(
                "unknown selection policy '{}', expected all, first, random or random:<count>",
                policy
            )),
        }
    }
}

/// Applies `policy` to `candidates` using the thread-local RNG.
///
/// `description` names what the candidates were selected by, for error reporting.
pub fn select_targets<T>(
    candidates: Vec<T>,
    policy: SelectionPolicy,
    description: &str,
) -> Result<Vec<T>> {
    select_targets_with_rng(candidates, policy, description, &mut rand::rng())
}

/// Applies `policy` to `candidates`, drawing random picks from `rng`.
///
/// Fails with `NoEligibleNodes` when there are no candidates, whatever the policy.
/// Random picks keep the relative order of `candidates`.
pub fn select_targets_with_rng<T, R>(
    candidates: Vec<T>,
    policy: SelectionPolicy,
    description: &str,
    rng: &mut R,
) -> Result<Vec<T>>
where
    R: Rng + ?Sized,
{
    if candidates.is_empty() {
        return error::NoEligibleNodesSnafu {
            selector: description,
        }
        .fail();
    }

    let selected = match policy {
        SelectionPolicy::All => candidates,
        SelectionPolicy::First => candidates.into_iter().take(1).collect(),
        SelectionPolicy::Random(count) => {
            let amount = count.get().min(candidates.len());
            let mut picked = index::sample(rng, candidates.len(), amount).into_vec();
            picked.sort_unstable();

            let mut picked = picked.into_iter().peekable();
            candidates
                .into_iter()
                .enumerate()
                .filter_map(|(i, candidate)| {
                    if picked.peek() == Some(&i) {
                        picked.next();
                        Some(candidate)
                    } else {
                        None
                    }
                })
                .collect()
        }
    };

    Ok(selected)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn random(count: usize) -> SelectionPolicy {
        SelectionPolicy::Random(NonZeroUsize::new(count).unwrap())
    }

    fn nodes() -> Vec<String> {
        (1..=6).map(|i| format!("node-{}", i)).collect()
    }

    #[test]
    fn test_empty_candidates_fail_for_every_policy() {
        for policy in [SelectionPolicy::All, SelectionPolicy::First, random(3)] {
            let result = select_targets(Vec::<String>::new(), policy, "role=worker");
            assert!(matches!(
                result,
                Err(crate::Error::NoEligibleNodes { ref selector }) if selector == "role=worker"
            ));
        }
    }

    #[test]
    fn test_all_and_first() {
        assert_eq!(
            select_targets(nodes(), SelectionPolicy::All, "").unwrap(),
            nodes()
        );
        assert_eq!(
            select_targets(nodes(), SelectionPolicy::First, "").unwrap(),
            vec!["node-1".to_string()]
        );
    }

    #[test]
    fn test_random_picks_distinct_targets_in_order() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = select_targets_with_rng(nodes(), random(3), "", &mut rng).unwrap();
            assert_eq!(picked.len(), 3);
            assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 3);

            let positions: Vec<usize> = picked
                .iter()
                .map(|p| nodes().iter().position(|n| n == p).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_random_count_is_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let picked = select_targets_with_rng(nodes(), random(100), "", &mut rng).unwrap();
        assert_eq!(picked, nodes());
    }

    #[test]
    fn test_random_one_covers_every_candidate() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let picked = select_targets_with_rng(
                nodes(),
                SelectionPolicy::random_one(),
                "",
                &mut rng,
            )
            .unwrap();
            assert_eq!(picked.len(), 1);
            seen.insert(picked[0].clone());
        }
        assert_eq!(seen.len(), nodes().len());
    }

    #[test]
    fn test_parse_policy() {
        let test_cases = vec![
            ("all", Some(SelectionPolicy::All)),
            ("first", Some(SelectionPolicy::First)),
            ("random", Some(random(1))),
            ("random:4", Some(random(4))),
            ("random:0", None),
            ("random:many", None),
            ("some", None),
        ];
        for (policy, expected) in test_cases {
            assert_eq!(policy.parse::<SelectionPolicy>().ok(), expected, "{}", policy);
        }
        assert_eq!(random(4).to_string().parse::<SelectionPolicy>(), Ok(random(4)));
    }
}
