//! Union-find grouping of claims by pairwise agreement.
//!
//! Grouping is transitive: A~B and B~C put A, B and C in one group even
//! when A and C score below the threshold against each other.

use serde::{Deserialize, Serialize};

use super::agreement::AgreementScorer;

/// Disjoint-set forest over `0..n`.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge two sets; the smaller root index becomes the representative.
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (keep, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = keep;
        }
    }

    /// Sets as sorted member lists, ordered by smallest member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            let root = self.find(i);
            by_root[root].push(i);
        }
        by_root.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

/// Agreement score for one pair of claims, by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub a: usize,
    pub b: usize,
    pub score: f64,
}

/// Score every pair and group indices whose scores reach `threshold`.
///
/// Scores are clamped to [0, 1]; a NaN score counts as 0.
pub fn agreement_groups(
    texts: &[&str],
    scorer: &dyn AgreementScorer,
    threshold: f64,
) -> (Vec<Vec<usize>>, Vec<PairScore>) {
    let n = texts.len();
    let mut uf = UnionFind::new(n);
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);

    for a in 0..n {
        for b in (a + 1)..n {
            let raw = scorer.score(texts[a], texts[b]);
            let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
            if score >= threshold {
                uf.union(a, b);
            }
            pairs.push(PairScore { a, b, score });
        }
    }

    (uf.groups(), pairs)
}
