//! Second-order regression trees shared by the forest and the booster.
//!
//! A tree is grown on per-row gradients and hessians. With `grad = -y`,
//! `hess = 1` and `lambda = 0` the split gain is the squared-error reduction
//! and leaves hold class frequencies; with logistic gradients it is the usual
//! boosting objective.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
        cover: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Leaf { cover, .. } | Node::Split { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    /// Node 0 is the root.
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub max_features: Option<usize>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    pub fn fit<R: Rng>(
        x: ArrayView2<f64>,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut builder = Builder {
            x,
            grad,
            hess,
            params,
            rng,
            nodes: Vec::new(),
        };
        builder.grow(rows, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, x: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => idx = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// Cover-weighted mean of the leaf values.
    pub fn expected_value(&self) -> f64 {
        self.expected_from(0)
    }

    fn expected_from(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            Node::Leaf { value, .. } => *value,
            Node::Split {
                left, right, cover, ..
            } => {
                let lc = self.nodes[*left].cover();
                let rc = self.nodes[*right].cover();
                if *cover <= 0.0 {
                    return 0.5 * (self.expected_from(*left) + self.expected_from(*right));
                }
                (lc * self.expected_from(*left) + rc * self.expected_from(*right)) / cover
            }
        }
    }

    pub fn scale_leaves(&mut self, factor: f64) {
        for node in self.nodes.iter_mut() {
            if let Node::Leaf { value, .. } = node {
                *value *= factor;
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct Builder<'a, 'x, R: Rng> {
    x: ArrayView2<'x, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a TreeParams,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

impl<R: Rng> Builder<'_, '_, R> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
        let value = -g / (h + self.params.lambda).max(f64::EPSILON);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value, cover: h });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf.max(1) {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[[r, split.feature]] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            cover: h,
        };
        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        match self.params.max_features {
            Some(k) if k > 0 && k < n_features => {
                let mut picked = rand::seq::index::sample(&mut *self.rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn best_split(&mut self, rows: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let lambda = self.params.lambda;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = g * g / (h + lambda).max(f64::EPSILON);
        let mut best: Option<Candidate> = None;

        for feature in self.candidate_features() {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|a, b| self.x[[*a, feature]].total_cmp(&self.x[[*b, feature]]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for i in 0..sorted.len() - 1 {
                let row = sorted[i];
                gl += self.grad[row];
                hl += self.hess[row];

                let here = self.x[[row, feature]];
                let next = self.x[[sorted[i + 1], feature]];
                if here == next {
                    continue;
                }
                let n_left = i + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = gl * gl / (hl + lambda).max(f64::EPSILON)
                    + gr * gr / (hr + lambda).max(f64::EPSILON)
                    - parent_score;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
