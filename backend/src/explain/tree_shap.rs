//! Path-dependent TreeSHAP: exact Shapley values of one tree's output where
//! missing features follow the training covers at every split.

use crate::models::tree::{Node, RegressionTree};
use ndarray::ArrayView1;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

fn extend(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let scale = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / scale;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / scale;
    }
}

/// Removes element `index`, undoing its contribution to the weights.
fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[index];
    let scale = (depth + 1) as f64;
    let mut next = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next * scale / ((i + 1) as f64 * one_fraction);
            next = tmp - path[i].weight * zero_fraction * (depth - i) as f64 / scale;
        } else {
            path[i].weight = path[i].weight * scale / (zero_fraction * (depth - i) as f64);
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.truncate(depth);
}

/// Total weight of the path with element `index` unwound, without mutating it.
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[index];
    let mut next = path[depth].weight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next = path[i].weight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].weight / (zero_fraction * (depth - i) as f64);
        }
    }
    total * (depth + 1) as f64
}

struct Walk<'a, 'x> {
    nodes: &'a [Node],
    x: ArrayView1<'x, f64>,
    phi: &'a mut [f64],
}

impl Walk<'_, '_> {
    fn recurse(
        &mut self,
        idx: usize,
        mut path: Vec<PathElement>,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        extend(&mut path, zero_fraction, one_fraction, feature);
        let nodes = self.nodes;

        match &nodes[idx] {
            Node::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let weight = unwound_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += weight * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            Node::Split {
                feature: split,
                threshold,
                left,
                right,
                cover,
            } => {
                let (hot, cold) = if self.x[*split] <= *threshold {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                let ratio = |child: usize| {
                    if *cover > 0.0 {
                        nodes[child].cover() / cover
                    } else {
                        0.5
                    }
                };
                let (hot_zero, cold_zero) = (ratio(hot), ratio(cold));

                let (mut incoming_zero, mut incoming_one) = (1.0, 1.0);
                if let Some(k) = path.iter().position(|e| e.feature == Some(*split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind(&mut path, k);
                }

                let split = *split;
                let hot_path = path.clone();
                self.recurse(hot, hot_path, hot_zero * incoming_zero, incoming_one, Some(split));
                self.recurse(cold, path, cold_zero * incoming_zero, 0.0, Some(split));
            }
        }
    }
}

/// Adds the tree's attributions for `x` into `phi` (one slot per column).
/// `sum(phi)` grows by `tree.predict(x) - tree.expected_value()`.
pub fn accumulate(tree: &RegressionTree, x: ArrayView1<f64>, phi: &mut [f64]) {
    if tree.nodes.is_empty() {
        return;
    }
    let mut walk = Walk {
        nodes: &tree.nodes,
        x,
        phi,
    };
    walk.recurse(0, Vec::with_capacity(tree.depth() + 2), 1.0, 1.0, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tree::TreeParams;
    use crate::models::tests::separable;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn leaf(value: f64, cover: f64) -> Node {
        Node::Leaf { value, cover }
    }

    #[test]
    fn single_split_attributes_everything_to_its_feature() {
        let tree = RegressionTree {
            nodes: vec![
                Node::Split {
                    feature: 1,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                    cover: 4.0,
                },
                leaf(-1.0, 1.0),
                leaf(3.0, 3.0),
            ],
        };
        let x = ndarray::array![7.0, 1.0, -2.0];
        let mut phi = vec![0.0; 3];
        accumulate(&tree, x.view(), &mut phi);

        // E[f] = (-1 * 1 + 3 * 3) / 4 = 2
        assert!((phi[1] - 1.0).abs() < 1e-12);
        assert_eq!(phi[0], 0.0);
        assert_eq!(phi[2], 0.0);
    }

    #[test]
    fn repeated_feature_on_a_path_stays_additive() {
        // feature 0 splits twice along the left branch
        let tree = RegressionTree {
            nodes: vec![
                Node::Split { feature: 0, threshold: 5.0, left: 1, right: 4, cover: 10.0 },
                Node::Split { feature: 0, threshold: 2.0, left: 2, right: 3, cover: 6.0 },
                leaf(1.0, 2.0),
                leaf(2.0, 4.0),
                Node::Split { feature: 1, threshold: 0.0, left: 5, right: 6, cover: 4.0 },
                leaf(4.0, 1.0),
                leaf(8.0, 3.0),
            ],
        };
        let points = [
            ndarray::array![1.0, 1.0],
            ndarray::array![3.0, -1.0],
            ndarray::array![6.0, -1.0],
        ];
        for x in points {
            let mut phi = vec![0.0; 2];
            accumulate(&tree, x.view(), &mut phi);
            let gap = tree.predict(x.view()) - tree.expected_value();
            assert!((phi.iter().sum::<f64>() - gap).abs() < 1e-9, "x = {}", x);
        }
    }

    #[test]
    fn fitted_trees_are_additive() {
        let (x, y) = separable(200, 8);
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; 200];
        let params = TreeParams {
            max_depth: 5,
            min_samples_leaf: 3,
            min_child_weight: 0.0,
            lambda: 0.0,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let rows = (0..200).collect();
        let tree = RegressionTree::fit(x.view(), &grad, &hess, rows, &params, &mut rng);

        for row in x.rows().into_iter().take(25) {
            let mut phi = vec![0.0; 4];
            accumulate(&tree, row, &mut phi);
            let gap = tree.predict(row) - tree.expected_value();
            assert!((phi.iter().sum::<f64>() - gap).abs() < 1e-9);
        }
    }
}
