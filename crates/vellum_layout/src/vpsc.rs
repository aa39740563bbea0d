//! Variable placement with separation constraints
//!
//! Minimizes `Σ wᵢ (xᵢ - dᵢ)²` subject to `x[left] + gap <= x[right]` for a
//! set of one-dimensional variables.
//!
//! The solver works on blocks: groups of variables whose relative offsets are
//! fixed by a spanning tree of *active* constraints. A block sits at the
//! weighted mean of its members' desired positions.
//!
//! - `satisfy` visits variables in constraint order and merges blocks across
//!   violated constraints until every constraint holds
//! - `solve` additionally splits blocks across active constraints whose
//!   Lagrange multiplier is negative (the constraint pulls instead of pushing)
//!   and re-merges, which moves the solution toward the optimum
//!
//! Cyclic constraint sets have no feasible order; the constraints closing a
//! cycle are dropped with a warning.

use smallvec::SmallVec;

use crate::error::{LayoutError, Result};

/// Slack below this counts as a violation
const ZERO_UPPERBOUND: f64 = -1e-10;

/// Multipliers below this mark a constraint worth splitting
const LAGRANGIAN_TOLERANCE: f64 = -1e-4;

/// Refinement passes before giving up on optimality
const MAX_REFINE: usize = 100;

/// A variable and where it would like to be
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Variable {
    pub desired: f64,
    pub weight: f64,
}

impl Variable {
    pub fn new(desired: f64) -> Self {
        Self {
            desired,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// `x[left] + gap <= x[right]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
}

impl Constraint {
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self { left, right, gap }
    }
}

/// Find positions that satisfy every constraint, without optimizing
pub fn satisfy(vars: &[Variable], cons: &[Constraint]) -> Result<Vec<f64>> {
    let mut solver = Solver::new(vars, cons)?;
    solver.satisfy();
    Ok(solver.finish())
}

/// Find the least-squares positions that satisfy every constraint
pub fn solve(vars: &[Variable], cons: &[Constraint]) -> Result<Vec<f64>> {
    let mut solver = Solver::new(vars, cons)?;
    solver.satisfy();
    solver.refine();
    Ok(solver.finish())
}

fn validate(vars: &[Variable], cons: &[Constraint]) -> Result<()> {
    for (index, v) in vars.iter().enumerate() {
        if !v.desired.is_finite() {
            return Err(LayoutError::NonFinite {
                what: "desired position",
                index,
            });
        }
        if !(v.weight.is_finite() && v.weight > 0.0) {
            return Err(LayoutError::InvalidWeight(index));
        }
    }
    for (index, c) in cons.iter().enumerate() {
        for variable in [c.left, c.right] {
            if variable >= vars.len() {
                return Err(LayoutError::UnknownVariable {
                    constraint: index,
                    variable,
                    count: vars.len(),
                });
            }
        }
        if !c.gap.is_finite() {
            return Err(LayoutError::NonFinite { what: "gap", index });
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Block {
    vars: Vec<usize>,
    /// `Σ w (desired - offset)`
    wposn: f64,
    weight: f64,
    posn: f64,
    alive: bool,
}

impl Block {
    fn optimal(&mut self) {
        self.posn = self.wposn / self.weight;
    }
}

struct Solver<'a> {
    vars: &'a [Variable],
    cons: &'a [Constraint],
    /// Offset of each variable from its block position
    offset: Vec<f64>,
    block: Vec<usize>,
    blocks: Vec<Block>,
    active: Vec<bool>,
    lm: Vec<f64>,
    incoming: Vec<SmallVec<[usize; 4]>>,
    outgoing: Vec<SmallVec<[usize; 4]>>,
    /// Variables in constraint order
    order: Vec<usize>,
}

impl<'a> Solver<'a> {
    fn new(vars: &'a [Variable], cons: &'a [Constraint]) -> Result<Self> {
        validate(vars, cons)?;
        let n = vars.len();
        let mut solver = Self {
            vars,
            cons,
            offset: vec![0.0; n],
            block: (0..n).collect(),
            blocks: vars
                .iter()
                .enumerate()
                .map(|(i, v)| Block {
                    vars: vec![i],
                    wposn: v.weight * v.desired,
                    weight: v.weight,
                    posn: v.desired,
                    alive: true,
                })
                .collect(),
            active: vec![false; cons.len()],
            lm: vec![0.0; cons.len()],
            incoming: vec![SmallVec::new(); n],
            outgoing: vec![SmallVec::new(); n],
            order: Vec::with_capacity(n),
        };
        solver.order_variables();
        Ok(solver)
    }

    /// Topological order over the constraint graph. Constraints that close a
    /// cycle (and self loops) are left out of the adjacency lists.
    fn order_variables(&mut self) {
        let n = self.vars.len();
        let mut adjacency: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); n];
        for (ci, c) in self.cons.iter().enumerate() {
            if c.left == c.right {
                tracing::warn!("constraint {} relates variable {} to itself; dropped", ci, c.left);
                continue;
            }
            adjacency[c.left].push(ci);
        }

        // iterative DFS, post-order reversed
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut mark = vec![Mark::New; n];
        let mut post = Vec::with_capacity(n);
        let mut dropped = 0usize;
        for start in 0..n {
            if mark[start] != Mark::New {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            mark[start] = Mark::Open;
            while let Some((v, next)) = stack.last_mut() {
                let v = *v;
                if let Some(&ci) = adjacency[v].get(*next) {
                    *next += 1;
                    let w = self.cons[ci].right;
                    match mark[w] {
                        Mark::New => {
                            mark[w] = Mark::Open;
                            stack.push((w, 0));
                        }
                        Mark::Open => {
                            dropped += 1;
                            continue;
                        }
                        Mark::Done => {}
                    }
                    self.outgoing[v].push(ci);
                    self.incoming[w].push(ci);
                } else {
                    mark[v] = Mark::Done;
                    post.push(v);
                    stack.pop();
                }
            }
        }
        if dropped > 0 {
            tracing::warn!("{} constraints close a cycle and were dropped", dropped);
        }
        post.reverse();
        self.order = post;
    }

    fn position(&self, v: usize) -> f64 {
        self.blocks[self.block[v]].posn + self.offset[v]
    }

    fn slack(&self, ci: usize) -> f64 {
        let c = &self.cons[ci];
        self.position(c.right) - self.position(c.left) - c.gap
    }

    /// Is this constraint in the adjacency lists (not dropped)?
    fn kept(&self, ci: usize) -> bool {
        let c = &self.cons[ci];
        self.incoming[c.right].contains(&ci)
    }

    // ── merging ──

    /// Merge the blocks on either side of `ci` and activate it. Returns the
    /// surviving block.
    fn merge(&mut self, ci: usize) -> usize {
        let c = self.cons[ci];
        let (l, r) = (self.block[c.left], self.block[c.right]);
        // move the smaller block into the larger one
        let (keep, gone, dist) = if self.blocks[l].vars.len() >= self.blocks[r].vars.len() {
            (l, r, self.offset[c.left] + c.gap - self.offset[c.right])
        } else {
            (r, l, self.offset[c.right] - c.gap - self.offset[c.left])
        };

        let moved = std::mem::take(&mut self.blocks[gone].vars);
        let (gone_wposn, gone_weight) = (self.blocks[gone].wposn, self.blocks[gone].weight);
        self.blocks[gone].alive = false;
        for &v in &moved {
            self.offset[v] += dist;
            self.block[v] = keep;
        }
        let block = &mut self.blocks[keep];
        block.vars.extend(moved);
        block.wposn += gone_wposn - dist * gone_weight;
        block.weight += gone_weight;
        block.optimal();
        self.active[ci] = true;
        keep
    }

    /// Most violated constraint entering (or leaving) block `b` from another
    /// block
    fn most_violated(&self, b: usize, entering: bool) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for &v in &self.blocks[b].vars {
            let edges = if entering {
                &self.incoming[v]
            } else {
                &self.outgoing[v]
            };
            for &ci in edges {
                let c = &self.cons[ci];
                let other = if entering { c.left } else { c.right };
                if self.block[other] == b {
                    continue;
                }
                let slack = self.slack(ci);
                if slack < ZERO_UPPERBOUND && best.map_or(true, |(_, s)| slack < s) {
                    best = Some((ci, slack));
                }
            }
        }
        best.map(|(ci, _)| ci)
    }

    fn merge_left(&mut self, mut b: usize) -> usize {
        while let Some(ci) = self.most_violated(b, true) {
            b = self.merge(ci);
        }
        b
    }

    fn merge_right(&mut self, mut b: usize) -> usize {
        while let Some(ci) = self.most_violated(b, false) {
            b = self.merge(ci);
        }
        b
    }

    fn satisfy(&mut self) {
        for i in 0..self.order.len() {
            let v = self.order[i];
            let b = self.block[v];
            self.merge_left(b);
        }
    }

    // ── refinement ──

    /// Lagrange multipliers of the active constraints in block `b`
    fn compute_multipliers(&mut self, b: usize) {
        let Some(&root) = self.blocks[b].vars.first() else {
            return;
        };
        // BFS over the active spanning tree; `via` is the constraint that
        // reached each variable
        let mut visit: Vec<(usize, Option<usize>)> = vec![(root, None)];
        let mut seen = vec![root];
        let mut head = 0;
        while head < visit.len() {
            let (v, via) = visit[head];
            head += 1;
            for &ci in self.incoming[v].iter().chain(self.outgoing[v].iter()) {
                if !self.active[ci] || Some(ci) == via {
                    continue;
                }
                let c = &self.cons[ci];
                let w = if c.left == v { c.right } else { c.left };
                if seen.contains(&w) {
                    continue;
                }
                seen.push(w);
                visit.push((w, Some(ci)));
            }
        }

        let mut dfdv: Vec<f64> = visit
            .iter()
            .map(|&(v, _)| {
                let var = &self.vars[v];
                2.0 * var.weight * (self.position(v) - var.desired)
            })
            .collect();
        let index_of = |v: usize, visit: &[(usize, Option<usize>)]| {
            visit.iter().position(|&(w, _)| w == v)
        };
        for k in (1..visit.len()).rev() {
            let (v, Some(ci)) = visit[k] else {
                continue;
            };
            let c = self.cons[ci];
            let parent = if c.left == v { c.right } else { c.left };
            self.lm[ci] = if c.right == v { dfdv[k] } else { -dfdv[k] };
            if let Some(p) = index_of(parent, &visit) {
                dfdv[p] += dfdv[k];
            }
        }
    }

    /// Split block `b` across active constraint `ci`. Returns (left, right).
    fn split(&mut self, b: usize, ci: usize) -> (usize, usize) {
        self.active[ci] = false;
        let c = self.cons[ci];

        let mut left = vec![c.left];
        let mut head = 0;
        while head < left.len() {
            let v = left[head];
            head += 1;
            for &e in self.incoming[v].iter().chain(self.outgoing[v].iter()) {
                if !self.active[e] {
                    continue;
                }
                let con = &self.cons[e];
                let w = if con.left == v { con.right } else { con.left };
                if !left.contains(&w) {
                    left.push(w);
                }
            }
        }
        let right: Vec<usize> = self.blocks[b]
            .vars
            .iter()
            .copied()
            .filter(|v| !left.contains(v))
            .collect();
        let posn = self.blocks[b].posn;
        self.blocks[b].alive = false;
        self.blocks[b].vars.clear();

        let l = self.new_block(left, posn);
        let r = self.new_block(right, posn);
        (l, r)
    }

    fn new_block(&mut self, vars: Vec<usize>, posn: f64) -> usize {
        let index = self.blocks.len();
        let mut block = Block {
            vars,
            posn,
            alive: true,
            ..Default::default()
        };
        for &v in &block.vars {
            let var = &self.vars[v];
            block.wposn += var.weight * (var.desired - self.offset[v]);
            block.weight += var.weight;
            self.block[v] = index;
        }
        self.blocks.push(block);
        index
    }

    fn refine(&mut self) {
        for iteration in 0..MAX_REFINE {
            let live: Vec<usize> = (0..self.blocks.len())
                .filter(|&b| self.blocks[b].alive && self.blocks[b].vars.len() > 1)
                .collect();
            for &b in &live {
                self.compute_multipliers(b);
            }
            let candidate = (0..self.cons.len())
                .filter(|&ci| self.active[ci])
                .min_by(|&a, &b| self.lm[a].total_cmp(&self.lm[b]));
            let Some(ci) = candidate.filter(|&ci| self.lm[ci] < LAGRANGIAN_TOLERANCE) else {
                tracing::trace!("vpsc converged after {} refinements", iteration);
                return;
            };

            let b = self.block[self.cons[ci].left];
            let (l, _) = self.split(b, ci);
            self.blocks[l].optimal();
            self.merge_left(l);
            // the right half may have been absorbed by the left merge
            let r = self.block[self.cons[ci].right];
            self.blocks[r].optimal();
            self.merge_right(r);
        }
        tracing::debug!("vpsc stopped after {} refinements", MAX_REFINE);
    }

    /// Positions, projected once more in constraint order so that every kept
    /// constraint holds exactly
    fn finish(self) -> Vec<f64> {
        let mut x: Vec<f64> = (0..self.vars.len()).map(|v| self.position(v)).collect();
        for &v in &self.order {
            for &ci in &self.incoming[v] {
                let c = &self.cons[ci];
                let min = x[c.left] + c.gap;
                if x[v] < min {
                    x[v] = min;
                }
            }
        }
        debug_assert!((0..self.cons.len())
            .filter(|&ci| self.kept(ci))
            .all(|ci| x[self.cons[ci].right] - x[self.cons[ci].left] - self.cons[ci].gap > -1e-6));
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(desired: &[f64]) -> Vec<Variable> {
        desired.iter().copied().map(Variable::new).collect()
    }

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    #[test]
    fn test_pair_splits_evenly() {
        let x = solve(&vars(&[0.0, 0.0]), &[Constraint::new(0, 1, 10.0)]).unwrap();
        assert!(close(&x, &[-5.0, 5.0]), "{x:?}");
    }

    #[test]
    fn test_heavier_variable_moves_less() {
        let vs = [Variable::new(0.0).with_weight(3.0), Variable::new(0.0)];
        let x = solve(&vs, &[Constraint::new(0, 1, 4.0)]).unwrap();
        assert!(close(&x, &[-1.0, 3.0]), "{x:?}");
    }

    #[test]
    fn test_satisfied_input_is_unchanged() {
        let x = solve(&vars(&[0.0, 20.0, 50.0]), &[
            Constraint::new(0, 1, 5.0),
            Constraint::new(1, 2, 5.0),
        ])
        .unwrap();
        assert!(close(&x, &[0.0, 20.0, 50.0]));
    }

    #[test]
    fn test_chain_centres_on_mean() {
        let x = solve(&vars(&[0.0, 0.0, 0.0]), &[
            Constraint::new(0, 1, 1.0),
            Constraint::new(1, 2, 1.0),
        ])
        .unwrap();
        assert!(close(&x, &[-1.0, 0.0, 1.0]), "{x:?}");
    }

    #[test]
    fn test_most_violated_merges_first() {
        let cons = [
            Constraint::new(0, 1, 0.0),
            Constraint::new(1, 2, 0.0),
            Constraint::new(3, 2, 0.0),
        ];
        let x = solve(&vars(&[0.0, 5.0, 4.0, 9.0]), &cons).unwrap();
        assert!(close(&x, &[0.0, 5.0, 6.5, 6.5]), "{x:?}");
    }

    #[test]
    fn test_solve_never_worse_than_satisfy() {
        // small LCG so the case is stable
        let mut seed = 7u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as f64 / (1u64 << 31) as f64
        };
        let vs: Vec<Variable> = (0..12).map(|_| Variable::new(next() * 20.0)).collect();
        let mut cons = Vec::new();
        for left in 0..12 {
            for right in left + 1..12 {
                if next() < 0.3 {
                    cons.push(Constraint::new(left, right, next() * 4.0));
                }
            }
        }
        let cost = |x: &[f64]| {
            x.iter()
                .zip(&vs)
                .map(|(x, v)| v.weight * (x - v.desired).powi(2))
                .sum::<f64>()
        };
        let feasible = satisfy(&vs, &cons).unwrap();
        let optimal = solve(&vs, &cons).unwrap();
        for c in &cons {
            assert!(optimal[c.right] - optimal[c.left] >= c.gap - 1e-6);
        }
        assert!(cost(&optimal) <= cost(&feasible) + 1e-6);
    }

    #[test]
    fn test_satisfy_is_feasible() {
        let cons = [
            Constraint::new(0, 1, 3.0),
            Constraint::new(0, 2, 1.0),
            Constraint::new(2, 1, 1.0),
        ];
        let x = satisfy(&vars(&[5.0, 0.0, 2.0]), &cons).unwrap();
        for c in cons {
            assert!(x[c.right] - x[c.left] >= c.gap - 1e-9, "{x:?}");
        }
    }

    #[test]
    fn test_cycle_is_dropped() {
        let cons = [
            Constraint::new(0, 1, 1.0),
            Constraint::new(1, 0, 1.0),
        ];
        let x = solve(&vars(&[0.0, 0.0]), &cons).unwrap();
        assert!(x.iter().all(|v| v.is_finite()));
        assert!(x[1] - x[0] >= 1.0 - 1e-9);
    }

    #[test]
    fn test_unknown_variable() {
        let err = solve(&vars(&[0.0]), &[Constraint::new(0, 3, 1.0)]).unwrap_err();
        assert!(matches!(err, LayoutError::UnknownVariable { variable: 3, .. }));
    }

    #[test]
    fn test_invalid_weight() {
        let err = solve(&[Variable::new(0.0).with_weight(0.0)], &[]).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidWeight(0)));
    }
}
