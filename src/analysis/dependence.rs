//! Dependences between statement instances.
//!
//! A dependence is an edge `source -> target` carrying a polyhedron of
//! instance pairs over `[source iterators, target iterators]` plus the
//! program parameters. Uniform dependences also record their distance.

use crate::ir::pir::StmtId;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::set::IntegerSet;
use crate::polyhedral::space::Space;
use crate::utils::errors::PolyResult;
use serde::{Serialize, Deserialize};

/// A data dependence between two statement instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependence {
    /// Source statement
    pub source: StmtId,
    /// Target statement
    pub target: StmtId,
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Dependence polyhedron (pairs of iterations with dependence)
    pub relation: DependenceRelation,
    /// Distance vector (if uniform)
    pub distance: Option<Vec<i64>>,
}

impl Dependence {
    /// A dependence over an arbitrary polyhedron. The distance vector is
    /// recovered when the equalities pin every `t_k - s_k` to a constant.
    pub fn new(source: StmtId, target: StmtId, kind: DependenceKind, relation: DependenceRelation) -> Self {
        let distance = relation.uniform_distance();
        Self { source, target, kind, relation, distance }
    }

    /// A uniform dependence `t = s + distance`, unbounded until it is
    /// intersected with the statement domains.
    pub fn uniform(
        source: StmtId,
        target: StmtId,
        kind: DependenceKind,
        distance: &[i64],
        n_param: usize,
    ) -> Self {
        let d = distance.len();
        let mut sys = ConstraintSystem::new(2 * d, n_param);
        for (k, &dist) in distance.iter().enumerate() {
            // t_k - s_k - dist = 0
            let mut expr = AffineExpr::var(d + k, 2 * d, n_param) - AffineExpr::var(k, 2 * d, n_param);
            expr.constant = -dist;
            sys.add(Constraint::eq_zero(expr));
        }
        Self {
            source,
            target,
            kind,
            relation: DependenceRelation::new(d, d, sys),
            distance: Some(distance.to_vec()),
        }
    }

    /// Does the dependence connect a statement to itself?
    pub fn is_self(&self) -> bool {
        self.source == self.target
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        let kind_str = match self.kind {
            DependenceKind::Flow => "flow (RAW)",
            DependenceKind::Anti => "anti (WAR)",
            DependenceKind::Output => "output (WAW)",
            DependenceKind::Input => "input (RAR)",
        };
        match &self.distance {
            Some(d) => format!("{} -> {} [{}] distance ({})", self.source, self.target, kind_str,
                d.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")),
            None => format!("{} -> {} [{}]", self.source, self.target, kind_str),
        }
    }
}

/// Kind of data dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependenceKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
    /// Read-after-read (input dependence, not a true dependence)
    Input,
}

impl DependenceKind {
    /// Check if this is a "true" dependence that must be respected.
    pub fn is_true_dependence(&self) -> bool {
        !matches!(self, DependenceKind::Input)
    }

    /// Get short name for the dependence kind.
    pub fn short_name(&self) -> &'static str {
        match self {
            DependenceKind::Flow => "RAW",
            DependenceKind::Anti => "WAR",
            DependenceKind::Output => "WAW",
            DependenceKind::Input => "RAR",
        }
    }
}

/// A dependence relation between iterations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenceRelation {
    /// Number of source dimensions
    pub src_dim: usize,
    /// Number of target dimensions
    pub tgt_dim: usize,
    /// Number of parameters
    pub n_param: usize,
    /// The set of (source_iter, target_iter) pairs where dependence exists
    pub pairs: IntegerSet,
}

impl DependenceRelation {
    /// Wrap a constraint system over `[source, target]` dimensions.
    pub fn new(src_dim: usize, tgt_dim: usize, constraints: ConstraintSystem) -> Self {
        debug_assert_eq!(constraints.n_dim, src_dim + tgt_dim);
        let n_param = constraints.n_param;
        Self {
            src_dim,
            tgt_dim,
            n_param,
            pairs: IntegerSet::from_constraints(Space::set_with_params(src_dim + tgt_dim, n_param), constraints),
        }
    }

    /// Create an empty dependence relation.
    pub fn empty(src_dim: usize, tgt_dim: usize, n_param: usize) -> Self {
        Self::new(src_dim, tgt_dim, ConstraintSystem::infeasible(src_dim + tgt_dim, n_param))
    }

    /// Create a universe (all pairs) dependence relation.
    pub fn universe(src_dim: usize, tgt_dim: usize, n_param: usize) -> Self {
        Self::new(src_dim, tgt_dim, ConstraintSystem::new(src_dim + tgt_dim, n_param))
    }

    pub fn n_dim(&self) -> usize {
        self.src_dim + self.tgt_dim
    }

    pub fn constraints(&self) -> &ConstraintSystem {
        &self.pairs.constraints
    }

    /// Integer emptiness (no dependence).
    pub fn is_empty(&self) -> PolyResult<bool> {
        self.pairs.is_empty()
    }

    /// Check if a specific (source, target) pair is in the relation.
    pub fn contains(&self, src_point: &[i64], tgt_point: &[i64], params: &[i64]) -> bool {
        let mut combined = src_point.to_vec();
        combined.extend_from_slice(tgt_point);
        self.pairs.contains(&combined, params)
    }

    /// Embed an expression over source iterators into the pair space.
    pub fn lift_source(&self, expr: &AffineExpr) -> AffineExpr {
        expr.insert_dims(self.src_dim, self.tgt_dim)
    }

    /// Embed an expression over target iterators into the pair space.
    pub fn lift_target(&self, expr: &AffineExpr) -> AffineExpr {
        expr.insert_dims(0, self.src_dim)
    }

    /// Embed constraints over source iterators into the pair space.
    pub fn lift_source_constraints(&self, sys: &ConstraintSystem) -> ConstraintSystem {
        sys.insert_dims(self.src_dim, self.tgt_dim)
    }

    /// Embed constraints over target iterators into the pair space.
    pub fn lift_target_constraints(&self, sys: &ConstraintSystem) -> ConstraintSystem {
        sys.insert_dims(0, self.src_dim)
    }

    /// `phi_T(t) - phi_S(s)` over the pair space.
    pub fn difference(&self, source_row: &AffineExpr, target_row: &AffineExpr) -> AffineExpr {
        self.lift_target(target_row) - self.lift_source(source_row)
    }

    /// Constant `t_k - s_k` for every `k`, read off the equalities.
    pub fn uniform_distance(&self) -> Option<Vec<i64>> {
        if self.src_dim != self.tgt_dim {
            return None;
        }
        let d = self.src_dim;
        let mut distance = Vec::with_capacity(d);
        for k in 0..d {
            let found = self.constraints().equalities().find_map(|c| {
                let e = &c.expr;
                let a = e.coeff(d + k);
                let pinned = (a == 1 || a == -1)
                    && e.coeff(k) == -a
                    && (0..2 * d).all(|col| col == k || col == d + k || e.coeff(col) == 0)
                    && (0..e.n_param()).all(|p| e.param_coeff(p) == 0);
                // a * (t - s) + c = 0
                pinned.then(|| -e.constant * a)
            });
            distance.push(found?);
        }
        Some(distance)
    }
}
