//! Depth-first branch-and-bound on top of the rational simplex, and the
//! exact lexicographic-minimum backend built from it.

use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::expr::AffineExpr;
use crate::solver::simplex::{minimize, LpOutcome};
use crate::solver::{IlpProblem, Solver};
use crate::utils::errors::{PolyResult, PolySchedError, SolverError, SolverErrorKind};
use log::{debug, trace};
use num_rational::BigRational;
use num_traits::ToPrimitive;

/// Default node budget for one lexmin stage.
pub const DEFAULT_NODE_LIMIT: usize = 20_000;

/// Answer to an integer feasibility question under a node budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feasibility<T> {
    Feasible(T),
    Infeasible,
    /// The node budget ran out before a point or a proof was found.
    Unknown,
}

/// Result of one integer program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IlpOutcome {
    Optimal(Vec<i64>),
    Infeasible,
    /// Budget exhausted; carries the best point seen so far.
    NodeLimit(Option<Vec<i64>>),
}

fn dot(obj: &[i64], x: &[i64]) -> i128 {
    obj.iter().zip(x).map(|(&a, &b)| a as i128 * b as i128).sum()
}

fn to_integers(point: &[BigRational]) -> PolyResult<Vec<i64>> {
    point
        .iter()
        .map(|v| {
            v.to_integer()
                .to_i64()
                .ok_or_else(|| PolySchedError::overflow("integer solution component"))
        })
        .collect()
}

/// `x_col <= bound` when `upper`, `x_col >= bound` otherwise.
fn branch_row(n: usize, col: usize, bound: i64, upper: bool) -> Constraint {
    let mut e = AffineExpr::zero(n, 0);
    if upper {
        e.coeffs[col] = -1;
        e.constant = bound;
    } else {
        e.coeffs[col] = 1;
        e.constant = -bound;
    }
    Constraint::ge_zero(e)
}

fn unbounded(backend: &str) -> PolySchedError {
    SolverError {
        message: "objective unbounded below".to_string(),
        kind: SolverErrorKind::Unbounded,
        backend: backend.to_string(),
    }
    .into()
}

/// Minimize `objective . x` over the non-negative integer points of `sys`.
///
/// `incumbent` is a known feasible integer point used for pruning.
pub fn branch_and_bound(
    sys: &ConstraintSystem,
    objective: &[i64],
    node_limit: usize,
    incumbent: Option<Vec<i64>>,
) -> PolyResult<IlpOutcome> {
    let n = sys.n_cols();
    let mut best: Option<(Vec<i64>, i128)> = incumbent.map(|x| {
        let v = dot(objective, &x);
        (x, v)
    });
    let mut stack: Vec<Vec<Constraint>> = vec![Vec::new()];
    let mut nodes = 0usize;

    while let Some(extra) = stack.pop() {
        nodes += 1;
        if nodes > node_limit {
            debug!("branch-and-bound hit node limit {}", node_limit);
            return Ok(IlpOutcome::NodeLimit(best.map(|(x, _)| x)));
        }
        let mut node = sys.clone();
        node.add_all(extra.iter().cloned());
        let (point, value) = match minimize(&node, objective) {
            LpOutcome::Infeasible => continue,
            LpOutcome::Unbounded => return Err(unbounded("exact")),
            LpOutcome::Optimal { point, value } => (point, value),
        };
        if let Some((_, best_value)) = &best {
            // Integer objective: anything with ceil(lp) >= best is no better.
            let bound = value.ceil().to_integer().to_i128().unwrap_or(i128::MAX);
            if bound >= *best_value {
                continue;
            }
        }
        match point.iter().position(|v| !v.is_integer()) {
            None => {
                let x = to_integers(&point)?;
                let v = dot(objective, &x);
                trace!("integer point with objective {} at node {}", v, nodes);
                best = Some((x, v));
            }
            Some(col) => {
                let floor = point[col]
                    .floor()
                    .to_integer()
                    .to_i64()
                    .ok_or_else(|| PolySchedError::overflow("branching bound"))?;
                let mut up = extra.clone();
                up.push(branch_row(n, col, floor + 1, false));
                let mut down = extra;
                down.push(branch_row(n, col, floor, true));
                stack.push(up);
                stack.push(down);
            }
        }
    }
    Ok(match best {
        Some((x, _)) => IlpOutcome::Optimal(x),
        None => IlpOutcome::Infeasible,
    })
}

/// First integer point found by depth-first search, with a node budget.
pub fn find_integer_point(sys: &ConstraintSystem, node_limit: usize) -> PolyResult<Feasibility<Vec<i64>>> {
    let n = sys.n_cols();
    let zero = vec![0; n];
    let mut stack: Vec<Vec<Constraint>> = vec![Vec::new()];
    let mut nodes = 0usize;
    while let Some(extra) = stack.pop() {
        nodes += 1;
        if nodes > node_limit {
            return Ok(Feasibility::Unknown);
        }
        let mut node = sys.clone();
        node.add_all(extra.iter().cloned());
        let point = match minimize(&node, &zero) {
            LpOutcome::Optimal { point, .. } => point,
            _ => continue,
        };
        match point.iter().position(|v| !v.is_integer()) {
            None => return Ok(Feasibility::Feasible(to_integers(&point)?)),
            Some(col) => {
                let Some(floor) = point[col].floor().to_integer().to_i64() else {
                    return Ok(Feasibility::Unknown);
                };
                let mut up = extra.clone();
                up.push(branch_row(n, col, floor + 1, false));
                let mut down = extra;
                down.push(branch_row(n, col, floor, true));
                stack.push(up);
                stack.push(down);
            }
        }
    }
    Ok(Feasibility::Infeasible)
}

/// Rational infeasibility of a system over non-negative columns.
pub fn is_lp_infeasible(sys: &ConstraintSystem) -> bool {
    matches!(minimize(sys, &vec![0; sys.n_cols()]), LpOutcome::Infeasible)
}

/// Exact backend: branch-and-bound per lexmin stage.
///
/// Each stage fixes the optimum of its objective before the next one runs.
/// A stage whose objective has non-negative coefficients and is already zero
/// at the incumbent is fixed without a solve.
#[derive(Debug, Clone)]
pub struct ExactSolver {
    node_limit: usize,
}

impl ExactSolver {
    pub fn new() -> Self {
        Self { node_limit: DEFAULT_NODE_LIMIT }
    }

    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = limit;
        self
    }

    fn node_limit_error(&self) -> PolySchedError {
        SolverError {
            message: format!("no integer point within {} nodes", self.node_limit),
            kind: SolverErrorKind::NodeLimit,
            backend: self.name().to_string(),
        }
        .into()
    }
}

impl Default for ExactSolver {
    fn default() -> Self { Self::new() }
}

impl Solver for ExactSolver {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn lexmin(&self, problem: &IlpProblem) -> PolyResult<Option<Vec<i64>>> {
        let mut sys = problem.constraints.clone();
        sys.simplify();
        if sys.is_trivially_infeasible() {
            return Ok(None);
        }
        let n = sys.n_cols();
        let mut incumbent: Option<Vec<i64>> = None;

        if problem.objectives.is_empty() {
            return match find_integer_point(&sys, self.node_limit)? {
                Feasibility::Feasible(x) => Ok(Some(x)),
                Feasibility::Infeasible => Ok(None),
                Feasibility::Unknown => Err(self.node_limit_error()),
            };
        }

        for obj in &problem.objectives {
            if let Some(x) = &incumbent {
                if obj.iter().all(|&c| c >= 0) && dot(obj, x) == 0 {
                    let mut fix = AffineExpr::zero(n, 0);
                    fix.coeffs.copy_from_slice(obj);
                    sys.add(Constraint::eq_zero(fix));
                    continue;
                }
            }
            let x = match branch_and_bound(&sys, obj, self.node_limit, incumbent.clone())? {
                IlpOutcome::Optimal(x) => x,
                IlpOutcome::Infeasible => return Ok(None),
                IlpOutcome::NodeLimit(Some(x)) => {
                    debug!("accepting best point found within the node limit");
                    x
                }
                IlpOutcome::NodeLimit(None) => return Err(self.node_limit_error()),
            };
            let value = i64::try_from(dot(obj, &x))
                .map_err(|_| PolySchedError::overflow("objective value"))?;
            let mut fix = AffineExpr::zero(n, 0);
            fix.coeffs.copy_from_slice(obj);
            fix.constant = -value;
            sys.add(Constraint::eq_zero(fix));
            incumbent = Some(x);
        }
        Ok(incumbent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ge(row: &[i64], n: usize) -> Constraint {
        Constraint::ge_zero(AffineExpr::from_row(row, n, 0))
    }

    #[test]
    fn test_branching_finds_integer_optimum() {
        // max x + y (min -x - y) s.t. 2x + 2y <= 5 has LP optimum 2.5, ILP 2
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(ge(&[-2, -2, 5], 2));
        match branch_and_bound(&sys, &[-1, -1], 100, None).unwrap() {
            IlpOutcome::Optimal(x) => assert_eq!(x[0] + x[1], 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_integer_infeasible() {
        // 1 <= 2x <= 1
        let mut sys = ConstraintSystem::new(1, 0);
        sys.add(Constraint::eq_zero(AffineExpr::from_row(&[2, -1], 1, 0)));
        assert_eq!(find_integer_point(&sys, 100).unwrap(), Feasibility::Infeasible);
        assert!(!is_lp_infeasible(&sys));
    }

    #[test]
    fn test_lexmin_order() {
        // x + y + z >= 2, x <= 1: lexmin over (z, y, x) gives (1, 1, 0)
        let mut problem = IlpProblem::new(3);
        problem.add(ge(&[1, 1, 1, -2], 3));
        problem.add(ge(&[-1, 0, 0, 1], 3));
        problem.push_objective(vec![0, 0, 1]);
        problem.push_objective(vec![0, 1, 0]);
        problem.push_objective(vec![1, 0, 0]);
        let x = ExactSolver::new().lexmin(&problem).unwrap().unwrap();
        assert_eq!(x, vec![1, 1, 0]);
    }

    #[test]
    fn test_lexmin_infeasible() {
        let mut problem = IlpProblem::new(1);
        problem.add(ge(&[-1, -1], 1));
        problem.push_objective(vec![1]);
        assert_eq!(ExactSolver::new().lexmin(&problem).unwrap(), None);
    }

    #[test]
    fn test_node_limit_reported() {
        let mut problem = IlpProblem::new(1);
        problem.add(ge(&[1, -1], 1));
        problem.push_objective(vec![1]);
        match ExactSolver::new().with_node_limit(0).lexmin(&problem) {
            Err(PolySchedError::Solver(e)) => assert_eq!(e.kind, SolverErrorKind::NodeLimit),
            other => panic!("unexpected {:?}", other),
        }
    }
}
