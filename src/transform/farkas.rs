//! Legality constraints through the affine form of the Farkas lemma.
//!
//! For a dependence polyhedron `P` and an affine form `f` whose coefficients
//! are linear in the unknown schedule coefficients, `f >= 0` on all of `P`
//! iff `f = lambda_0 + sum_k lambda_k * facet_k` with non-negative
//! multipliers for the inequalities of `P`. Equating coefficients and
//! projecting the multipliers out leaves constraints on the unknowns only.
//!
//! Unknown layout of a cluster problem:
//!
//! ```text
//! [u_1 .. u_np, w, block(S_a), block(S_b), ...]
//! block(S) = [c_1+ .. c_d+, (c_1- .. c_d-), p_1 .. p_np, c_0]
//! ```
//!
//! Every unknown is non-negative. The negative parts only exist when
//! negative coefficients are allowed.

use crate::ir::pir::PolyStmt;
use crate::options::SchedulerOptions;
use crate::polyhedral::constraint::{Constraint, ConstraintKind, ConstraintSystem};
use crate::polyhedral::expr::{narrow, AffineExpr};
use crate::solver::IlpProblem;
use crate::utils::errors::{PolyResult, PolySchedError};
use crate::utils::matrix::{integer_direction, RationalMatrix};
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Unknowns of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtBlock {
    /// Statement position in the program
    pub stmt: usize,
    /// Number of iterators
    pub depth: usize,
    /// First column of the block
    pub offset: usize,
}

/// Column layout of the unknown coefficient vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoeffLayout {
    pub n_param: usize,
    pub negatives: bool,
    pub blocks: Vec<StmtBlock>,
    n_vars: usize,
}

impl CoeffLayout {
    /// Layout for `(statement, depth)` pairs, in the given order. A statement
    /// listed twice gets a single block.
    pub fn new(stmts: &[(usize, usize)], n_param: usize, negatives: bool) -> Self {
        let mut blocks: Vec<StmtBlock> = Vec::with_capacity(stmts.len());
        let mut offset = n_param + 1;
        for &(stmt, depth) in stmts {
            if blocks.iter().any(|b| b.stmt == stmt) {
                continue;
            }
            blocks.push(StmtBlock { stmt, depth, offset });
            offset += Self::block_len_for(depth, n_param, negatives);
        }
        Self { n_param, negatives, blocks, n_vars: offset }
    }

    fn block_len_for(depth: usize, n_param: usize, negatives: bool) -> usize {
        depth * if negatives { 2 } else { 1 } + n_param + 1
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn u(&self, p: usize) -> usize {
        p
    }

    pub fn w(&self) -> usize {
        self.n_param
    }

    pub fn block(&self, stmt: usize) -> Option<&StmtBlock> {
        self.blocks.iter().find(|b| b.stmt == stmt)
    }

    pub fn iter_pos(&self, b: &StmtBlock, j: usize) -> usize {
        b.offset + j
    }

    pub fn iter_neg(&self, b: &StmtBlock, j: usize) -> Option<usize> {
        self.negatives.then(|| b.offset + b.depth + j)
    }

    pub fn param(&self, b: &StmtBlock, p: usize) -> usize {
        b.offset + b.depth * if self.negatives { 2 } else { 1 } + p
    }

    pub fn constant(&self, b: &StmtBlock) -> usize {
        self.param(b, self.n_param)
    }

    fn unit(&self, col: usize) -> AffineExpr {
        AffineExpr::var(col, self.n_vars, 0)
    }

    /// `c_j+ - c_j-` as a linear form over the unknowns.
    pub fn iterator_form(&self, b: &StmtBlock, j: usize) -> AffineExpr {
        let mut e = self.unit(self.iter_pos(b, j));
        if let Some(neg) = self.iter_neg(b, j) {
            e.coeffs[neg] = -1;
        }
        e
    }

    /// Read a statement's schedule row out of a solution.
    pub fn row_of(&self, b: &StmtBlock, solution: &[i64]) -> AffineExpr {
        let mut row = AffineExpr::zero(b.depth, self.n_param);
        for j in 0..b.depth {
            let neg = self.iter_neg(b, j).map_or(0, |c| solution[c]);
            row.coeffs[j] = solution[self.iter_pos(b, j)] - neg;
        }
        for p in 0..self.n_param {
            row.param_coeffs[p] = solution[self.param(b, p)];
        }
        row.constant = solution[self.constant(b)];
        row
    }

    /// Lexicographic objective order: bounding function first, then the
    /// size of every statement's hyperplane, then every column individually
    /// (negative parts before positive parts, innermost iterator first) so
    /// the optimum is unique and a reversal is only chosen when it pays.
    pub fn objectives(&self) -> Vec<Vec<i64>> {
        let unit = |col: usize| {
            let mut v = vec![0; self.n_vars];
            v[col] = 1;
            v
        };
        let mut objectives: Vec<Vec<i64>> = (0..self.n_param).map(|p| unit(self.u(p))).collect();
        objectives.push(unit(self.w()));
        for b in &self.blocks {
            let mut sum = vec![0; self.n_vars];
            for j in 0..b.depth {
                sum[self.iter_pos(b, j)] = 1;
                if let Some(neg) = self.iter_neg(b, j) {
                    sum[neg] = 1;
                }
            }
            objectives.push(sum);
        }
        for b in &self.blocks {
            for j in (0..b.depth).rev() {
                if let Some(neg) = self.iter_neg(b, j) {
                    objectives.push(unit(neg));
                }
            }
            for j in (0..b.depth).rev() {
                objectives.push(unit(self.iter_pos(b, j)));
            }
            for p in 0..self.n_param {
                objectives.push(unit(self.param(b, p)));
            }
            objectives.push(unit(self.constant(b)));
        }
        objectives
    }

    /// For every column of `self`, the column of `local` holding the same
    /// unknown (`None` when `local` does not have it).
    pub fn column_map(&self, local: &CoeffLayout) -> Vec<Option<usize>> {
        let mut map: Vec<Option<usize>> = vec![None; self.n_vars];
        for col in 0..=self.n_param {
            map[col] = Some(col);
        }
        for b in &self.blocks {
            if let Some(lb) = local.block(b.stmt) {
                let len = Self::block_len_for(b.depth, self.n_param, self.negatives);
                for i in 0..len {
                    map[b.offset + i] = Some(lb.offset + i);
                }
            }
        }
        map
    }
}

/// An affine form over the pair space whose coefficients are linear forms
/// in the unknowns: `f(x) = sum_l cols[l](c) * x_l + constant(c)`.
#[derive(Debug, Clone)]
pub struct ParametricForm {
    pub cols: Vec<AffineExpr>,
    pub constant: AffineExpr,
}

impl ParametricForm {
    /// `phi_T(t) - phi_S(s)` over `[s, t, params]`.
    pub fn legality(layout: &CoeffLayout, src: &StmtBlock, tgt: &StmtBlock) -> Self {
        let mut cols = Vec::with_capacity(src.depth + tgt.depth + layout.n_param);
        for j in 0..src.depth {
            cols.push(-layout.iterator_form(src, j));
        }
        for j in 0..tgt.depth {
            cols.push(layout.iterator_form(tgt, j));
        }
        for p in 0..layout.n_param {
            cols.push(layout.unit(layout.param(tgt, p)) - layout.unit(layout.param(src, p)));
        }
        // For a self dependence the shifts cancel.
        let constant = layout.unit(layout.constant(tgt)) - layout.unit(layout.constant(src));
        Self { cols, constant }
    }

    /// `u . p + w - f`.
    pub fn bounding(layout: &CoeffLayout, legality: &ParametricForm, n_iter: usize) -> Self {
        let mut out = Self {
            cols: legality.cols.iter().map(|c| -c.clone()).collect(),
            constant: -legality.constant.clone(),
        };
        for p in 0..layout.n_param {
            out.cols[n_iter + p].coeffs[layout.u(p)] += 1;
        }
        out.constant.coeffs[layout.w()] += 1;
        out
    }
}

fn find_unit_equality(rows: &[(Vec<i64>, ConstraintKind)], n_cols: usize) -> Option<(usize, usize)> {
    rows.iter().enumerate().find_map(|(r, (row, kind))| {
        if *kind != ConstraintKind::Equality {
            return None;
        }
        (0..n_cols).find(|&j| row[j] == 1 || row[j] == -1).map(|j| (r, j))
    })
}

/// Constraints on the unknowns equivalent to `form >= 0` on every point of
/// `poly`. An empty polyhedron yields no constraints.
pub fn farkas_constraints(poly: &ConstraintSystem, form: &ParametricForm, n_vars: usize) -> PolyResult<Vec<Constraint>> {
    let mut poly = poly.clone();
    poly.simplify();
    if poly.is_trivially_infeasible() {
        return Ok(Vec::new());
    }
    let nc = poly.n_cols();
    debug_assert_eq!(form.cols.len(), nc);
    let mut rows: Vec<(Vec<i64>, ConstraintKind)> =
        poly.constraints.iter().map(|c| (c.expr.to_row(), c.kind)).collect();
    let mut form = form.clone();

    // x_j = -a_j * (rest) for every unit-coefficient equality
    while let Some((r, j)) = find_unit_equality(&rows, nc) {
        let (pivot, _) = rows.remove(r);
        let a = pivot[j];
        for (row, _) in rows.iter_mut() {
            let q = row[j];
            if q == 0 {
                continue;
            }
            for l in 0..=nc {
                row[l] = narrow(row[l] as i128 - (q as i128 * a as i128) * pivot[l] as i128, "farkas substitution")?;
            }
        }
        let fj = form.cols[j].clone();
        if !fj.is_zero() {
            for l in 0..nc {
                if pivot[l] != 0 {
                    form.cols[l] = form.cols[l].combine(1, &fj, -(a * pivot[l]))?;
                }
            }
            form.constant = form.constant.combine(1, &fj, -(a * pivot[nc]))?;
        }
    }

    let mut kept = Vec::with_capacity(rows.len());
    for (row, kind) in rows {
        if row[..nc].iter().all(|&v| v == 0) {
            let holds = match kind {
                ConstraintKind::Inequality => row[nc] >= 0,
                ConstraintKind::Equality => row[nc] == 0,
            };
            if !holds {
                return Ok(Vec::new());
            }
            continue;
        }
        kept.push((row, kind));
    }
    let rows = kept;

    let m = rows.len();
    let total = n_vars + m;
    let mut sys = ConstraintSystem::new(total, 0);
    for l in 0..nc {
        let mut expr = form.cols[l].insert_dims(n_vars, m);
        let mut used = !form.cols[l].is_zero();
        for (k, (row, _)) in rows.iter().enumerate() {
            if row[l] != 0 {
                expr.coeffs[n_vars + k] = -row[l];
                used = true;
            }
        }
        if used {
            sys.add(Constraint::eq_zero(expr));
        }
    }
    let mut expr = form.constant.insert_dims(n_vars, m);
    for (k, (row, _)) in rows.iter().enumerate() {
        expr.coeffs[n_vars + k] = -row[nc];
    }
    sys.add(Constraint::ge_zero(expr));
    for (k, (_, kind)) in rows.iter().enumerate() {
        if *kind == ConstraintKind::Inequality {
            sys.add(Constraint::lower_bound(n_vars + k, 0, total, 0));
        }
    }

    let multipliers: Vec<usize> = (n_vars..total).collect();
    let projected = sys.project_out(&multipliers)?;
    trace!("farkas: {} facets -> {} constraints", m, projected.len());
    Ok(projected.constraints)
}

/// The slice of a dependence the constraint builder needs.
#[derive(Debug, Clone, Copy)]
pub struct DepView<'a> {
    /// Position in the scheduler's dependence list
    pub id: usize,
    pub src: usize,
    pub tgt: usize,
    /// Pairs not ordered before the current band
    pub residual: &'a ConstraintSystem,
}

/// A statement and the schedule rows it has so far.
#[derive(Debug, Clone, Copy)]
pub struct StmtView<'a> {
    pub index: usize,
    pub depth: usize,
    pub rows: &'a [AffineExpr],
}

impl<'a> StmtView<'a> {
    pub fn of(index: usize, stmt: &'a PolyStmt) -> Self {
        Self { index, depth: stmt.depth(), rows: &stmt.schedule.outputs }
    }
}

/// What the cluster problem is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemMode {
    /// Lexicographically minimal legal, independent hyperplanes
    Hyperplane,
    /// Feasibility of a hyperplane that carries no dependence (`u = w = 0`)
    Parallel,
    /// Minimal hyperplanes that strictly order every pair of every dependence
    Carrying,
}

/// Rank of the iterator parts of a statement's rows.
pub fn iterator_rank(depth: usize, rows: &[AffineExpr]) -> usize {
    if depth == 0 || rows.is_empty() {
        return 0;
    }
    let data: Vec<Vec<i64>> = rows.iter().map(|r| r.coeffs.clone()).collect();
    RationalMatrix::from_vec(data, depth).rank()
}

/// Integer basis of the orthogonal complement of a statement's rows, empty
/// when the rows already have full rank. Each direction is oriented to
/// have a positive leading sum.
pub fn orthogonal_directions(depth: usize, rows: &[AffineExpr]) -> Vec<Vec<i64>> {
    let data: Vec<Vec<i64>> = rows.iter().map(|r| r.coeffs.clone()).collect();
    let h = RationalMatrix::from_vec(data, depth);
    h.null_space()
        .iter()
        .filter_map(|v| integer_direction(v))
        .map(|v| {
            let sum: i64 = v.iter().sum();
            let first = v.iter().copied().find(|&x| x != 0).unwrap_or(0);
            if sum < 0 || (sum == 0 && first < 0) {
                v.iter().map(|&x| -x).collect()
            } else {
                v
            }
        })
        .collect()
}

type CacheKey = (usize, usize, bool);

/// Builds cluster problems, caching the Farkas constraints of every
/// dependence for the current band.
#[derive(Debug)]
pub struct ConstraintBuilder {
    n_param: usize,
    coeff_bound: i64,
    negatives: bool,
    param_coeffs: bool,
    dep_bound: bool,
    band_start: usize,
    cache: Mutex<HashMap<CacheKey, Arc<(CoeffLayout, Vec<Constraint>)>>>,
}

impl ConstraintBuilder {
    pub fn new(n_param: usize, options: &SchedulerOptions) -> Self {
        Self {
            n_param,
            coeff_bound: options.coeff_bound,
            negatives: options.allow_negative_coeffs,
            param_coeffs: options.allow_param_coeffs,
            dep_bound: !options.no_dep_bound,
            band_start: 0,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Start a new band: residuals change, so cached entries are dropped.
    pub fn start_band(&mut self, band_start: usize) {
        if band_start != self.band_start {
            self.band_start = band_start;
            if let Ok(mut cache) = self.cache.lock() {
                cache.clear();
            }
        }
    }

    pub fn band_start(&self) -> usize {
        self.band_start
    }

    /// Legality (and bounding) constraints of one dependence in its local
    /// layout `[u, w, block(src), block(tgt)]`. With `strict` the form must be
    /// at least one on every pair.
    pub fn dependence_constraints(
        &self,
        dep: &DepView<'_>,
        src_depth: usize,
        tgt_depth: usize,
        strict: bool,
    ) -> PolyResult<Arc<(CoeffLayout, Vec<Constraint>)>> {
        let key = (dep.id, self.band_start, strict);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let layout = CoeffLayout::new(&[(dep.src, src_depth), (dep.tgt, tgt_depth)], self.n_param, self.negatives);
        let (src, tgt) = match (layout.block(dep.src), layout.block(dep.tgt)) {
            (Some(s), Some(t)) => (*s, *t),
            _ => return Ok(Arc::new((layout, Vec::new()))),
        };
        let legality = ParametricForm::legality(&layout, &src, &tgt);
        let mut constraints = if strict {
            let mut carried = legality.clone();
            carried.constant.constant -= 1;
            farkas_constraints(dep.residual, &carried, layout.n_vars())?
        } else {
            farkas_constraints(dep.residual, &legality, layout.n_vars())?
        };
        if self.dep_bound {
            let bounding = ParametricForm::bounding(&layout, &legality, src_depth + tgt_depth);
            constraints.extend(farkas_constraints(dep.residual, &bounding, layout.n_vars())?);
        }
        trace!("dependence {}: {} constraints for band at {}", dep.id, constraints.len(), self.band_start);

        let entry = Arc::new((layout, constraints));
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, entry.clone());
        }
        Ok(entry)
    }

    /// The integer program for one cluster.
    ///
    /// Every statement short of full rank needs a row outside the span of
    /// its current rows. Without negative coefficients the orthogonal
    /// directions are oriented and `v . c >= 0` for each of them with a
    /// positive sum suffices. With negative coefficients a pair of 0/1
    /// choice columns per direction, appended after the layout, selects
    /// `v . c >= 1` or `v . c <= -1`, and at least one choice must hold.
    pub fn cluster_problem(
        &self,
        stmts: &[StmtView<'_>],
        deps: &[DepView<'_>],
        mode: ProblemMode,
    ) -> PolyResult<(CoeffLayout, IlpProblem)> {
        let pairs: Vec<(usize, usize)> = stmts.iter().map(|s| (s.index, s.depth)).collect();
        let layout = CoeffLayout::new(&pairs, self.n_param, self.negatives);
        let n = layout.n_vars();
        let mut constraints: Vec<Constraint> = Vec::new();
        let depth_of = |stmt: usize| stmts.iter().find(|s| s.index == stmt).map(|s| s.depth);

        for dep in deps {
            let (Some(ds), Some(dt)) = (depth_of(dep.src), depth_of(dep.tgt)) else {
                continue;
            };
            let entry = self.dependence_constraints(dep, ds, dt, mode == ProblemMode::Carrying)?;
            let (local, dep_constraints) = (&entry.0, &entry.1);
            let map = layout.column_map(local);
            for c in dep_constraints {
                constraints.push(Constraint::new(c.expr.remap_dims(&map), c.kind));
            }
        }

        for col in 0..n {
            constraints.push(Constraint::upper_bound(col, self.coeff_bound, n, 0));
        }

        // (v . c, bound on |v . c|) per direction, per statement
        let mut choices: Vec<Vec<(AffineExpr, i64)>> = Vec::new();
        for s in stmts {
            let Some(b) = layout.block(s.index) else { continue };
            if !self.param_coeffs {
                for p in 0..self.n_param {
                    constraints.push(Constraint::eq_zero(layout.unit(layout.param(b, p))));
                }
            }
            if iterator_rank(s.depth, s.rows) == s.depth {
                continue;
            }
            let mut total = AffineExpr::zero(n, 0);
            let mut any = Vec::new();
            for v in orthogonal_directions(s.depth, s.rows) {
                let mut dot = AffineExpr::zero(n, 0);
                for (j, &vj) in v.iter().enumerate() {
                    if vj != 0 {
                        dot = dot.combine(1, &layout.iterator_form(b, j), vj)?;
                    }
                }
                if self.negatives {
                    let reach: i64 = v.iter().map(|x| x.abs()).sum();
                    let big = reach
                        .checked_mul(self.coeff_bound)
                        .and_then(|m| m.checked_add(1))
                        .ok_or_else(|| PolySchedError::overflow("independence bound"))?;
                    any.push((dot, big));
                } else {
                    total = total.combine(1, &dot, 1)?;
                    constraints.push(Constraint::ge_zero(dot));
                }
            }
            if self.negatives {
                choices.push(any);
            } else {
                total.constant = -1;
                constraints.push(Constraint::ge_zero(total));
            }
        }

        let n_choice: usize = choices.iter().map(|c| 2 * c.len()).sum();
        let width = n + n_choice;
        let mut problem = IlpProblem::new(width);
        for c in constraints {
            let expr = if n_choice > 0 { c.expr.insert_dims(n, n_choice) } else { c.expr };
            problem.add(Constraint::new(expr, c.kind));
        }
        let mut col = n;
        for any in choices {
            let mut at_least_one = AffineExpr::zero(width, 0);
            for (dot, big) in any {
                let dot = dot.insert_dims(n, n_choice);
                let (up, down) = (col, col + 1);
                col += 2;
                // up = 1 forces v . c >= 1, down = 1 forces v . c <= -1
                let mut above = dot.clone();
                above.coeffs[up] = -big;
                above.constant = big - 1;
                let mut below = -dot;
                below.coeffs[down] = -big;
                below.constant = big - 1;
                problem.add(Constraint::ge_zero(above));
                problem.add(Constraint::ge_zero(below));
                problem.add(Constraint::upper_bound(up, 1, width, 0));
                problem.add(Constraint::upper_bound(down, 1, width, 0));
                at_least_one.coeffs[up] = 1;
                at_least_one.coeffs[down] = 1;
            }
            at_least_one.constant = -1;
            problem.add(Constraint::ge_zero(at_least_one));
        }

        match mode {
            ProblemMode::Hyperplane | ProblemMode::Carrying => {
                for mut objective in layout.objectives() {
                    objective.resize(width, 0);
                    problem.push_objective(objective);
                }
            }
            ProblemMode::Parallel => {
                for p in 0..self.n_param {
                    problem.add(Constraint::eq_zero(AffineExpr::var(layout.u(p), width, 0)));
                }
                problem.add(Constraint::eq_zero(AffineExpr::var(layout.w(), width, 0)));
            }
        }
        Ok((layout, problem))
    }
}
