//! Lowering of parsed isl text to statements and dependences.
//!
//! Every tuple entry becomes one dimension. An entry that is a fresh name
//! names its dimension; any other entry is an affine expression and adds
//! the equality `dim = expr`, so `S0[i] -> S0[i + 1]` is the uniform
//! dependence of distance one.

use crate::analysis::{Dependence, DependenceKind, DependenceRelation};
use crate::frontend::parser::{Comparison, LinearForm, Piece, Relation, UnionText};
use crate::ir::pir::{PolyProgram, PolyStmt, StmtId};
use crate::polyhedral::{AffineExpr, Constraint, ConstraintSystem, IntegerSet, Space};
use crate::utils::errors::{InputError, InputErrorKind, ParseError, ParseErrorKind, PolyResult, PolySchedError};
use crate::utils::intern::SymbolInterner;
use log::debug;

/// Names visible inside one piece.
struct Scope<'a> {
    dims: Vec<Option<String>>,
    params: &'a [String],
}

impl<'a> Scope<'a> {
    fn n_dim(&self) -> usize {
        self.dims.len()
    }

    fn lookup_dim(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.as_deref() == Some(name))
    }

    fn resolve(&self, form: &LinearForm) -> PolyResult<AffineExpr> {
        let n_param = self.params.len();
        let mut expr = AffineExpr::constant(form.constant, self.n_dim(), n_param);
        for term in &form.terms {
            if let Some(d) = self.lookup_dim(&term.name) {
                expr.set_coeff(d, expr.coeff(d) + term.coeff);
            } else if let Some(p) = self.params.iter().position(|p| *p == term.name) {
                expr.set_param_coeff(p, expr.param_coeff(p) + term.coeff);
            } else {
                return Err(ParseError {
                    message: format!("Unknown name '{}'", term.name),
                    span: term.span,
                    kind: ParseErrorKind::UnknownName,
                    expected: Vec::new(),
                    found: Some(term.name.clone()),
                }
                .into());
            }
        }
        Ok(expr)
    }

    fn dim_names(&self) -> Vec<String> {
        self.dims
            .iter()
            .enumerate()
            .map(|(k, d)| d.clone().unwrap_or_else(|| format!("i{}", k)))
            .collect()
    }
}

/// The constraint system of a piece over its tuple dimensions.
fn piece_constraints(piece: &Piece, params: &[String]) -> PolyResult<(ConstraintSystem, Vec<String>)> {
    let mut scope = Scope { dims: Vec::new(), params };
    let mut pending = Vec::new();
    for tuple in &piece.tuples {
        for entry in &tuple.entries {
            let k = scope.dims.len();
            match entry.as_name() {
                Some(name) if scope.lookup_dim(name).is_none() && !params.iter().any(|p| p == name) => {
                    scope.dims.push(Some(name.to_string()));
                }
                _ => {
                    scope.dims.push(None);
                    pending.push((k, entry));
                }
            }
        }
    }

    let n_dim = scope.n_dim();
    let n_param = params.len();
    let mut sys = ConstraintSystem::new(n_dim, n_param);
    for (k, entry) in pending {
        let value = scope.resolve(entry)?;
        sys.add(Constraint::eq(AffineExpr::var(k, n_dim, n_param), value));
    }
    for Comparison { form, relation } in &piece.constraints {
        let expr = scope.resolve(form)?;
        sys.add(match relation {
            Relation::NonNegative => Constraint::ge_zero(expr),
            Relation::Zero => Constraint::eq_zero(expr),
        });
    }
    Ok((sys, scope.dim_names()))
}

fn shape_error(piece: &Piece, message: &str) -> PolySchedError {
    ParseError {
        message: message.to_string(),
        span: piece.span,
        kind: ParseErrorKind::UnexpectedToken,
        expected: Vec::new(),
        found: None,
    }
    .into()
}

/// `S<digits>` names carry their id; otherwise ids follow appearance order.
fn statement_ids(names: &SymbolInterner) -> Vec<StmtId> {
    let numbered: Option<Vec<u64>> = names
        .names()
        .iter()
        .map(|n| n.strip_prefix('S').and_then(|d| d.parse().ok()))
        .collect();
    match numbered {
        Some(ids) => ids.into_iter().map(StmtId).collect(),
        None => (0..names.len() as u64).map(StmtId).collect(),
    }
}

/// Build the program of a parsed union set.
pub fn lower_domains(text: &UnionText) -> PolyResult<PolyProgram> {
    let params = text.params.clone().unwrap_or_default();
    let mut names = SymbolInterner::new();
    for piece in &text.pieces {
        if piece.is_relation() {
            return Err(shape_error(piece, "Expected a set piece, found a relation"));
        }
        let name = &piece.tuples[0].name;
        if names.get(name).is_some() {
            return Err(InputError::new(
                InputErrorKind::DuplicateStatement,
                format!("statement {} is declared twice", name),
            )
            .into());
        }
        names.intern(name);
    }

    let ids = statement_ids(&names);
    let mut program = PolyProgram::new("domains".to_string()).with_parameters(params.clone());
    for (piece, id) in text.pieces.iter().zip(ids) {
        let (sys, dim_names) = piece_constraints(piece, &params)?;
        let space = Space::set_with_params(sys.n_dim, params.len());
        let domain = IntegerSet::from_constraints(space, sys)
            .with_dim_names(dim_names)
            .with_param_names(params.clone());
        program.add_statement(PolyStmt::new(id, piece.tuples[0].name.clone(), domain));
    }
    debug!("parsed {} statement domains over {} parameters", program.statements.len(), params.len());
    Ok(program)
}

/// Build flow dependences of a parsed union map against a program.
pub fn lower_dependences(text: &UnionText, program: &PolyProgram) -> PolyResult<Vec<Dependence>> {
    let params = match &text.params {
        Some(p) if *p != program.parameters => {
            return Err(InputError::new(
                InputErrorKind::ParameterMismatch,
                format!(
                    "dependences declare parameters [{}], domains declare [{}]",
                    p.join(", "),
                    program.parameters.join(", ")
                ),
            )
            .into());
        }
        _ => program.parameters.clone(),
    };

    let mut deps = Vec::with_capacity(text.pieces.len());
    for piece in &text.pieces {
        if !piece.is_relation() {
            return Err(shape_error(piece, "Expected a relation piece, found a set"));
        }
        let mut ends = Vec::with_capacity(2);
        for tuple in &piece.tuples {
            let stmt = program
                .statements
                .iter()
                .find(|s| s.name == tuple.name)
                .ok_or_else(|| {
                    InputError::new(InputErrorKind::UnknownStatement, format!("unknown statement {}", tuple.name))
                })?;
            if stmt.depth() != tuple.entries.len() {
                return Err(InputError::new(
                    InputErrorKind::DimensionMismatch,
                    format!("{} has {} iterators, tuple at {} has {}", stmt.name, stmt.depth(), tuple.span, tuple.entries.len()),
                )
                .into());
            }
            ends.push(stmt);
        }
        let (sys, _) = piece_constraints(piece, &params)?;
        let relation = DependenceRelation::new(ends[0].depth(), ends[1].depth(), sys);
        deps.push(Dependence::new(ends[0].id, ends[1].id, DependenceKind::Flow, relation));
    }
    debug!("parsed {} dependences", deps.len());
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_union;

    fn domains(source: &str) -> PolyResult<PolyProgram> {
        lower_domains(&parse_union(source)?)
    }

    #[test]
    fn test_domains_by_statement_number() {
        let program = domains("[N] -> { S1[i] : 0 <= i < N; S0[i, j] : 0 <= i, j < N }").unwrap();
        assert_eq!(program.parameters, vec!["N".to_string()]);
        assert_eq!(program.statements[0].id, StmtId(0));
        assert_eq!(program.statements[0].depth(), 2);
        assert_eq!(program.statements[1].id, StmtId(1));
        assert_eq!(program.statements[0].iterator_names(), vec!["i".to_string(), "j".to_string()]);
        assert!(program.statements[1].domain.contains(&[3], &[4]));
        assert!(!program.statements[1].domain.contains(&[4], &[4]));
    }

    #[test]
    fn test_domains_by_appearance_order() {
        let program = domains("{ init[i] : 0 <= i < 8; update[i] : 0 <= i < 8 }").unwrap();
        assert_eq!(program.get_stmt(StmtId(0)).unwrap().name, "init");
        assert_eq!(program.get_stmt(StmtId(1)).unwrap().name, "update");
    }

    #[test]
    fn test_duplicate_statement() {
        let err = domains("{ S0[i]; S0[j] }").unwrap_err();
        assert!(matches!(err, PolySchedError::Input(ref e) if e.kind == InputErrorKind::DuplicateStatement));
    }

    #[test]
    fn test_unknown_name_in_domain() {
        let err = domains("{ S0[i] : i < N }").unwrap_err();
        assert!(matches!(err, PolySchedError::Parse(ref e) if e.kind == ParseErrorKind::UnknownName));
    }

    #[test]
    fn test_uniform_dependence_from_expression_entry() {
        let program = domains("[N] -> { S0[i] : 0 <= i < N }").unwrap();
        let text = parse_union("[N] -> { S0[i] -> S0[i + 1] }").unwrap();
        let deps = lower_dependences(&text, &program).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].kind, DependenceKind::Flow);
        assert_eq!(deps[0].distance, Some(vec![1]));
    }

    #[test]
    fn test_primed_target_iterators() {
        let program = domains("{ S0[i, j] : 0 <= i, j < 4; S1[i, j] : 0 <= i, j < 4 }").unwrap();
        let text = parse_union("{ S0[i, j] -> S1[i', j'] : i' = i + 1 and j' = j }").unwrap();
        let deps = lower_dependences(&text, &program).unwrap();
        assert_eq!(deps[0].source, StmtId(0));
        assert_eq!(deps[0].target, StmtId(1));
        assert_eq!(deps[0].distance, Some(vec![1, 0]));
        assert!(deps[0].relation.contains(&[0, 2], &[1, 2], &[]));
    }

    #[test]
    fn test_dependence_errors() {
        let program = domains("[N] -> { S0[i] : 0 <= i < N }").unwrap();
        let unknown = lower_dependences(&parse_union("[N] -> { S0[i] -> S9[i] }").unwrap(), &program).unwrap_err();
        assert!(matches!(unknown, PolySchedError::Input(ref e) if e.kind == InputErrorKind::UnknownStatement));

        let arity = lower_dependences(&parse_union("{ S0[i] -> S0[i, 0] }").unwrap(), &program).unwrap_err();
        assert!(matches!(arity, PolySchedError::Input(ref e) if e.kind == InputErrorKind::DimensionMismatch));

        let params = lower_dependences(&parse_union("[M] -> { S0[i] -> S0[i + 1] }").unwrap(), &program).unwrap_err();
        assert!(matches!(params, PolySchedError::Input(ref e) if e.kind == InputErrorKind::ParameterMismatch));

        let shape = lower_dependences(&parse_union("{ S0[i] }").unwrap(), &program).unwrap_err();
        assert!(matches!(shape, PolySchedError::Parse(_)));
    }
}
