//! Frontend: reading and printing the isl notation subset.
//!
//! Domains are a union set, dependences a union map, schedules are
//! printed back as a union map:
//!
//! ```text
//! [N] -> { S0[i, j] : 0 <= i, j < N; S1[i, j] : 0 <= i, j < N }
//! [N] -> { S0[i, j] -> S1[i', j'] : i' = i + 1 and j' = j }
//! [N] -> { S0[i, j] -> [i + 1, j, 0]; S1[i, j] -> [i, j, 1] }
//! ```

pub mod token;
pub mod lexer;
pub mod parser;
pub mod lower;
pub mod printer;

// Re-exports
pub use lexer::Lexer;
pub use parser::{parse_union, Parser, UnionText};
pub use printer::{print_domains, print_parallel_loops, print_schedule};
pub use token::{Token, TokenKind};
pub use crate::utils::errors::ParseError;

use crate::analysis::Dependence;
use crate::ir::pir::PolyProgram;
use crate::utils::errors::PolyResult;

/// Parse statement domains into a program.
pub fn parse_domains(source: &str) -> PolyResult<PolyProgram> {
    lower::lower_domains(&parse_union(source)?)
}

/// Parse flow dependences between the statements of `program`.
pub fn parse_dependences(source: &str, program: &PolyProgram) -> PolyResult<Vec<Dependence>> {
    lower::lower_dependences(&parse_union(source)?, program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let program = parse_domains("[N] -> { S0[i] : 0 <= i < N }").unwrap();
        let deps = parse_dependences("[N] -> { S0[i] -> S0[i'] : i' = i + 1 }", &program).unwrap();
        assert_eq!(program.statements.len(), 1);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_empty_dependences() {
        let program = parse_domains("{ S0[i] : 0 <= i < 4 }").unwrap();
        assert!(parse_dependences("{ }", &program).unwrap().is_empty());
    }
}
