//! Printing schedules and domains in isl notation.

use crate::ir::pir::{PolyProgram, PolyStmt};
use crate::transform::Schedule;

fn with_params(params: &[String], pieces: Vec<String>) -> String {
    let body = if pieces.is_empty() {
        "{  }".to_string()
    } else {
        format!("{{ {} }}", pieces.join("; "))
    };
    if params.is_empty() {
        body
    } else {
        format!("[{}] -> {}", params.join(", "), body)
    }
}

fn tuple(stmt: &PolyStmt) -> String {
    format!("{}[{}]", stmt.name, stmt.iterator_names().join(", "))
}

/// `[N] -> { S0[i, j] -> [0, i, j]; ... }`
pub fn print_schedule(schedule: &Schedule) -> String {
    let pieces = schedule
        .statements
        .iter()
        .map(|stmt| {
            let names = stmt.iterator_names();
            let rows: Vec<String> = stmt
                .schedule
                .outputs
                .iter()
                .map(|e| e.to_string_with_names(&names, &schedule.parameters))
                .collect();
            format!("{} -> [{}]", tuple(stmt), rows.join(", "))
        })
        .collect();
    with_params(&schedule.parameters, pieces)
}

/// `[N] -> { S0[i] : i >= 0 and -i + N - 1 >= 0; ... }`
pub fn print_domains(program: &PolyProgram) -> String {
    let pieces = program
        .statements
        .iter()
        .map(|stmt| {
            let constraints = &stmt.domain.constraints;
            if constraints.is_empty() {
                tuple(stmt)
            } else {
                let names = stmt.iterator_names();
                format!("{} : {}", tuple(stmt), constraints.to_string_with_names(&names, &program.parameters))
            }
        })
        .collect();
    with_params(&program.parameters, pieces)
}

/// Zero-based parallel rows, comma separated.
pub fn print_parallel_loops(schedule: &Schedule) -> String {
    schedule
        .parallel_rows()
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
