//! Layout errors

use thiserror::Error;

/// Invalid solver input
///
/// Non-convergence is not an error: solvers stop at their iteration cap and
/// keep the positions they reached.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Constraint {constraint} references variable {variable}, but there are {count} variables")]
    UnknownVariable {
        constraint: usize,
        variable: usize,
        count: usize,
    },

    #[error("Variable {0} has a non-positive weight")]
    InvalidWeight(usize),

    #[error("Non-finite {what} at index {index}")]
    NonFinite { what: &'static str, index: usize },

    #[error("Document error: {0}")]
    Core(#[from] vellum_core::CoreError),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
