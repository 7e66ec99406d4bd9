//! Levenberg–Marquardt through the MINPACK port in `levenberg_marquardt`.
//!
//! `TermCriteria` maps onto the solver as `xtol = epsilon` (relative step
//! size) and `patience = max_iterations`; MINPACK allows
//! `patience * (n + 1)` residual evaluations for `n` parameters.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::Dyn;
use procam_core::TermCriteria;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LmError {
    #[error("no convergence within {evaluations} residual evaluations")]
    NotConverged { evaluations: usize },
    #[error("solver stopped: {reason}")]
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct LmSummary {
    /// `0.5 * sum(r^2)` at the solution.
    pub objective: f64,
    pub evaluations: usize,
    pub converged: bool,
    /// Solver's termination reason, for logs and reports.
    pub termination: String,
}

fn solver(criteria: TermCriteria) -> LevenbergMarquardt<f64> {
    LevenbergMarquardt::new()
        .with_xtol(criteria.epsilon.max(0.0))
        .with_patience(criteria.max_iterations.max(1))
}

/// Minimise `problem` from its current parameters.
///
/// Running out of patience is `NotConverged`; any other unsuccessful stop
/// (numerical trouble, missing residuals) is `Failed`.
pub fn minimize<P>(problem: P, criteria: TermCriteria) -> Result<(P, LmSummary), LmError>
where
    P: LeastSquaresProblem<f64, Dyn, Dyn>,
{
    let (problem, report) = solver(criteria).minimize(problem);
    log::debug!(
        "lm: {:?} after {} evaluations, objective {:.6e}",
        report.termination,
        report.number_of_evaluations,
        report.objective_function
    );

    if !report.termination.was_successful() {
        return Err(match report.termination {
            TerminationReason::LostPatience => LmError::NotConverged {
                evaluations: report.number_of_evaluations,
            },
            other => LmError::Failed {
                reason: format!("{other:?}"),
            },
        });
    }

    let summary = LmSummary {
        objective: report.objective_function,
        evaluations: report.number_of_evaluations,
        converged: true,
        termination: format!("{:?}", report.termination),
    };
    Ok((problem, summary))
}
