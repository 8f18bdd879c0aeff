//! Derivative-free bound-constrained minimization.
//!
//! The fit controller only needs [`BoundedMinimizer`]; [`Cobyla`] adapts
//! the `cobyla` crate (a port of NLopt's COBYLA) to it.

use std::cell::RefCell;

use cobyla::{Func, RhoBeg, StopTols};
use tracing::debug;

use crate::error::LmmError;

/// Objective seen by an optimizer: parameters and a gradient buffer that a
/// derivative-free method leaves empty.
pub type ObjectiveFn<'a> = dyn FnMut(&[f64], &mut [f64]) -> Result<f64, LmmError> + 'a;

/// Absolute stopping tolerances and an evaluation cap.
#[derive(Debug, Clone)]
pub struct Tolerances {
    pub ftol_abs: f64,
    /// One entry per parameter.
    pub xtol_abs: Vec<f64>,
    pub max_evals: usize,
}

/// How an optimizer run ended without an outright failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    StopValReached,
    FtolReached,
    XtolReached,
    MaxEvalReached,
    MaxTimeReached,
}

impl Termination {
    /// Whether the run stopped because it converged rather than ran out of budget.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Termination::Success
                | Termination::StopValReached
                | Termination::FtolReached
                | Termination::XtolReached
        )
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fmin: f64,
    pub termination: Termination,
}

/// A minimizer over the box `x >= lower` using function values only.
///
/// Implementations must leave their last objective evaluation at the
/// returned minimizer `x`.
pub trait BoundedMinimizer {
    fn minimize(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        lower: &[f64],
        tol: &Tolerances,
    ) -> Result<Minimum, LmmError>;
}

/// COBYLA with a uniform initial trust-region radius.
#[derive(Debug, Clone)]
pub struct Cobyla {
    pub initial_step: f64,
}

impl Default for Cobyla {
    fn default() -> Self {
        Self { initial_step: 0.5 }
    }
}

/// Per-call evaluation state shared with the `Fn` closure cobyla requires.
struct Session<'o, 'a> {
    objective: &'o mut ObjectiveFn<'a>,
    last_x: Vec<f64>,
    last_value: f64,
    error: Option<LmmError>,
}

impl Session<'_, '_> {
    fn eval(&mut self, x: &[f64]) -> Result<f64, LmmError> {
        let value = (self.objective)(x, &mut [])?;
        self.last_x.clear();
        self.last_x.extend_from_slice(x);
        self.last_value = value;
        Ok(value)
    }
}

/// Objective value reported to cobyla after an evaluation error.
const PENALTY: f64 = 1e300;

impl BoundedMinimizer for Cobyla {
    fn minimize(
        &self,
        objective: &mut ObjectiveFn<'_>,
        x0: &[f64],
        lower: &[f64],
        tol: &Tolerances,
    ) -> Result<Minimum, LmmError> {
        let bounds: Vec<(f64, f64)> = lower.iter().map(|&lb| (lb, f64::INFINITY)).collect();
        let session = RefCell::new(Session {
            objective,
            last_x: Vec::new(),
            last_value: f64::NAN,
            error: None,
        });

        let func = |x: &[f64], _data: &mut ()| -> f64 {
            let mut s = session.borrow_mut();
            if s.error.is_some() {
                return PENALTY;
            }
            // cobyla may probe just outside the box
            let projected: Vec<f64> = x.iter().zip(lower).map(|(&xi, &lb)| xi.max(lb)).collect();
            match s.eval(&projected) {
                Ok(v) => v,
                Err(e) => {
                    s.error = Some(e);
                    PENALTY
                }
            }
        };

        let cons: Vec<&dyn Func<()>> = Vec::new();
        let stop = StopTols {
            ftol_abs: tol.ftol_abs,
            xtol_abs: tol.xtol_abs.clone(),
            ..StopTols::default()
        };
        let result = cobyla::minimize(
            func,
            x0,
            &bounds,
            &cons,
            (),
            tol.max_evals,
            RhoBeg::All(self.initial_step),
            Some(stop),
        );

        let mut session = session.into_inner();
        if let Some(e) = session.error.take() {
            return Err(e);
        }

        let (status, x_opt) = match result {
            Ok((status, x, _)) => (status, x),
            Err((fail, _, _)) => return Err(LmmError::OptimizerFailure(format!("{:?}", fail))),
        };
        let x_opt: Vec<f64> = x_opt.iter().zip(lower).map(|(&xi, &lb)| xi.max(lb)).collect();

        let termination = match status {
            cobyla::SuccessStatus::Success => Termination::Success,
            cobyla::SuccessStatus::StopValReached => Termination::StopValReached,
            cobyla::SuccessStatus::FtolReached => Termination::FtolReached,
            cobyla::SuccessStatus::XtolReached => Termination::XtolReached,
            cobyla::SuccessStatus::MaxEvalReached => Termination::MaxEvalReached,
            cobyla::SuccessStatus::MaxTimeReached => Termination::MaxTimeReached,
        };

        // the caller's state must reflect the minimizer
        let fmin = if session.last_x != x_opt {
            debug!("re-evaluating at reported minimizer {:?}", x_opt);
            session.eval(&x_opt)?
        } else {
            session.last_value
        };

        Ok(Minimum {
            x: x_opt,
            fmin,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_with_active_bound() {
        // min (x0 - 1)^2 + (x1 + 2)^2 subject to x >= 0
        let mut obj = |x: &[f64], _g: &mut [f64]| -> Result<f64, LmmError> {
            Ok((x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2))
        };
        let tol = Tolerances {
            ftol_abs: 1e-10,
            xtol_abs: vec![1e-8; 2],
            max_evals: 2000,
        };
        let min = Cobyla::default().minimize(&mut obj, &[0.5, 0.5], &[0.0, 0.0], &tol).unwrap();
        assert!(min.termination.is_converged(), "{:?}", min.termination);
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x0 = {}", min.x[0]);
        assert!(min.x[1].abs() < 1e-3, "x1 = {}", min.x[1]);
        assert!((min.fmin - 4.0).abs() < 1e-2);
    }

    #[test]
    fn test_last_evaluation_is_minimizer() {
        let mut last = Vec::new();
        let tol = Tolerances {
            ftol_abs: 1e-8,
            xtol_abs: vec![1e-6],
            max_evals: 500,
        };
        let x = {
            let mut obj = |x: &[f64], _g: &mut [f64]| -> Result<f64, LmmError> {
                last = x.to_vec();
                Ok((x[0] - 0.3).powi(2))
            };
            Cobyla::default().minimize(&mut obj, &[1.0], &[0.0], &tol).unwrap().x
        };
        assert_eq!(last, x);
    }

    #[test]
    fn test_objective_error_propagates() {
        let mut calls = 0;
        let mut obj = |_x: &[f64], _g: &mut [f64]| -> Result<f64, LmmError> {
            calls += 1;
            if calls > 1 {
                Err(LmmError::GradientUnsupported)
            } else {
                Ok(1.0)
            }
        };
        let tol = Tolerances {
            ftol_abs: 1e-12,
            xtol_abs: vec![1e-12],
            max_evals: 100,
        };
        let res = Cobyla::default().minimize(&mut obj, &[1.0], &[0.0], &tol);
        assert!(matches!(res, Err(LmmError::GradientUnsupported)));
    }

    #[test]
    fn test_budget_exhaustion_is_not_convergence() {
        assert!(!Termination::MaxEvalReached.is_converged());
        assert!(!Termination::MaxTimeReached.is_converged());
        assert!(Termination::XtolReached.is_converged());
    }
}
