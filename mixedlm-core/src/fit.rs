//! Fit controller: minimizes the profiled criterion over theta.
//!
//! The optimizer drives the model's own objective, which installs each
//! evaluated point. After a converged run the model therefore already
//! holds the optimum and only the fit flag needs setting.

use tracing::{debug, info, warn};

use crate::error::LmmError;
use crate::model::LinearMixedModel;
use crate::optim::{BoundedMinimizer, Cobyla, Tolerances};

/// Configuration for a fit.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Absolute tolerance on the criterion.
    pub ftol_abs: f64,
    /// Absolute tolerance on every theta component.
    pub xtol_abs: f64,
    /// Maximum objective evaluations.
    pub max_evals: usize,
    /// Log every evaluation at info level.
    pub verbose: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            ftol_abs: 1e-6,
            xtol_abs: 1e-6,
            max_evals: 10_000,
            verbose: false,
        }
    }
}

/// Fit `model` with COBYLA. Returns immediately if the model is already fit.
pub fn fit<M: LinearMixedModel + ?Sized>(model: &mut M, opts: &FitOptions) -> Result<(), LmmError> {
    fit_with(model, opts, &Cobyla::default())
}

/// Fit `model` with the given optimizer.
pub fn fit_with<M: LinearMixedModel + ?Sized>(
    model: &mut M,
    opts: &FitOptions,
    optimizer: &dyn BoundedMinimizer,
) -> Result<(), LmmError> {
    if opts.verbose {
        let mut log_eval = |count: usize, value: f64, theta: &[f64]| {
            info!("f_{}: {:.8}, {:?}", count, value, theta);
        };
        run(model, opts, optimizer, Some(&mut log_eval))
    } else {
        run(model, opts, optimizer, None)
    }
}

/// Fit `model`, reporting `(evaluation, criterion, theta)` to `observer` after every evaluation.
pub fn fit_observed<M: LinearMixedModel + ?Sized>(
    model: &mut M,
    opts: &FitOptions,
    optimizer: &dyn BoundedMinimizer,
    observer: &mut dyn FnMut(usize, f64, &[f64]),
) -> Result<(), LmmError> {
    run(model, opts, optimizer, Some(observer))
}

fn run<M: LinearMixedModel + ?Sized>(
    model: &mut M,
    opts: &FitOptions,
    optimizer: &dyn BoundedMinimizer,
    mut observer: Option<&mut dyn FnMut(usize, f64, &[f64])>,
) -> Result<(), LmmError> {
    if model.is_fit() {
        return Ok(());
    }

    let x0 = model.theta().to_vec();
    let lower = model.lower().to_vec();
    let tol = Tolerances {
        ftol_abs: opts.ftol_abs,
        xtol_abs: vec![opts.xtol_abs; x0.len()],
        max_evals: opts.max_evals,
    };
    debug!(
        "Fitting {} criterion over {} parameters from {:?}",
        if model.is_reml() { "REML" } else { "ML" },
        x0.len(),
        x0
    );

    let mut evals = 0usize;
    let result = {
        let mut objective = |theta: &[f64], grad: &mut [f64]| -> Result<f64, LmmError> {
            if !grad.is_empty() {
                return Err(LmmError::GradientUnsupported);
            }
            let value = model.objective(theta)?;
            evals += 1;
            if let Some(obs) = observer.as_mut() {
                obs(evals, value, theta);
            }
            Ok(value)
        };
        optimizer.minimize(&mut objective, &x0, &lower, &tol)
    };
    let minimum = match result {
        Ok(minimum) => minimum,
        Err(err) => {
            if let LmmError::OptimizerFailure(status) = &err {
                warn!("Optimizer failed with {} after {} evaluations", status, evals);
            }
            return Err(err);
        }
    };

    if !minimum.termination.is_converged() {
        warn!(
            "Optimizer stopped with {:?} after {} evaluations",
            minimum.termination, evals
        );
        return Err(LmmError::OptimizerFailure(format!(
            "{:?} after {} evaluations",
            minimum.termination, evals
        )));
    }

    model.set_fit();
    info!(
        "Converged ({:?}) after {} evaluations: criterion = {:.6}, theta = {:?}",
        minimum.termination,
        evals,
        model.criterion(),
        model.theta()
    );
    Ok(())
}
