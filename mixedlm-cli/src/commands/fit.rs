//! Fit a linear mixed model.
//!
//! mixedlm fit --input model.json --output-prefix out [--reml] [--trace] [--save-json]
//!
//! The input file carries already-encoded matrices:
//! `{"y": [...], "x": [[row], ...], "terms": [{"levels": [...], "nlevels": 10,
//! "regressors": [[row], ...]}], "sqrtwts": [...]}`. `nlevels`, `regressors`
//! and `sqrtwts` are optional; a term without regressors is a random intercept.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::info;

use mixedlm_core::report::summarize;
use mixedlm_core::serialization;
use mixedlm_core::{FitOptions, LinearMixedModel, MixedModel, ReTerm};
use mixedlm_linalg::DenseMatrix;

#[derive(Args)]
pub struct FitArgs {
    /// JSON construction file
    #[arg(long)]
    input: String,

    /// Output file prefix
    #[arg(long)]
    output_prefix: String,

    /// Optimize the REML criterion instead of the likelihood
    #[arg(long, default_value = "false")]
    reml: bool,

    /// Log every objective evaluation
    #[arg(long, default_value = "false")]
    trace: bool,

    /// Absolute tolerance on the criterion
    #[arg(long, default_value = "1e-6")]
    ftol_abs: f64,

    /// Absolute tolerance on each theta component
    #[arg(long, default_value = "1e-6")]
    xtol_abs: f64,

    /// Maximum objective evaluations
    #[arg(long, default_value = "10000")]
    max_evals: usize,

    /// Also save JSON sidecar
    #[arg(long, default_value = "false")]
    save_json: bool,
}

#[derive(Debug, Deserialize)]
struct TermInput {
    levels: Vec<usize>,
    #[serde(default)]
    nlevels: Option<usize>,
    #[serde(default)]
    regressors: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ModelInput {
    y: Vec<f64>,
    /// Fixed-effects design, one row per observation.
    x: Vec<Vec<f64>>,
    terms: Vec<TermInput>,
    #[serde(default)]
    sqrtwts: Vec<f64>,
}

/// Rows of equal length into a dense matrix.
fn matrix_from_rows(rows: &[Vec<f64>], what: &str) -> Result<DenseMatrix> {
    let ncols = rows.first().map_or(0, |r| r.len());
    if let Some(i) = rows.iter().position(|r| r.len() != ncols) {
        bail!(
            "{}: row {} has {} columns, expected {}",
            what,
            i,
            rows[i].len(),
            ncols
        );
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DenseMatrix::from_row_major(rows.len(), ncols, &flat))
}

fn build_model(input: ModelInput) -> Result<MixedModel> {
    let x = matrix_from_rows(&input.x, "x")?;
    let mut terms = Vec::with_capacity(input.terms.len());
    for (t, term) in input.terms.into_iter().enumerate() {
        let mut re = match term.regressors {
            Some(rows) => {
                let z = matrix_from_rows(&rows, &format!("terms[{}].regressors", t))?;
                ReTerm::with_regressors(term.levels, z)
            }
            None => ReTerm::intercept(term.levels),
        };
        if let Some(nlevels) = term.nlevels {
            re = re.with_nlevels(nlevels);
        }
        terms.push(re);
    }
    Ok(MixedModel::new(input.y, x, terms, input.sqrtwts)?)
}

pub fn run(args: FitArgs) -> Result<()> {
    info!("Input file: {}", args.input);

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input))?;
    let input: ModelInput = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.input))?;
    let mut model = build_model(input)?;

    let size = model.as_lmm().size();
    info!(
        "Built {} model: n={}, p={}, q={}, terms={}",
        model.kind(),
        size.n,
        size.p,
        size.q,
        size.t
    );

    model.as_lmm_mut().set_reml(args.reml);
    let opts = FitOptions {
        ftol_abs: args.ftol_abs,
        xtol_abs: args.xtol_abs,
        max_evals: args.max_evals,
        verbose: args.trace,
    };
    let summary = summarize(&mut model, &opts)?;
    info!(
        "{} criterion {:.6} at theta {:?}",
        summary.criterion, summary.objective, summary.theta
    );

    let fit_path = format!("{}.lmm.fit", args.output_prefix);
    serialization::save_summary(&summary, std::path::Path::new(&fit_path))?;
    info!("Fit saved to {}", fit_path);

    if args.save_json {
        let json_path = format!("{}.lmm.fit.json", args.output_prefix);
        serialization::save_summary_json(&summary, std::path::Path::new(&json_path))?;
        info!("JSON sidecar saved to {}", json_path);
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
