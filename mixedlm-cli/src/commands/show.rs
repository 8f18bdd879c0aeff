//! Print a saved fit summary.
//!
//! mixedlm show --fit-file out.lmm.fit

use anyhow::Result;
use clap::Args;

use mixedlm_core::serialization::load_summary;

#[derive(Args)]
pub struct ShowArgs {
    /// Fit file written by `mixedlm fit` (.lmm.fit)
    #[arg(long)]
    fit_file: String,
}

pub fn run(args: ShowArgs) -> Result<()> {
    let summary = load_summary(std::path::Path::new(&args.fit_file))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
