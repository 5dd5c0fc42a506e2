use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "stockcast-worker", version, about = "Demand forecasting worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit and store models.
    Train {
        #[command(flatten)]
        subjects: SubjectArgs,
        /// Skip the hold-out evaluation.
        #[arg(long)]
        no_evaluate: bool,
    },
    /// Rolling-origin cross-validation; prints per-cutoff metrics. Saves nothing.
    CrossValidate {
        #[command(flatten)]
        subjects: SubjectArgs,
    },
    /// Forecast subjects and print the results as JSON.
    Forecast {
        #[command(flatten)]
        subjects: SubjectArgs,
        #[arg(long, default_value_t = 30)]
        horizon: u32,
        /// Confidence level in (0, 1); defaults to the configured level.
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Forecast active SKUs and upsert the results into the forecast cache.
    Batch {
        #[arg(long, default_value_t = 30)]
        horizon: u32,
        /// Restrict to one category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Demand summary over the first active SKUs.
    Summary {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 30)]
        horizon: u32,
    },
    /// Refresh cached forecasts periodically.
    Refresh {
        /// Run one pass and exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Debug, Args)]
pub struct SubjectArgs {
    /// SKU codes.
    #[arg(long = "sku", value_name = "CODE")]
    pub skus: Vec<String>,
    /// Category codes.
    #[arg(long = "category", value_name = "CODE")]
    pub categories: Vec<String>,
    /// Every active SKU.
    #[arg(long, conflicts_with_all = ["skus", "categories"])]
    pub all: bool,
}

impl SubjectArgs {
    pub fn is_empty(&self) -> bool {
        !self.all && self.skus.is_empty() && self.categories.is_empty()
    }
}
