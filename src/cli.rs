//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_dataset_cache::CsvDatasetCache;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::table_csv;
use crate::domain::candidate::FactorTable;
use crate::domain::config_validation::{
    backtest_config, data_settings, evaluate_settings, label_settings, universe_rules,
    validate_config,
};
use crate::domain::error::FactorpickError;
use crate::domain::labeling::{label, label_with_cache, LabelOutcome, LabeledDataset};
use crate::domain::metrics::ReturnSummary;
use crate::domain::selection::{evaluate, select_top_k, Selection, StrategyReport};
use crate::domain::universe;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "factorpick", about = "Factor-based stock selection and buy-and-hold evaluation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply the eligibility rules and list surviving codes
    Screen {
        #[arg(short, long)]
        config: PathBuf,
        /// Also write the screened factor table here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Label screened candidates with their buy-and-hold return
    Label {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [label] output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize the labeled return distribution
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Read this labeled dataset instead of labeling
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        bins: usize,
    },
    /// Fit each scorer, pick the top K and evaluate the picks
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [evaluate] report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Screen { config, output } => run_screen(&config, output.as_deref()),
        Command::Label { config, output } => run_label(&config, output.as_deref()),
        Command::Analyze {
            config,
            dataset,
            bins,
        } => run_analyze(&config, dataset.as_deref(), bins),
        Command::Evaluate { config, output } => run_evaluate(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| fail(&err))
}

fn fail(err: &FactorpickError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

/// Load the factor table and apply `[universe] rules`.
pub fn screen_pipeline(config: &dyn ConfigPort) -> Result<FactorTable, FactorpickError> {
    let data = data_settings(config)?;
    let rules = universe_rules(config)?;
    let table = table_csv::load_factor_table(&data.factor_table)?;
    universe::filter(&table, &rules)
}

/// Screen, then label over `[label]`'s window, through the cache unless
/// `use_cache` is off.
pub fn label_pipeline(
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<LabelOutcome, FactorpickError> {
    let data = data_settings(config)?;
    let settings = label_settings(config)?;
    let bt_config = backtest_config(config)?;
    let candidates = screen_pipeline(config)?;

    if settings.use_cache {
        let cache = CsvDatasetCache::new(&data.cache_dir)?;
        label_with_cache(&cache, data_port, &candidates, &settings.window, &bt_config)
    } else {
        label(data_port, &candidates, &settings.window, &bt_config)
    }
}

/// Label, then for each configured scorer select the top K and evaluate it
/// over `[evaluate]`'s window.
pub fn evaluate_pipeline(
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<Vec<(Selection, StrategyReport)>, FactorpickError> {
    let label_window = label_settings(config)?.window;
    let settings = evaluate_settings(config)?;
    let bt_config = backtest_config(config)?;

    if settings.window.overlaps(&label_window) {
        tracing::warn!(
            label_start = %label_window.start_date,
            label_end = %label_window.end_date,
            eval_start = %settings.window.start_date,
            eval_end = %settings.window.end_date,
            "evaluation window overlaps the labeling window; results carry look-ahead bias"
        );
    }

    let outcome = label_pipeline(config, data_port)?;
    let dataset = &outcome.dataset;

    let mut results = Vec::with_capacity(settings.scorers.len());
    for kind in &settings.scorers {
        let mut scorer = kind.build(settings.seed);
        let selection = select_top_k(
            scorer.as_mut(),
            dataset,
            settings.test_size,
            settings.seed,
            settings.top_k,
        )?;
        let report = evaluate(
            data_port,
            &selection.codes,
            &settings.window,
            &bt_config,
            &selection.method,
        )?;
        results.push((selection, report));
    }
    Ok(results)
}

fn run_screen(config_path: &Path, output: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let screened = match screen_pipeline(&adapter) {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };

    for code in screened.codes() {
        println!("{code}");
    }
    eprintln!("{} candidates passed the screen", screened.len());

    if let Some(path) = output {
        let written = File::create(path)
            .map_err(FactorpickError::from)
            .and_then(|f| table_csv::write_factor_table(f, &screened));
        if let Err(e) = written {
            return fail(&e);
        }
        eprintln!("Screened table written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_label(config_path: &Path, output: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data = match data_settings(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let settings = match label_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let data_port = CsvAdapter::new(data.price_dir);

    let outcome = match label_pipeline(&adapter, &data_port) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    eprintln!(
        "Labeled {} candidates ({}), {} skipped",
        outcome.dataset.len(),
        if outcome.from_cache { "from cache" } else { "simulated" },
        outcome.skipped.len()
    );
    for skipped in &outcome.skipped {
        eprintln!("  skipped {}: {}", skipped.code, skipped.reason);
    }

    let target = output.map(Path::to_path_buf).or(settings.output);
    match target {
        Some(path) => {
            if let Err(e) = table_csv::save_labeled_dataset(&path, &outcome.dataset) {
                return fail(&e);
            }
            eprintln!("Dataset written to {}", path.display());
        }
        None => {
            if let Err(e) = table_csv::write_labeled_dataset(std::io::stdout().lock(), &outcome.dataset) {
                return fail(&e);
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_analyze(config_path: &Path, dataset_path: Option<&Path>, bins: usize) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let dataset: Result<LabeledDataset, FactorpickError> = match dataset_path {
        Some(path) => table_csv::load_labeled_dataset(path),
        None => data_settings(&adapter).and_then(|data| {
            let data_port = CsvAdapter::new(data.price_dir);
            label_pipeline(&adapter, &data_port).map(|o| o.dataset)
        }),
    };
    let dataset = match dataset {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    let summary = match ReturnSummary::compute(&dataset.returns(), bins) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    println!("Annualized return distribution");
    println!("  count:    {}", summary.count);
    println!("  positive: {}", summary.positive);
    println!("  mean:     {:.4}", summary.mean);
    println!("  median:   {:.4}", summary.median);
    println!("  stddev:   {:.4}", summary.stddev);
    println!("  min:      {:.4}", summary.min);
    println!("  max:      {:.4}", summary.max);
    println!();
    let widest = summary.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for bin in &summary.histogram {
        let bar = "#".repeat(bin.count * 40 / widest);
        println!("  [{:>8.4}, {:>8.4}] {:>6} {}", bin.lower, bin.upper, bin.count, bar);
    }
    ExitCode::SUCCESS
}

fn run_evaluate(config_path: &Path, output: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(&e);
    }
    let data = match data_settings(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let settings = match evaluate_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let data_port = CsvAdapter::new(data.price_dir);

    let results = match evaluate_pipeline(&adapter, &data_port) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    println!(
        "{:<12} {:>10} {:>8} {:>16} {:>10}  picks",
        "method", "test_rmse", "test_r2", "final_value", "ann_ret"
    );
    for (selection, report) in &results {
        println!(
            "{:<12} {:>10.4} {:>8.4} {:>16.2} {:>9.2}%  {}",
            selection.method,
            selection.test_rmse,
            selection.test_r2,
            report.final_value,
            report.annualized_return * 100.0,
            report.codes.join(" ")
        );
    }

    let reports: Vec<StrategyReport> = results.into_iter().map(|(_, r)| r).collect();
    if let Some(path) = output.map(Path::to_path_buf).or(settings.report) {
        if let Err(e) = CsvReportAdapter.write(&reports, &path.display().to_string()) {
            return fail(&e);
        }
        eprintln!("Report written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_config(&adapter) {
        if let (FactorpickError::RuleParse(pe), Some(text)) =
            (&e, adapter.get_string("universe", "rules"))
        {
            eprintln!("error in [universe] rules:\n{}", pe.display_with_context(text.trim()));
            return (&e).into();
        }
        return fail(&e);
    }

    // validate_config succeeded, so these cannot fail.
    let (Ok(rules), Ok(data)) = (universe_rules(&adapter), data_settings(&adapter)) else {
        return ExitCode::from(2);
    };

    eprintln!("\nEligibility rules:");
    for rule in &rules {
        eprintln!("  {rule}");
    }

    let table = match table_csv::load_factor_table(&data.factor_table) {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };
    if let Err(e) = universe::validate_rules(&table, &rules) {
        return fail(&e);
    }
    eprintln!(
        "\nFactor table: {} rows, {} factor columns, {} text columns",
        table.len(),
        table.factor_columns.len(),
        table.text_columns.len()
    );

    match CsvAdapter::new(data.price_dir.clone()).list_codes() {
        Ok(codes) => {
            let missing = table
                .rows
                .iter()
                .filter(|r| codes.binary_search(&r.code).is_err())
                .count();
            eprintln!(
                "Price files: {} in {} ({} table rows without one)",
                codes.len(),
                data.price_dir.display(),
                missing
            );
        }
        Err(e) => return fail(&e),
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
