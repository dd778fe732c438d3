use crate::abundance_matrix::AbundanceMatrix;
use crate::config::{AnalysisConfig, MinIdentity, Settings, TieBreak, RUN_CONFIG_FILE};
use crate::io::fasta::read_reference_taxa;
use crate::io::{pair_output_dir, write_abundance_tables, write_comparison_results, COMPARISON_FILE};
use crate::metadata::{load_sample_sheet, SampleSheet};
use crate::pipeline::report::SUMMARY_FILE;
use crate::pipeline::{
    generate_report, AbundanceAggregator, AbundanceTables, RunSummary, SampleInputs,
    SampleProcessor,
};
use crate::stats::{prepare_relative_abundance, GroupComparisonEngine, PValueMethod};
use crate::visualization::{boxplot_records, write_boxplot_records, HeatmapData, BOXPLOT_FILE};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;

/// Taxonomic profiling of amplicon reads from per-sample alignment results.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output directory
    #[arg(short, long, global = true, default_value = "results")]
    pub outdir: PathBuf,

    /// Number of threads for per-sample processing
    #[arg(short, long, global = true, default_value_t = 4)]
    pub threads: usize,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build count and percent identity tables from alignment results
    Aggregate(AggregateArgs),

    /// Compare relative abundance between sample groups
    Compare(CompareArgs),

    /// Aggregate, write heatmap data and compare groups
    Run {
        #[command(flatten)]
        aggregate: AggregateArgs,

        #[command(flatten)]
        test: TestArgs,

        /// Shorten SILVA lineages in heatmap row labels
        #[arg(long)]
        publication_labels: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    /// Reference database FASTA used for the alignment search
    #[arg(long)]
    pub ref_fa: PathBuf,

    /// Sample sheet with 'Sample' and 'Group' columns
    #[arg(long)]
    pub sample_sheet: PathBuf,

    /// Directory with one alignment table per sample (<sample>.tsv)
    #[arg(long)]
    pub alignment_dir: PathBuf,

    /// Directory with the merged reads of each sample (<sample>.fasta)
    #[arg(long)]
    pub fasta_dir: PathBuf,

    /// Minimum percent identity of a hit, on the scale of the alignment tables [default: 97]
    #[arg(long)]
    pub min_percent_identity: Option<f64>,

    /// Seed for breaking ties between equally good hits (drawn at random if absent)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Break ties by the smallest subject id instead of at random
    #[arg(long, conflicts_with = "seed")]
    pub lexicographic_ties: bool,

    /// Analysis configuration to start from, e.g. a previous run-config.json
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// False discovery rate for Benjamini-Hochberg correction [default: 0.1]
    #[arg(long)]
    pub fdr_alpha: Option<f64>,

    /// How Mann-Whitney U p-values are computed [default: asymptotic]
    #[arg(long, value_enum)]
    pub method: Option<PValueMethod>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Count table written by 'aggregate'
    #[arg(long)]
    pub count_table: PathBuf,

    /// Sample sheet with 'Sample' and 'Group' columns
    #[arg(long)]
    pub sample_sheet: PathBuf,

    #[command(flatten)]
    pub test: TestArgs,
}

impl AggregateArgs {
    fn analysis_config(&self, test: Option<&TestArgs>, publication_labels: bool) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => AnalysisConfig {
                tie_break: TieBreak::Random {
                    seed: rand::random(),
                },
                ..AnalysisConfig::default()
            },
        };

        if let Some(threshold) = self.min_percent_identity {
            config.min_identity = MinIdentity::new(threshold)?;
        }
        if self.lexicographic_ties {
            config.tie_break = TieBreak::Lexicographic;
        } else if let Some(seed) = self.seed {
            config.tie_break = TieBreak::Random { seed };
        }
        if let Some(test) = test {
            test.apply(&mut config);
        }
        config.publication_labels |= publication_labels;
        config.validate()?;
        Ok(config)
    }
}

impl TestArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(fdr_alpha) = self.fdr_alpha {
            config.fdr_alpha = fdr_alpha;
        }
        if let Some(method) = self.method {
            config.test_method = method;
        }
    }
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<()> {
    let settings = Settings::new(&cli.outdir, cli.threads, cli.debug)?;
    settings.prepare_outdir()?;
    info!("Output directory: {}", settings.outdir.display());

    match &cli.command {
        Commands::Aggregate(args) => {
            let config = args.analysis_config(None, false)?;
            aggregate(&settings, &config, args)?;
        }
        Commands::Compare(args) => {
            let mut config = AnalysisConfig::default();
            args.test.apply(&mut config);
            config.validate()?;

            let sheet = load_sample_sheet(&args.sample_sheet)?;
            let counts = AbundanceMatrix::read_csv(&args.count_table).with_context(|| {
                format!("Failed to read count table {}", args.count_table.display())
            })?;
            compare(&settings, &config, &counts, &sheet)?;
        }
        Commands::Run {
            aggregate: args,
            test,
            publication_labels,
        } => {
            let config = args.analysis_config(Some(test), *publication_labels)?;
            let (tables, sheet) = aggregate(&settings, &config, args)?;

            HeatmapData::prepare(&tables, &sheet, config.publication_labels)?
                .write(&settings.outdir)?;
            compare(&settings, &config, &tables.counts, &sheet)?;
        }
    }

    info!("Finished. Results are in {}", settings.outdir.display());
    Ok(())
}

/// Reads, resolves and aggregates every sample of the sheet, then writes
/// the abundance tables and the run summary.
fn aggregate(
    settings: &Settings,
    config: &AnalysisConfig,
    args: &AggregateArgs,
) -> Result<(AbundanceTables, SampleSheet)> {
    match config.tie_break {
        TieBreak::Random { seed } => info!("Tie-break seed: {}", seed),
        TieBreak::Lexicographic => info!("Ties broken by smallest subject id"),
    }
    config.write_json(settings.output_path(RUN_CONFIG_FILE))?;

    let sheet = load_sample_sheet(&args.sample_sheet)?;
    let reference = read_reference_taxa(&args.ref_fa)?;
    let inputs = SampleInputs::discover(sheet.samples(), &args.alignment_dir, &args.fasta_dir)?;

    let processor = SampleProcessor::new(config, settings.threads)?;
    let results = processor.process_samples(&inputs)?;
    let tables = AbundanceAggregator::new(&reference).aggregate(&results)?;

    write_abundance_tables(&tables, &settings.outdir)?;
    let summary = RunSummary::new(&results, &tables);
    summary.write_json(settings.output_path(SUMMARY_FILE))?;
    info!("\n{}", generate_report(&summary));

    Ok((tables, sheet))
}

/// Writes statistics and boxplot data for every group pair that could be
/// compared.
fn compare(
    settings: &Settings,
    config: &AnalysisConfig,
    counts: &AbundanceMatrix,
    sheet: &SampleSheet,
) -> Result<()> {
    let relative = prepare_relative_abundance(counts);
    let engine = GroupComparisonEngine::from_config(config);

    let mut skipped = 0;
    for comparison in engine.compare_all(&relative, sheet)? {
        let rows = match &comparison.outcome {
            Ok(rows) => rows,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let dir = pair_output_dir(&settings.outdir, &comparison.pair);
        fs::create_dir_all(&dir)?;
        write_comparison_results(rows, &comparison.pair, &dir.join(COMPARISON_FILE))?;
        let records = boxplot_records(&relative, sheet, &comparison.pair);
        write_boxplot_records(&records, &dir.join(BOXPLOT_FILE))?;
        info!("Wrote {}", dir.display());
    }

    if skipped > 0 {
        warn!("{} group pair(s) could not be compared", skipped);
    }
    Ok(())
}
