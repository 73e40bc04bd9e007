//! Command-line interface: argument types and command handlers.
//!
//! Each handler prints its result on stdout (human text or JSON) and
//! returns the process [`ExitCode`].

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sb_common::{CompressionFormat, Error, OutputFormat, RunId};
use sb_config::{load_unvalidated, resolve_config, BenchConfig, ResolvedConfig};
use tracing::debug;

use crate::batch::BatchOrchestrator;
use crate::codec::{adapter_for, BuiltinCodecs, InvocationConfig};
use crate::collect::{gpu, HostInfo};
use crate::exit_codes::ExitCode;
use crate::logging::LogFormat;
use crate::roundtrip::{RoundTripPaths, RoundTripResult, RoundTripRunner};
use crate::scene::Scene;
use crate::stats::{SceneStatsRecord, StatsAggregator};

/// Round-trip benchmark for Gaussian-splat compression codecs.
#[derive(Parser, Debug)]
#[command(name = "splat-bench", version, about)]
pub struct Cli {
    /// Config file (overrides SPLAT_BENCH_CONFIG and the per-user file)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format for results on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Round-trip one point cloud through one format
    Roundtrip(RoundtripArgs),
    /// Round-trip every scene under a source tree
    Batch(BatchArgs),
    /// Report which codec tools and GPUs are available
    Check,
    /// Inspect the effective configuration
    Config(ConfigArgs),
    /// Inspect statistics records
    Record(RecordArgs),
    /// Print a JSON Schema
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Record)]
        target: SchemaTarget,
    },
}

#[derive(Args, Debug)]
pub struct RoundtripArgs {
    /// Input point cloud (.ply)
    pub input: PathBuf,

    /// Compression format
    #[arg(value_enum)]
    pub compression: CompressionFormat,

    /// Compressed output path [default: <input stem>.<ext> next to the input]
    #[arg(long)]
    pub compressed: Option<PathBuf>,

    /// Restored cloud path [default: <input stem>_decompressed_<format>.ply]
    #[arg(long)]
    pub decompressed: Option<PathBuf>,

    /// Directory of the statistics record [default: the input's directory]
    #[arg(long)]
    pub record_dir: Option<PathBuf>,

    /// Do not write a statistics record
    #[arg(long)]
    pub no_record: bool,

    /// Replace files already at the compressed or restored paths
    #[arg(long)]
    pub overwrite: bool,

    /// Run GPU-capable codecs on the CPU
    #[arg(long)]
    pub use_cpu: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Source directory (or a single .ply/.tar/.zip file)
    pub source: PathBuf,

    /// Output root mirroring the source layout
    pub output: PathBuf,

    /// Formats to benchmark
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = CompressionFormat::ALL.to_vec()
    )]
    pub codecs: Vec<CompressionFormat>,

    /// Re-run formats that already have a successful entry
    #[arg(long)]
    pub overwrite: bool,

    /// Keep archive extraction directories
    #[arg(long)]
    pub keep_extracted: bool,

    /// Pack the finished output tree into <output>/<output name>.tar
    #[arg(long)]
    pub archive_output: bool,

    /// Run GPU-capable codecs on the CPU
    #[arg(long)]
    pub use_cpu: bool,

    /// Keep only scenes whose relative path contains this (repeatable)
    #[arg(long = "filter", value_name = "SUBSTRING")]
    pub filters: Vec<String>,

    /// Only use point clouds with this file name, e.g. point_cloud.ply
    #[arg(long)]
    pub cloud_name: Option<String>,

    /// Scratch directory for archive extraction
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration and where it came from
    Show,
    /// Validate the configuration and report problems
    Validate,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub command: RecordCommands,
}

#[derive(Subcommand, Debug)]
pub enum RecordCommands {
    /// Print a record (file, or scene directory containing one)
    Show { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaTarget {
    Record,
    Config,
}

/// Dispatch a parsed command line.
pub fn run(cli: &Cli) -> ExitCode {
    let result = match &cli.command {
        Commands::Roundtrip(args) => run_roundtrip(cli, args),
        Commands::Batch(args) => run_batch(cli, args),
        Commands::Check => run_check(cli),
        Commands::Config(args) => run_config(cli, args),
        Commands::Record(args) => run_record(cli, args),
        Commands::Schema { target } => run_schema(*target),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            report_error(cli.format, &err);
            ExitCode::for_error(&err)
        }
    }
}

fn report_error(format: OutputFormat, err: &Error) {
    if format.is_json() {
        let body = serde_json::json!({
            "error": err.to_string(),
            "code": err.code(),
        });
        println!("{body}");
    } else {
        eprintln!("error: {err}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ResolvedConfig, Error> {
    let resolved = resolve_config(cli.config.as_deref()).map_err(|e| config_error(cli, e))?;
    debug!(source = ?resolved.source, "configuration resolved");
    Ok(resolved)
}

fn config_error(cli: &Cli, err: sb_config::ValidationError) -> Error {
    match &cli.config {
        Some(path) => Error::InvalidConfigFile {
            path: path.display().to_string(),
            reason: err.to_string(),
        },
        None => Error::Config(err.to_string()),
    }
}

fn run_roundtrip(cli: &Cli, args: &RoundtripArgs) -> Result<ExitCode, Error> {
    let mut config = load_config(cli)?.config;
    config.use_cpu |= args.use_cpu;

    if !args.input.is_file() {
        return Err(Error::InputNotFound(args.input.display().to_string()));
    }

    let defaults = RoundTripPaths::beside_input(&args.input, args.compression);
    let paths = RoundTripPaths {
        input: args.input.clone(),
        compressed: args.compressed.clone().unwrap_or(defaults.compressed),
        decompressed: args.decompressed.clone().unwrap_or(defaults.decompressed),
    };

    let scene = Scene::from_file(&args.input);
    let runner = RoundTripRunner::new(&BuiltinCodecs, &config, HostInfo::detect(), RunId::new())
        .replace_outputs(args.overwrite || config.overwrite);
    let result = runner.run(&scene, args.compression, &paths);

    let mut record_path = None;
    if !args.no_record {
        let record_dir = args
            .record_dir
            .clone()
            .or_else(|| args.input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let aggregator = StatsAggregator::new(&config.record);
        let outcome = aggregator
            .merge_and_persist(&scene, &record_dir, result.clone())
            .map_err(Error::from)?;
        record_path = Some(outcome.record_path);
    }

    if cli.format.is_json() {
        print_json(&serde_json::json!({
            "result": result,
            "record": record_path,
        }))?;
    } else {
        print!("{}", render_result(&scene.name, &result));
        if let Some(path) = &record_path {
            println!("  record: {}", path.display());
        }
    }

    Ok(if result.is_success() {
        ExitCode::Clean
    } else {
        ExitCode::RoundTripFailed
    })
}

fn render_result(scene: &str, result: &RoundTripResult) -> String {
    let status = if result.is_success() { "success" } else { "failed" };
    let mut out = format!("{} [{}]: {}\n", scene, result.format, status);
    if let Some(failure) = &result.failure {
        out.push_str(&format!("  failed at {}: {}\n", failure.stage, failure.reason));
        return out;
    }
    let fmt = |name: &str| {
        result
            .metric(name)
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "-".to_string())
    };
    out.push_str(&format!(
        "  size: {} -> {} bytes (ratio {}, {}% smaller)\n",
        result.original_size_bytes.unwrap_or(0),
        result.compressed_size_bytes.unwrap_or(0),
        fmt("compression_ratio"),
        fmt("size_reduction_percent"),
    ));
    out.push_str(&format!(
        "  time: compress {:.3}s, decompress {:.3}s\n",
        result.compression_time_seconds.unwrap_or(0.0),
        result.decompression_time_seconds.unwrap_or(0.0),
    ));
    out.push_str(&format!(
        "  position rmse {}, color psnr {} dB\n",
        fmt("position_rmse"),
        fmt("color_psnr_db"),
    ));
    if let Some(fidelity) = &result.fidelity {
        if fidelity.partial_fidelity {
            out.push_str(&format!(
                "  partial fidelity: {} of {} points matched\n",
                fidelity.matched_points, fidelity.point_count_original
            ));
        }
    }
    out
}

fn run_batch(cli: &Cli, args: &BatchArgs) -> Result<ExitCode, Error> {
    let mut config = load_config(cli)?.config;
    apply_batch_overrides(&mut config, args);

    let orchestrator = BatchOrchestrator::new(&BuiltinCodecs, &config, HostInfo::detect());
    let summary = orchestrator
        .run_batch(&args.source, &args.output, &args.codecs)
        .map_err(Error::from)?;

    if cli.format.is_json() {
        print_json(&summary)?;
    } else {
        print!("{}", summary.render_human());
    }
    Ok(ExitCode::Clean)
}

/// Command-line flags win over config values.
pub fn apply_batch_overrides(config: &mut BenchConfig, args: &BatchArgs) {
    config.overwrite |= args.overwrite;
    config.keep_extracted |= args.keep_extracted;
    config.archive_output |= args.archive_output;
    config.use_cpu |= args.use_cpu;
    config.scan.path_filter.extend(args.filters.iter().cloned());
    if args.cloud_name.is_some() {
        config.scan.cloud_file_name = args.cloud_name.clone();
    }
    if args.scratch_dir.is_some() {
        config.scratch_dir = args.scratch_dir.clone();
    }
}

fn run_check(cli: &Cli) -> Result<ExitCode, Error> {
    let config = load_config(cli)?.config;

    let mut codecs = Vec::new();
    for format in CompressionFormat::ALL {
        let invocation = InvocationConfig::for_format(&config, format, None);
        let probe = adapter_for(format).probe(&invocation);
        codecs.push(serde_json::json!({
            "format": format,
            "binary": invocation.binary,
            "available": probe.is_ok(),
            "error": probe.err().map(|e| e.to_string()),
        }));
    }
    let gpus = gpu::query_nvidia_devices().unwrap_or_default();
    let host = HostInfo::detect();
    let any_available = codecs.iter().any(|c| c["available"] == true);

    if cli.format.is_json() {
        print_json(&serde_json::json!({
            "codecs": codecs,
            "gpus": gpus,
            "host": host,
        }))?;
    } else {
        for codec in &codecs {
            let status = if codec["available"] == true { "ok" } else { "missing" };
            println!(
                "{:<5} {:<8} {}",
                codec["format"].as_str().unwrap_or("?"),
                status,
                codec["binary"].as_str().unwrap_or("?")
            );
        }
        println!("cpu   {}", host.cpu_name);
        println!("gpu   {}", host.gpu_name);
    }

    Ok(if any_available {
        ExitCode::Clean
    } else {
        ExitCode::CodecUnavailable
    })
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<ExitCode, Error> {
    match args.command {
        ConfigCommands::Show => {
            let resolved = load_config(cli)?;
            if cli.format.is_json() {
                print_json(&resolved)?;
            } else {
                match resolved.source.path() {
                    Some(path) => println!("# source: {}", path.display()),
                    None => println!("# source: built-in defaults"),
                }
                println!("{}", serde_json::to_string_pretty(&resolved.config)?);
            }
            Ok(ExitCode::Clean)
        }
        ConfigCommands::Validate => {
            let resolved =
                load_unvalidated(cli.config.as_deref()).map_err(|e| config_error(cli, e))?;
            let report = sb_config::validate::validate(&resolved.config);
            if cli.format.is_json() {
                print_json(&serde_json::json!({
                    "valid": report.is_ok(),
                    "errors": report.errors,
                    "source": resolved.source,
                }))?;
            } else if report.is_ok() {
                println!("configuration is valid");
            } else {
                for err in &report.errors {
                    println!("invalid: {err}");
                }
            }
            Ok(if report.is_ok() {
                ExitCode::Clean
            } else {
                ExitCode::ConfigError
            })
        }
    }
}

fn run_record(cli: &Cli, args: &RecordArgs) -> Result<ExitCode, Error> {
    let RecordCommands::Show { path } = &args.command;
    let file = if path.is_dir() {
        let config = load_config(cli)?.config;
        StatsAggregator::new(&config.record).record_path(path)
    } else {
        path.clone()
    };
    let record = SceneStatsRecord::load(&file)
        .map_err(Error::from)?
        .ok_or_else(|| Error::InputNotFound(file.display().to_string()))?;

    if cli.format.is_json() {
        print_json(&record)?;
    } else {
        println!(
            "{} ({}), updated {}",
            record.scene.name, record.scene.scene_id, record.scene.updated_at
        );
        for (key, entry) in record.entries() {
            match entry {
                Some(result) => print!("{}", render_result(&record.scene.name, &result)),
                None => println!("  {key}: entry not understood by this version, kept as-is"),
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn run_schema(target: SchemaTarget) -> Result<ExitCode, Error> {
    let schema = match target {
        SchemaTarget::Record => schemars::schema_for!(SceneStatsRecord),
        SchemaTarget::Config => schemars::schema_for!(BenchConfig),
    };
    print_json(&schema)?;
    Ok(ExitCode::Clean)
}
