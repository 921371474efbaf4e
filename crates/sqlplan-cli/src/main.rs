//! sqlplan command-line front end
//!
//! Reads a JSON operation pipeline, builds the query AST for the configured
//! dialect and prints it as JSON, or as an indented tree with `--explain`.

use anyhow::{bail, Context, Result};
use sqlplan_builder::{QueryBuilder, SqlOracle};
use sqlplan_ir::Operation;
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod logging;

use config::Config;

const USAGE: &str = "usage: sqlplan-cli <pipeline.json> [--config FILE] [--dialect NAME] [--explain]";
const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Debug, Default, PartialEq)]
struct Args {
    pipeline: PathBuf,
    config: Option<PathBuf>,
    dialect: Option<String>,
    explain: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut pipeline = None;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = Some(args.next().context("--config needs a file")?.into()),
                "--dialect" => parsed.dialect = Some(args.next().context("--dialect needs a name")?),
                "--explain" => parsed.explain = true,
                "-h" | "--help" => bail!(USAGE),
                flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
                path => {
                    if pipeline.replace(PathBuf::from(path)).is_some() {
                        bail!("more than one pipeline file given\n{}", USAGE);
                    }
                }
            }
        }

        parsed.pipeline = pipeline.context(USAGE)?;
        Ok(parsed)
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Config::load(DEFAULT_CONFIG).with_context(|| format!("loading config {}", DEFAULT_CONFIG))?
        }
        None => Config::from_env(),
    };
    if let Some(name) = &args.dialect {
        config.dialect.name = name.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = load_config(&args)?;
    config.apply_logging_env();
    logging::init()?;

    let dialect = config.dialect()?;
    let text = std::fs::read_to_string(&args.pipeline)
        .with_context(|| format!("reading pipeline {}", args.pipeline.display()))?;
    let pipeline: Operation = serde_json::from_str(&text)
        .with_context(|| format!("parsing pipeline {}", args.pipeline.display()))?;

    info!(
        dialect = dialect.name(),
        fingerprint = %pipeline.fingerprint(),
        "building pipeline"
    );

    let builder = QueryBuilder::new(&SqlOracle, &dialect).with_suffixes(config.suffixes());
    let query = builder
        .build(&pipeline)
        .with_context(|| format!("building {} pipeline", pipeline.kind()))?;

    if args.explain {
        print!("{}", query.explain());
    } else {
        println!("{}", serde_json::to_string_pretty(&query)?);
    }
    Ok(())
}
