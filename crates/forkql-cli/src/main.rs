//! forkql command-line runner.
//!
//! Loads an in-memory corpus and a JSON logical plan, runs the plan through a
//! query session and prints the result.

mod error;
mod formatter;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use error::CliError;
use forkql_core::{EngineConfig, LogicalPlan, MemoryIndex, QuerySession};
use formatter::OutputFormat;

/// forkql plan runner
#[derive(Parser, Debug)]
#[command(name = "forkql")]
#[command(version, about = "Run a forkql logical plan against an in-memory corpus")]
pub struct Args {
    /// Corpus document (indices, field schemas and documents)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Logical plan to run (JSON)
    #[arg(short, long)]
    pub plan: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run branches and phases on the calling thread
    #[arg(long)]
    pub sequential: bool,

    /// Rows per page produced by sources
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Print the prepared plan instead of running it
    #[arg(long)]
    pub explain: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

impl Args {
    /// Build the engine configuration, applying flags over the config file.
    pub fn into_config(&self) -> Result<EngineConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if self.sequential {
            config = config.sequential();
        }
        if let Some(page_size) = self.page_size {
            config = config.with_page_size(page_size);
        }
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forkql_cli=info,forkql_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn read_plan(path: &Path) -> Result<LogicalPlan, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}

fn run(args: &Args) -> Result<String, CliError> {
    let config = args.into_config()?;
    let index = MemoryIndex::from_json_file(&args.data)?;
    let plan = read_plan(&args.plan)?;
    tracing::info!(
        data = %args.data.display(),
        root = plan.command_name(),
        parallel = config.parallel_branches,
        "running plan"
    );

    let session = QuerySession::with_config(Arc::new(index), config);
    if args.explain {
        return Ok(session.prepare(plan)?.plan().to_string());
    }
    let result = session.execute(plan)?.into_result_set();
    tracing::info!(rows = result.len(), "plan finished");
    Ok(formatter::create_formatter(args.format).format_result(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkql_core::expr::matches;
    use forkql_core::plan::{PlanBuilder, Retrieve};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CORPUS: &str = r#"{
        "indices": [{
            "name": "test",
            "fields": [
                {"name": "id", "data_type": "Integer"},
                {"name": "content", "data_type": "Text"}
            ],
            "documents": [
                {"_id": "1", "id": 1, "content": "This is a brown fox"},
                {"_id": "2", "id": 2, "content": "This is a brown dog"},
                {"_id": "5", "id": 5, "content": "There is also a white cat"}
            ]
        }]
    }"#;

    fn file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn plan_file(plan: LogicalPlan) -> NamedTempFile {
        file(&serde_json::to_string(&plan).unwrap())
    }

    fn args(data: &NamedTempFile, plan: &NamedTempFile, format: OutputFormat) -> Args {
        Args {
            data: data.path().to_path_buf(),
            plan: plan.path().to_path_buf(),
            config: None,
            sequential: false,
            page_size: None,
            explain: false,
            format,
        }
    }

    fn fork_plan() -> LogicalPlan {
        PlanBuilder::retrieve(Retrieve::new("test"))
            .fork(|input| {
                vec![
                    input.clone().filter(matches("content", "fox")),
                    input.filter(matches("content", "cat")),
                ]
            })
            .keep(["id", "_fork"])
            .build()
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["forkql", "-d", "corpus.json", "-p", "plan.json", "--sequential", "--format", "csv"]);
        assert_eq!(args.data, PathBuf::from("corpus.json"));
        assert!(args.sequential);
        assert_eq!(args.format, OutputFormat::Csv);
        assert!(!args.into_config().unwrap().parallel_branches);
    }

    #[test]
    fn test_flags_override_config_file() {
        let config = file(r#"{"page_size": 8, "discriminator": "_branch"}"#);
        let mut args = Args::parse_from(["forkql", "-d", "c.json", "-p", "p.json", "--page-size", "2"]);
        args.config = Some(config.path().to_path_buf());
        let config = args.into_config().unwrap();
        assert_eq!(config.page_size, 2);
        assert_eq!(config.discriminator, "_branch");
    }

    #[test]
    fn test_run_fork_plan_as_csv() {
        let data = file(CORPUS);
        let plan = plan_file(fork_plan());
        let output = run(&args(&data, &plan, OutputFormat::Csv)).unwrap();
        let mut lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.remove(0), "id,_fork");
        lines.sort();
        assert_eq!(lines, vec!["1,\"fork0\"", "5,\"fork1\""]);
    }

    #[test]
    fn test_explain_prints_prepared_plan() {
        let data = file(CORPUS);
        let plan = plan_file(fork_plan());
        let mut args = args(&data, &plan, OutputFormat::Table);
        args.explain = true;
        let output = run(&args).unwrap();
        assert!(output.contains("Merge[_fork{keyword}]"));
        assert!(!output.contains("Fork["));
    }

    #[test]
    fn test_invalid_plan_file() {
        let data = file(CORPUS);
        let plan = file("{\"NotAPlan\": {}}");
        let err = run(&args(&data, &plan, OutputFormat::Table)).unwrap_err();
        assert!(matches!(err, CliError::Plan(_)));
    }
}
