//! CLI command execution.
//!
//! Dispatches parsed commands against the entry runner. Catalogue-only
//! commands (`workflows`, `list`) avoid constructing providers so they
//! work without credentials.

use crate::config::Config;
use crate::engine::WorkflowRegistry;
use crate::error::Result;
use crate::preprocess::PipelineOptions;
use crate::report::list_outputs;
use crate::runner::{RunOptions, Runner};
use crate::workflows::register_all;

use super::output::{
    OutputFormat, format_kb_status, format_listing, format_workflows,
};
use super::parser::{Cli, Commands, KbCommand, ListTarget};

/// Executes a parsed CLI invocation, returning the text to print.
///
/// # Errors
///
/// Surfaces configuration, engine, provider, and I/O errors; the caller
/// maps them to exit codes.
pub async fn execute(cli: Cli, mut config: Config) -> Result<String> {
    if let Some(db_path) = cli.db_path.clone() {
        config.db_path = db_path;
    }
    let format = OutputFormat::parse(&cli.format);

    match cli.command {
        Commands::Run {
            query,
            workflow,
            thread_id,
            no_report,
            no_log,
        } => {
            let runner = Runner::from_config(config)?;
            let outcome = runner
                .run(
                    &query,
                    RunOptions {
                        workflow,
                        thread_id,
                        write_report: !no_report,
                        write_log: !no_log,
                    },
                )
                .await?;
            let mut out = outcome.report;
            if let Some(path) = outcome.report_path {
                out.push_str(&format!("\nreport written to {}\n", path.display()));
            }
            Ok(out)
        }

        Commands::Resume { thread_id } => {
            let runner = Runner::from_config(config)?;
            let outcome = runner.resume(&thread_id).await?;
            Ok(outcome.report)
        }

        Commands::Workflows { detailed } => {
            // Registration without providers: the catalogue needs no credentials.
            let registry = WorkflowRegistry::new();
            register_all(&registry, &config)?;
            Ok(format_workflows(&registry.list(), detailed, format))
        }

        Commands::List { target } => match target {
            ListTarget::Reports { limit } => {
                let names = list_outputs(&config.report_dir, ".md", limit)?;
                Ok(format_listing("reports", &names, format))
            }
            ListTarget::Logs { limit } => {
                let names = list_outputs(&config.log_dir, ".json", limit)?;
                Ok(format_listing("logs", &names, format))
            }
        },

        Commands::Ingest {
            dir,
            collection,
            min_quality,
            dry_run,
        } => {
            let collection = collection.unwrap_or_else(|| config.collection.clone());
            let mut options = PipelineOptions {
                min_content_length: config.min_content_length,
                min_quality_score: config.min_quality_score,
                ..PipelineOptions::default()
            };
            if let Some(min_quality) = min_quality {
                options.min_quality_score = min_quality;
            }
            let runner = Runner::from_config(config)?;
            let (report, installed) = runner.ingest(&dir, &collection, options, dry_run).await?;
            let mut out = report.render();
            if dry_run {
                out.push_str("\ndry run: nothing installed\n");
            } else {
                out.push_str(&format!(
                    "\ninstalled {installed} chunks into '{collection}'\n"
                ));
            }
            Ok(out)
        }

        Commands::Kb { command } => match command {
            KbCommand::Status => {
                let runner = Runner::from_config(config)?;
                let status = runner.kb_status().await?;
                Ok(format_kb_status(&status, format))
            }
        },
    }
}
