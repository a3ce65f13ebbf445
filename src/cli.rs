use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    config::Config,
    models::{BatchJobStatus, JobStatus, TopicScope},
    pipeline::PipelineModels,
    store::Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    InitSchema,
    RunSentiment,
    RunTopics(TopicScope),
}

/// Runs a one-shot subcommand when `args[1]` names one. Returns `false`
/// when the process should start serving instead.
pub async fn maybe_run_from_cli(args: &[String], config: &Config) -> Result<bool> {
    let Some(command) = parse_args(args)? else {
        return Ok(false);
    };

    let config = config.clone();
    let result = tokio::task::spawn_blocking(move || execute(command, &config))
        .await
        .context("CLI task panicked")??;
    println!("{}", serde_json::to_string(&result)?);
    Ok(true)
}

fn execute(command: Command, config: &Config) -> Result<Value> {
    let store = Store::open(&config.database_path, config.pool_size)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    let body = match command {
        Command::InitSchema => json!({
            "status": format!("Schema ready at {}", config.database_path.display())
        }),
        Command::RunSentiment => {
            let models = PipelineModels::from_config(config)?;
            let outcome = models.run_sentiment(&store)?;
            serde_json::to_value(JobStatus {
                status: outcome.summary(),
            })?
        }
        Command::RunTopics(TopicScope::AllPhones) => {
            let models = PipelineModels::from_config(config)?;
            let status = models.run_topics(&store, TopicScope::AllPhones)?;
            serde_json::to_value(BatchJobStatus { status })?
        }
        Command::RunTopics(TopicScope::SinglePhone(phone_id)) => {
            let models = PipelineModels::from_config(config)?;
            let status = models.run_single_topic(&store, phone_id)?;
            serde_json::to_value(JobStatus { status })?
        }
    };
    info!(?command, "CLI command finished");
    Ok(body)
}

fn parse_args(args: &[String]) -> Result<Option<Command>> {
    let Some(name) = args.get(1) else {
        return Ok(None);
    };

    let command = match name.as_str() {
        "init-schema" => Command::InitSchema,
        "run-sentiment" => Command::RunSentiment,
        "run-topics" => {
            let mut phone_id = None;
            let mut i = 2usize;
            while i < args.len() {
                let key = args[i].as_str();
                let val = args.get(i + 1);
                match (key, val) {
                    ("--phone-id", Some(v)) => {
                        let id = v
                            .parse::<i64>()
                            .with_context(|| format!("--phone-id must be an integer, got `{v}`"))?;
                        phone_id = Some(id);
                        i += 2;
                    }
                    _ => bail!("Unknown or incomplete argument near `{key}`"),
                }
            }
            Command::RunTopics(match phone_id {
                Some(id) => TopicScope::SinglePhone(id),
                None => TopicScope::AllPhones,
            })
        }
        _ => return Ok(None),
    };

    if !matches!(command, Command::RunTopics(_)) && args.len() > 2 {
        bail!("`{name}` takes no arguments");
    }
    Ok(Some(command))
}
