//! Binary entry point for the `claimkb` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;

use claimkb::{
    AwsCli, ClaimError, ClaimEvaluation, ClaimProcessor, ClaimSummary, ConfigError,
    GeneratedAnswer, GuardrailError, GuardrailOutcome, GuardrailRef, GuardrailWorkflow,
    InvocationRequest, InvokeError, KnowledgeBasePipeline, KnowledgeBaseQuery, ModelInvoker,
    PayloadError, PipelineConfig, PipelineError, PipelineOutcome, QueryError, QuerySettings,
    RetrievedPassage, Teardown, TeardownError, TeardownSummary, logging, read_document,
    resolve_guardrail,
};

use cli::{Cli, GuardrailArgs, InvokeCommand, ProvisionCommand, QueryCommand, SummariseCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("provisioning failed: {0}")]
    Provision(#[from] PipelineError),
    #[error("guardrail setup failed: {0}")]
    Guardrail(#[from] GuardrailError),
    #[error("invalid request: {0}")]
    Payload(#[from] PayloadError),
    #[error("model invocation failed: {0}")]
    Invoke(#[from] InvokeError),
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("claim summarisation failed: {0}")]
    Claims(#[from] ClaimError),
    #[error("teardown failed: {0}")]
    Teardown(#[from] TeardownError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = PipelineConfig::load_without_cli_args()?;
    match cli {
        Cli::Provision(command) => provision(config, command).await,
        Cli::Guardrail => {
            let outcome = GuardrailWorkflow::from_config(&config)?.execute().await?;
            write_guardrail(io::stdout(), &outcome)?;
            Ok(())
        }
        Cli::Invoke(command) => invoke(&config, command).await,
        Cli::Query(command) => query(&config, command).await,
        Cli::Summarise(command) => summarise(&config, command).await,
        Cli::Teardown => {
            let summary = Teardown::from_config(&config)?.sweep().await?;
            write_teardown(io::stdout(), &summary)?;
            Ok(())
        }
    }
}

async fn provision(config: PipelineConfig, command: ProvisionCommand) -> Result<(), CliError> {
    let pipeline = KnowledgeBasePipeline::from_config(config)?;
    let outcome = pipeline
        .execute(command.documents.as_deref().map(Utf8Path::new))
        .await?;
    write_pipeline(io::stdout(), &outcome)?;
    Ok(())
}

async fn invoke(config: &PipelineConfig, command: InvokeCommand) -> Result<(), CliError> {
    let request = build_request(&config.model_id, &command)?;
    let invoker = ModelInvoker::from_config(config)?;
    let guardrail = select_guardrail(config, command.guardrail).await?;
    let outcome = invoker.invoke(&request, guardrail.as_ref()).await?;
    writeln!(io::stdout(), "{}", outcome.text)?;
    Ok(())
}

async fn query(config: &PipelineConfig, command: QueryCommand) -> Result<(), CliError> {
    let configured = KnowledgeBaseQuery::from_config(config)?;
    let settings = QuerySettings {
        number_of_results: command
            .results
            .unwrap_or(configured.settings().number_of_results),
        ..configured.settings().clone()
    };
    let knowledge_base = configured.with_settings(settings);
    let question = command.question.join(" ");
    let guardrail = select_guardrail(config, command.guardrail).await?;
    let knowledge_base_id = knowledge_base.knowledge_base_id().await?;
    if command.retrieve_only {
        let passages = knowledge_base
            .retrieve(&knowledge_base_id, &question, guardrail.as_ref())
            .await?;
        write_passages(io::stdout(), &passages)?;
    } else {
        let answer = knowledge_base
            .retrieve_and_generate(&knowledge_base_id, &question, guardrail.as_ref())
            .await?;
        write_answer(io::stdout(), &answer)?;
    }
    Ok(())
}

async fn summarise(config: &PipelineConfig, command: SummariseCommand) -> Result<(), CliError> {
    let processor = ClaimProcessor::from_config(config)?;
    let document = read_document(Utf8Path::new(&command.document))?;
    let claim = processor.summarise(&document).await?;
    let evaluation = if command.evaluate {
        let guardrail = select_guardrail(config, command.guardrail).await?;
        Some(
            processor
                .evaluate(&document, &claim.summary, guardrail.as_ref())
                .await?,
        )
    } else {
        None
    };
    write_claim(io::stdout(), &claim, evaluation.as_ref())?;
    Ok(())
}

/// Turns the guardrail flags into a reference, looking up the configured
/// guardrail's newest published version for `--guarded`.
async fn select_guardrail(
    config: &PipelineConfig,
    args: GuardrailArgs,
) -> Result<Option<GuardrailRef>, CliError> {
    if let (Some(id), Some(version)) = (args.guardrail_id, args.guardrail_version) {
        return Ok(Some(GuardrailRef::new(id, version)?));
    }
    if !args.guarded {
        return Ok(None);
    }
    let cli = AwsCli::with_process_runner(config.aws_cli_config()?);
    Ok(Some(resolve_guardrail(&cli, &config.guardrail_name).await?))
}

fn build_request(
    default_model: &str,
    command: &InvokeCommand,
) -> Result<InvocationRequest, PayloadError> {
    let model_id = command.model_id.as_deref().unwrap_or(default_model);
    let mut builder = InvocationRequest::builder(model_id, command.prompt.join(" "));
    if let Some(system) = &command.system {
        builder = builder.system(system.as_str());
    }
    if let Some(max_tokens) = command.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    if let Some(temperature) = command.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(top_p) = command.top_p {
        builder = builder.top_p(top_p);
    }
    builder.build()
}

fn write_pipeline(mut target: impl Write, outcome: &PipelineOutcome) -> io::Result<()> {
    if let Some(count) = outcome.uploaded_documents {
        writeln!(target, "uploaded documents: {count}")?;
    }
    writeln!(target, "vector bucket: {}", outcome.vector_bucket)?;
    writeln!(target, "knowledge base: {}", outcome.knowledge_base_id)?;
    writeln!(target, "data source: {}", outcome.data_source_id)?;
    writeln!(target, "ingestion job: {}", outcome.ingestion_job_id)
}

fn write_guardrail(mut target: impl Write, outcome: &GuardrailOutcome) -> io::Result<()> {
    let origin = if outcome.published {
        "published"
    } else {
        "existing"
    };
    writeln!(target, "guardrail: {}", outcome.guardrail_id)?;
    writeln!(target, "version: {} ({origin})", outcome.version)
}

fn write_passages(mut target: impl Write, passages: &[RetrievedPassage]) -> io::Result<()> {
    if passages.is_empty() {
        return writeln!(target, "no passages found");
    }
    for (rank, passage) in passages.iter().enumerate() {
        let source = passage.source.as_deref().unwrap_or("unknown source");
        match passage.score {
            Some(score) => writeln!(target, "[{}] {source} (score {score:.3})", rank + 1)?,
            None => writeln!(target, "[{}] {source}", rank + 1)?,
        }
        writeln!(target, "{}", passage.text)?;
    }
    Ok(())
}

fn write_answer(mut target: impl Write, answer: &GeneratedAnswer) -> io::Result<()> {
    writeln!(target, "{}", answer.text)?;
    if answer.guardrail_intervened {
        writeln!(target, "guardrail intervened")?;
    }
    for source in &answer.sources {
        writeln!(target, "source: {source}")?;
    }
    Ok(())
}

fn write_claim(
    mut target: impl Write,
    claim: &ClaimSummary,
    evaluation: Option<&ClaimEvaluation>,
) -> io::Result<()> {
    writeln!(target, "extracted:\n{}\n", claim.extracted)?;
    writeln!(target, "summary:\n{}", claim.summary)?;
    if let Some(verdicts) = evaluation {
        writeln!(target, "\naccuracy:\n{}\n", verdicts.accuracy)?;
        writeln!(target, "quality:\n{}", verdicts.quality)?;
    }
    Ok(())
}

fn write_teardown(mut target: impl Write, summary: &TeardownSummary) -> io::Result<()> {
    writeln!(
        target,
        "deleted knowledge bases: {}, vector stores: {}, guardrails: {}",
        summary.deleted_knowledge_bases, summary.deleted_vector_stores, summary.deleted_guardrails
    )
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
