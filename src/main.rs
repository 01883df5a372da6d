mod agents;
mod config;
mod docs;
mod error;
mod llm;
mod pipeline;
mod retrieve;
#[cfg(test)]
mod testing;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agents::citations::SOURCES_HEADING;
use agents::writer::COMPOSE_STAGE;
use config::Settings;
use docs::WorkspaceStore;
use llm::{LlmClient, StreamDelta, StreamSink};
use pipeline::Pipeline;
use retrieve::rerank::Reranker;
use retrieve::{Retriever, TavilyRetriever};

/// What to echo for one streamed delta: reasoning from any stage, content
/// only from the answer call. Structured stages stay quiet.
fn echo_text<'a>(stage: &str, delta: StreamDelta<'a>, show_think: bool) -> Option<&'a str> {
    let answering = stage == COMPOSE_STAGE;
    match delta {
        StreamDelta::Reasoning(text) => Some(text),
        StreamDelta::Content(text) if answering => Some(text),
        StreamDelta::Done if answering || show_think => Some("\n"),
        _ => None,
    }
}

/// Echo streamed model output to stdout as it arrives.
fn stdout_sink(show_think: bool) -> StreamSink {
    let header_shown = Arc::new(AtomicBool::new(false));
    Arc::new(move |stage: &str, delta: StreamDelta<'_>| {
        let Some(text) = echo_text(stage, delta, show_think) else {
            return;
        };
        let mut out = std::io::stdout().lock();
        if stage == COMPOSE_STAGE && !header_shown.swap(true, Ordering::SeqCst) {
            let _ = write!(out, "\n=== Answer ===\n");
        }
        let _ = write!(out, "{}", text);
        let _ = out.flush();
    })
}

/// The part of a composed answer that was never streamed: the source list.
fn unstreamed_tail(answer: &str) -> &str {
    answer
        .rfind(SOURCES_HEADING)
        .map(|i| &answer[i..])
        .unwrap_or("")
}

type StdinLines = Lines<BufReader<Stdin>>;

/// Read non-empty lines until a blank line or EOF.
async fn read_block(lines: &mut StdinLines) -> Result<Vec<String>> {
    let mut answers = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        answers.push(line.to_string());
    }
    Ok(answers)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    info!(
        base_url = %settings.llm_base_url,
        key = %settings.key_prefix(),
        model = %settings.chat_model,
        "Settings loaded"
    );

    let mut llm = LlmClient::new(&settings).context("Failed to init LLM client")?;
    if settings.stream {
        llm = llm.with_sink(stdout_sink(settings.show_think));
    }
    let llm = Arc::new(llm);

    let store = WorkspaceStore::new(&settings.data_dir)
        .await
        .context("Failed to init workspace store")?;
    info!("Workspace store initialized at {:?}", settings.data_dir);

    let retriever =
        TavilyRetriever::new(&settings).map(|r| Arc::new(r) as Arc<dyn Retriever>);
    let mut pipeline = Pipeline::new(&settings, store, llm, retriever);

    if settings.rerank_enabled {
        match Reranker::new(&settings) {
            Ok(r) => pipeline = pipeline.with_reranker(r),
            Err(e) => warn!(error = %e, "Rerank disabled"),
        }
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let ws = match args.first().map(String::as_str) {
        Some("--list") => {
            for id in pipeline.store().list().await? {
                println!("{}", id);
            }
            return Ok(());
        }
        Some("--resume") => {
            let id = args.get(1).context("--resume needs a workspace id")?;
            let ws = pipeline.store().load(id).await?;
            println!("Resuming {}: {}", ws.id, ws.question);
            ws
        }
        _ => {
            let mut question = args.join(" ");
            if question.trim().is_empty() {
                println!("Question:");
                question = read_block(&mut stdin).await?.join(" ");
            }
            let question = question.trim().to_string();
            if question.is_empty() {
                anyhow::bail!("No question given");
            }

            let (ws, questions) = pipeline.begin(&question).await?;
            println!("\nClarifying questions:");
            for (i, q) in questions.iter().enumerate() {
                println!("  {}. {}", i + 1, q);
            }
            ws
        }
    };

    println!("\nYour answers (one per line, empty line to finish):");
    let answers = read_block(&mut stdin).await?;

    let (ws, answer) = pipeline.proceed(ws, &answers).await?;
    if settings.stream {
        print!("{}", unstreamed_tail(&answer));
    } else {
        println!("\n=== Answer ===\n{}", answer);
    }
    println!("\nWorkspace: {}", ws.id);
    info!(ws_id = %ws.id, docs = ws.docs.len(), "Run complete");

    Ok(())
}
