use std::io::{self, BufRead, Write};

use anyhow::{bail, Result};
use clap::Parser;
use sitesage::{telemetry, AssistantArgs, ServiceState};

#[derive(Parser, Debug)]
#[command(
    name = "sitesage-assistant",
    about = "Answer questions about a crawled website, retrieval first"
)]
struct AssistantCli {
    #[command(flatten)]
    assistant: AssistantArgs,

    /// Answer this one question and exit instead of prompting
    #[arg(long)]
    question: Option<String>,

    /// Print every tool call and observation after the answer
    #[arg(long, default_value_t = false)]
    show_trace: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let cli = AssistantCli::parse();

    let state = ServiceState::start(&cli.assistant);
    let assistant = match &state {
        ServiceState::Ready(assistant) => assistant,
        ServiceState::NotReady(reason) => bail!("assistant is not ready: {reason}"),
    };

    if let Some(question) = cli.question.as_deref() {
        answer(&state, question, cli.show_trace)?;
        return Ok(());
    }

    println!("Ready ({}). Type 'exit' to quit.\n", assistant.ingest_report());
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Question: ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("exit") {
            break;
        }
        answer(&state, question, cli.show_trace)?;
    }
    println!("Exiting...");
    Ok(())
}

fn answer(state: &ServiceState, question: &str, show_trace: bool) -> Result<()> {
    if show_trace && !question.trim().is_empty() {
        if let ServiceState::Ready(assistant) = state {
            let (reply, steps) = assistant.ask_with_trace(question);
            for (idx, step) in steps.iter().enumerate() {
                println!("[{}] {:?}\n    {}", idx + 1, step.action, step.observation.replace('\n', "\n    "));
            }
            println!("\nAnswer: {reply}\n");
            return Ok(());
        }
    }
    let reply = state.ask(question)?;
    println!("\nAnswer: {reply}\n");
    Ok(())
}
