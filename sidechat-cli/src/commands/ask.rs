use std::io::{self, Write};

use anyhow::{Result, anyhow};
use clap::Args;
use shared::{
    config::Config,
    models::AskAiRequest,
    streaming::{StreamHandler, StreamState},
};
use tracing::warn;

use crate::api::SidechatClient;

#[derive(Args, Debug)]
#[command(about = "Ask the AI assistant a question and stream the answer")]
pub struct AskArgs {
    /// The question to ask
    pub question: String,

    /// Conversation transcript the assistant should answer within
    #[arg(long)]
    pub context: Option<String>,

    /// Wait for the complete answer instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

/// Prints fragments to stdout as they arrive and keeps the first error.
#[derive(Debug, Default)]
struct TerminalHandler {
    printed: bool,
    error: Option<String>,
}

impl StreamHandler for TerminalHandler {
    fn on_delta(&mut self, fragment: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout only loses output; the answer is still assembled.
        let _ = stdout.write_all(fragment.as_bytes());
        let _ = stdout.flush();
        self.printed = true;
    }

    fn on_final(&mut self, full_text: &str) {
        if !self.printed {
            print!("{full_text}");
        }
        println!();
    }

    fn on_error(&mut self, message: &str) {
        if self.printed {
            println!();
        }
        self.error.get_or_insert_with(|| message.to_string());
    }
}

pub async fn run(args: AskArgs, config: &Config) -> Result<()> {
    let client = SidechatClient::new(config.base_url()?, config.request_timeout())?;
    let mut request = AskAiRequest::new(args.question);
    if let Some(context) = args.context {
        request = request.with_context(context);
    }

    if args.no_stream {
        let answer = client.ask_ai(&request).await?;
        println!("{}", answer.content);
        return Ok(());
    }

    let mut handler = TerminalHandler::default();
    let outcome = client.ask_ai_stream(&request, &mut handler).await;
    if let Some(message) = handler.error {
        return Err(anyhow!(message));
    }
    let summary = outcome?;
    if summary.state == StreamState::Open {
        if handler.printed {
            println!();
        }
        warn!("answer stream ended without a final event");
    }
    Ok(())
}
