use crate::database::VectorStore;
use crate::error::RagError;
use crate::generator::Generator;
use crate::rag::{QueryOutcome, RagEngine};
use log::{error, info};
use std::io::{self, BufRead, Write};

pub const NO_INFORMATION_MESSAGE: &str = "⚠️ No relevant information found.";
pub const FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

/// One question and the reply shown for it
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// A conversation transcript over a shared engine.
///
/// Every turn appends exactly one exchange, whatever the outcome, so the
/// transcript never goes out of step with what the user saw.
#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<Exchange>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[Exchange] {
        &self.transcript
    }

    /// Answer a message and record the exchange
    pub async fn respond<S: VectorStore, G: Generator>(
        &mut self,
        engine: &RagEngine<S, G>,
        message: &str,
    ) -> &Exchange {
        let answer = render(engine.answer(message).await);
        self.transcript.push(Exchange {
            question: message.to_string(),
            answer,
        });
        &self.transcript[self.transcript.len() - 1]
    }
}

/// Turn a query result into the text shown to the user
pub fn render(result: Result<QueryOutcome, RagError>) -> String {
    match result {
        Ok(QueryOutcome::Answer(text)) => text,
        Ok(QueryOutcome::NoRelevantInformation) => NO_INFORMATION_MESSAGE.to_string(),
        Err(RagError::EmptyQuery) => RagError::EmptyQuery.to_string(),
        Err(e) => {
            error!("Failed to answer question: {}", e);
            FAILURE_MESSAGE.to_string()
        }
    }
}

/// Run the interactive question loop until `exit`, `quit` or end of input
pub async fn run_query_loop<S, G, R, W>(
    engine: &RagEngine<S, G>,
    session: &mut ChatSession,
    mut input: R,
    mut output: W,
) -> io::Result<()>
where
    S: VectorStore,
    G: Generator,
    R: BufRead,
    W: Write,
{
    info!(
        "Ready to answer questions about {}. Type 'exit' to quit.",
        engine.store().collection()
    );

    let mut buffer = String::new();

    loop {
        write!(output, "\nYour question: ")?;
        output.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            break;
        }

        let question = buffer.trim();
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let exchange = session.respond(engine, question).await;
        writeln!(output, "\n{}", exchange.answer)?;
    }

    info!("Goodbye!");
    Ok(())
}
