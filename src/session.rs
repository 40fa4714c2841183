//! Interactive question-answering session.
//!
//! One question at a time; the loop blocks while retrieval and generation
//! run. The transcript is append-only and lives only as long as the
//! session; failed turns are recorded rather than dropped.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::chain::QaChain;
use crate::models::Answer;

#[derive(Debug)]
pub enum TurnOutcome {
    Answered(Answer),
    Failed(String),
}

#[derive(Debug)]
pub struct Turn {
    pub question: String,
    pub outcome: TurnOutcome,
}

/// Append-only record of one session's turns.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn record_answer(&mut self, question: &str, answer: Answer) {
        self.turns.push(Turn {
            question: question.to_string(),
            outcome: TurnOutcome::Answered(answer),
        });
    }

    pub fn record_failure(&mut self, question: &str, error: String) {
        self.turns.push(Turn {
            question: question.to_string(),
            outcome: TurnOutcome::Failed(error),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Answer one question and print it.
pub async fn run_ask(chain: &QaChain, question: &str) -> Result<()> {
    let answer = chain.answer(question).await?;
    print_answer(&answer);
    Ok(())
}

/// Interactive loop: read a question per line, answer, repeat.
/// `exit`, `quit`, or EOF ends the session.
pub async fn run_chat(chain: &QaChain) -> Result<()> {
    println!(
        "docqa — ask questions about your documents ({} chunks indexed, model: {}).",
        chain.index().len(),
        chain.backend_model()
    );
    println!("Type 'exit' or press Ctrl-D to quit.");
    println!();

    let stdin = std::io::stdin();
    let mut transcript = Transcript::default();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match chain.answer(question).await {
            Ok(answer) => {
                print_answer(&answer);
                transcript.record_answer(question, answer);
            }
            Err(e) => {
                eprintln!("error: {:#}", e);
                transcript.record_failure(question, format!("{:#}", e));
            }
        }
    }

    println!();
    println!("{} turn(s) this session.", transcript.len());
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{}", answer.text.trim());
    println!();
    if !answer.sources.is_empty() {
        println!("sources:");
        for (i, citation) in answer.sources.iter().enumerate() {
            println!("  [{}] {} — page {}", i + 1, citation.file, citation.page);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citation;

    fn answer(text: &str) -> Answer {
        Answer {
            text: text.to_string(),
            sources: vec![Citation {
                file: "doc.pdf".to_string(),
                page: 1,
            }],
        }
    }

    #[test]
    fn transcript_is_append_only() {
        let mut transcript = Transcript::default();
        assert!(transcript.is_empty());

        transcript.record_answer("first?", answer("one"));
        transcript.record_answer("second?", answer("two"));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].question, "first?");
        assert_eq!(transcript.turns()[1].question, "second?");
    }

    #[test]
    fn failed_turns_are_recorded() {
        let mut transcript = Transcript::default();
        transcript.record_answer("ok?", answer("fine"));
        transcript.record_failure("broken?", "backend out of memory".to_string());

        assert_eq!(transcript.len(), 2);
        match &transcript.turns()[1].outcome {
            TurnOutcome::Failed(message) => assert!(message.contains("out of memory")),
            other => panic!("expected failed turn, got {:?}", other),
        }
    }
}
