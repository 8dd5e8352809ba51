//! Line-based prompts on stdin.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// Print `question` and read one trimmed line from stdin.
pub fn ask(question: &str) -> Result<String> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    ask_with(question, &mut stdin.lock(), &mut stdout)
}

/// Ask every question in turn, pairing each with its answer.
pub fn answer_all(questions: &[String]) -> Result<Vec<(String, String)>> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    answer_all_with(questions, &mut stdin.lock(), &mut stdout)
}

fn ask_with(question: &str, input: &mut impl BufRead, out: &mut impl Write) -> Result<String> {
    write!(out, "{} ", question)?;
    // Flush so the prompt appears before reading
    out.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn answer_all_with(
    questions: &[String],
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<Vec<(String, String)>> {
    questions
        .iter()
        .map(|question| {
            let answer = ask_with(&format!("\n{}\nYour answer:", question), input, out)?;
            Ok((question.clone(), answer))
        })
        .collect()
}
