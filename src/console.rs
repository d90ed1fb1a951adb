//! Interactive labeling on a terminal

use relink_core::FieldValue;
use relink_training::{LabelQuery, LabelResponse, Labeler};
use std::io::{self, BufRead, StdinLock, Stdout, Write};

/// Shows both records side by side and reads y/n/u/f answers.
///
/// End of input or any I/O error counts as `Finished`.
pub struct ConsoleLabeler<R, W> {
    input: R,
    output: W,
}

impl ConsoleLabeler<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleLabeler<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn prompt(&mut self, query: &LabelQuery<'_>) -> io::Result<()> {
        let width = query.fields.iter().map(|f| f.len()).max().unwrap_or(0);
        writeln!(self.output)?;
        for field in query.fields {
            writeln!(
                self.output,
                "{:>width$} : {}",
                field,
                display(query.left.get(field)),
                width = width
            )?;
        }
        writeln!(self.output)?;
        for field in query.fields {
            writeln!(
                self.output,
                "{:>width$} : {}",
                field,
                display(query.right.get(field)),
                width = width
            )?;
        }
        writeln!(self.output)?;
        write!(
            self.output,
            "{} match, {} distinct labeled, {} left to review",
            query.labeled_matches, query.labeled_distinct, query.remaining
        )?;
        if let Some(score) = query.score {
            write!(self.output, ", model says {:.3}", score)?;
        }
        writeln!(self.output)?;
        write!(self.output, "Do these records refer to the same thing? (y)es / (n)o / (u)nsure / (f)inished ")?;
        self.output.flush()
    }
}

impl<R: BufRead, W: Write> Labeler for ConsoleLabeler<R, W> {
    fn label(&mut self, query: &LabelQuery<'_>) -> LabelResponse {
        if self.prompt(query).is_err() {
            return LabelResponse::Finished;
        }
        loop {
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return LabelResponse::Finished,
                Ok(_) => {}
            }
            if let Some(response) = parse_answer(&line) {
                return response;
            }
            if write!(self.output, "Please answer y, n, u or f: ")
                .and_then(|_| self.output.flush())
                .is_err()
            {
                return LabelResponse::Finished;
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<LabelResponse> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(LabelResponse::Match),
        "n" | "no" => Some(LabelResponse::Distinct),
        "u" | "unsure" | "s" | "skip" => Some(LabelResponse::Skip),
        "f" | "finished" | "q" | "quit" => Some(LabelResponse::Finished),
        _ => None,
    }
}

fn display(value: &FieldValue) -> String {
    value
        .as_text()
        .map(|t| t.into_owned())
        .unwrap_or_else(|| String::from("(missing)"))
}
