//! Console operator for interactive narrowing.
//!
//! Prompts on the output stream and reads answers line by line. End of input
//! at any prompt stops the session.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

use crate::calibrate::{Bounds, Decision, Operator};
use crate::error::{CalibrationError, Result};
use crate::report::{ReportTable, format_iteration_header, format_table};

pub struct ConsoleOperator<I, O> {
    input: I,
    output: O,
    initial: Option<Bounds>,
    default_count: usize,
}

impl ConsoleOperator<StdinLock<'static>, Stdout> {
    pub fn stdio(initial: Option<Bounds>, default_count: usize) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), initial, default_count)
    }
}

impl<I: BufRead, O: Write> ConsoleOperator<I, O> {
    /// `initial` answers the first bounds prompt without asking.
    pub fn new(input: I, output: O, initial: Option<Bounds>, default_count: usize) -> Self {
        Self {
            input,
            output,
            initial,
            default_count,
        }
    }

    pub fn into_output(self) -> O {
        self.output
    }

    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{text}").map_err(write_error)?;
        self.output.flush().map_err(write_error)?;

        let mut line = String::new();
        let bytes = self
            .input
            .read_line(&mut line)
            .map_err(|e| CalibrationError::io("Failed to read input", e))?;
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}").map_err(write_error)
    }
}

impl<I: BufRead, O: Write> Operator for ConsoleOperator<I, O> {
    fn bounds(&mut self, iteration: usize) -> Result<Option<Bounds>> {
        if let Some(bounds) = self.initial.take() {
            return Ok(Some(bounds));
        }
        loop {
            let text = format!(
                "Iteration {iteration}: enter `min max [count]` (count defaults to {}, q to quit): ",
                self.default_count
            );
            let Some(answer) = self.prompt(&text)? else {
                return Ok(None);
            };
            if answer.eq_ignore_ascii_case("q") {
                return Ok(None);
            }
            match parse_bounds(&answer, self.default_count) {
                Ok(bounds) => return Ok(Some(bounds)),
                Err(msg) => self.say(&msg)?,
            }
        }
    }

    fn display(&mut self, iteration: usize, table: &ReportTable) -> Result<()> {
        let text = format!(
            "{}{}",
            format_iteration_header(iteration, table.len()),
            format_table(table)
        );
        write!(self.output, "{text}").map_err(write_error)
    }

    fn decide(&mut self) -> Result<Decision> {
        loop {
            let Some(answer) = self.prompt("Continue narrowing? [Y/n]: ")? else {
                return Ok(Decision::Stop);
            };
            match answer.to_ascii_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(Decision::Continue),
                "n" | "no" | "q" => return Ok(Decision::Stop),
                other => self.say(&format!("Please answer y or n (got '{other}')."))?,
            }
        }
    }

    fn reject(&mut self, error: &CalibrationError) -> Result<()> {
        self.say(&format!("Rejected: {error}"))
    }
}

/// Parse `min max [count]`.
pub fn parse_bounds(answer: &str, default_count: usize) -> std::result::Result<Bounds, String> {
    let parts: Vec<&str> = answer
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();
    let number = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number."))
    };
    match parts.as_slice() {
        [min, max] => Ok(Bounds::new(number(min)?, number(max)?, default_count)),
        [min, max, count] => {
            let count = count
                .parse::<usize>()
                .map_err(|_| format!("'{count}' is not a whole number."))?;
            Ok(Bounds::new(number(min)?, number(max)?, count))
        }
        _ => Err("Expected two bounds and an optional count, e.g. `0.02 0.08 10`.".to_string()),
    }
}

fn write_error(e: io::Error) -> CalibrationError {
    CalibrationError::io("Failed to write to console", e)
}
