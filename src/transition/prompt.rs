use std::io::{self, BufRead, Write};

/// Ask a yes/no question that defaults to "no".
///
/// Only `y` or `yes` (any case, surrounding whitespace ignored) confirm;
/// empty input, EOF and anything else decline.
pub fn confirm(input: &mut impl BufRead, output: &mut impl Write, question: &str) -> io::Result<bool> {
    write!(output, "{question} [y/N] ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
