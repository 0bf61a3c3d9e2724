use anyhow::{Result, bail};
use std::io::{self, IsTerminal, Write};

use socgen_lib::bootloader::Choice;

/// Ask the operator to pick one of `options`; an empty answer takes `default`.
///
/// Answers match a choice by unique prefix, so `c` selects "continue".
pub fn choose(message: &str, options: &[Choice], default: Choice, force: bool) -> Result<Choice> {
  if force {
    return Ok(default);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Cannot prompt for a decision in non-interactive mode. Use --yes, --reuse or --rebuild to proceed.");
  }

  let labels: Vec<String> = options
    .iter()
    .map(|c| if *c == default { format!("[{}]", c) } else { c.to_string() })
    .collect();

  loop {
    write!(io::stderr(), "{} ({}) ", message, labels.join("/"))?;
    io::stderr().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
      bail!("No answer given");
    }

    if let Some(choice) = parse_choice(&input, options, default) {
      return Ok(choice);
    }
    writeln!(io::stderr(), "Please answer one of: {}", labels.join(", "))?;
  }
}

fn parse_choice(input: &str, options: &[Choice], default: Choice) -> Option<Choice> {
  let answer = input.trim().to_ascii_lowercase();
  if answer.is_empty() {
    return Some(default);
  }
  let mut matches = options.iter().filter(|c| c.to_string().starts_with(&answer));
  match (matches.next(), matches.next()) {
    (Some(choice), None) => Some(*choice),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const REUSE: &[Choice] = &[Choice::Reuse, Choice::Rebuild, Choice::Abort];

  #[test]
  fn empty_answer_takes_default() {
    assert_eq!(parse_choice("\n", REUSE, Choice::Rebuild), Some(Choice::Rebuild));
  }

  #[test]
  fn unique_prefix_selects_choice() {
    assert_eq!(parse_choice("a\n", REUSE, Choice::Rebuild), Some(Choice::Abort));
    assert_eq!(parse_choice("REU", REUSE, Choice::Rebuild), Some(Choice::Reuse));
    assert_eq!(parse_choice("reb", REUSE, Choice::Rebuild), Some(Choice::Rebuild));
  }

  #[test]
  fn ambiguous_or_unknown_answer_is_rejected() {
    assert_eq!(parse_choice("re", REUSE, Choice::Rebuild), None);
    assert_eq!(parse_choice("continue", REUSE, Choice::Rebuild), None);
  }

  #[test]
  fn force_skips_prompt() {
    assert_eq!(choose("Reuse?", REUSE, Choice::Reuse, true).unwrap(), Choice::Reuse);
  }
}
