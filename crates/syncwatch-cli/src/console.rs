//! Interactive console commands read from stdin

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    Toggle,
    /// Relative seek in seconds
    Seek(f64),
    /// Absolute seek in seconds
    Goto(f64),
    /// Fraction of the duration
    Scrub(f64),
    Status,
    Leave,
    Quit,
    Help,
}

pub const HELP: &str = "\
Commands:
  play | pause | toggle    control playback
  seek <+/-secs>           jump relative to the current position
  goto <secs>              jump to a position
  scrub <0.0-1.0>          jump to a fraction of the duration
  status                   show party and playback state
  leave                    leave the party
  quit                     leave and exit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        bail!("too many arguments for '{}'", word);
    }

    let command = match word.to_ascii_lowercase().as_str() {
        "play" => ConsoleCommand::Play,
        "pause" => ConsoleCommand::Pause,
        "toggle" | "t" => ConsoleCommand::Toggle,
        "seek" | "s" => ConsoleCommand::Seek(number(word, arg)?),
        "goto" | "g" => ConsoleCommand::Goto(number(word, arg)?),
        "scrub" => ConsoleCommand::Scrub(number(word, arg)?),
        "status" | "st" => ConsoleCommand::Status,
        "leave" => ConsoleCommand::Leave,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        "help" | "?" => ConsoleCommand::Help,
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(Some(command))
}

fn number(word: &str, arg: Option<&str>) -> Result<f64> {
    let arg = arg.ok_or_else(|| anyhow!("'{}' needs a number", word))?;
    let value: f64 = arg
        .trim_start_matches('+')
        .parse()
        .map_err(|_| anyhow!("'{}' is not a number", arg))?;
    if !value.is_finite() {
        bail!("'{}' is not a finite number", arg);
    }
    Ok(value)
}

/// Render seconds as `h:mm:ss` or `m:ss`
pub fn format_time(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_controls() {
        assert_eq!(parse("play").unwrap(), Some(ConsoleCommand::Play));
        assert_eq!(parse("  PAUSE ").unwrap(), Some(ConsoleCommand::Pause));
        assert_eq!(parse("t").unwrap(), Some(ConsoleCommand::Toggle));
        assert_eq!(parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse("seek +10").unwrap(), Some(ConsoleCommand::Seek(10.0)));
        assert_eq!(parse("seek -5.5").unwrap(), Some(ConsoleCommand::Seek(-5.5)));
        assert_eq!(parse("goto 90").unwrap(), Some(ConsoleCommand::Goto(90.0)));
        assert_eq!(parse("scrub 0.5").unwrap(), Some(ConsoleCommand::Scrub(0.5)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("seek").is_err());
        assert!(parse("seek ten").is_err());
        assert!(parse("seek NaN").is_err());
        assert!(parse("play now").is_err());
        assert!(parse("rewind").is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(125.7), "2:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(-3.0), "0:00");
    }
}
