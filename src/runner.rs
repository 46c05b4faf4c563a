//! Seam between the core and the host's command-line utilities.
//!
//! Everything the program learns about or does to the machine goes through
//! [`CommandRunner`], so tests can substitute captured output for real
//! invocations.

use crate::errors::ProbeError;
use std::process::Command;

/// Collected result of one utility invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs one external command to completion and collects its output.
///
/// Implementations must not interpret the output; parsing belongs to the
/// probe layer, decisions to the planner.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError>;
}

/// Real runner over `std::process::Command`.
pub struct SystemRunner {
    debug: bool,
}

impl SystemRunner {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ProbeError::Run {
                utility: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        };

        if self.debug {
            eprintln!("CMD: {}", shell_join(program, args));
            eprintln!(
                "STATUS: {}\nSTDOUT:\n{}STDERR:\n{}",
                result.status, result.stdout, result.stderr
            );
        }

        Ok(result)
    }
}

/// Escape a string for display in a shell command line.
///
/// Quotes only when necessary, using single quotes.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+' | '%'))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render program and arguments as one shell-level line.
pub fn shell_join(program: &str, args: &[&str]) -> String {
    let mut line = shell_quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_plain_and_special() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("/dev/sda1"), "/dev/sda1");
        assert_eq!(shell_quote("+100%FREE"), "+100%FREE");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn join_renders_argv() {
        assert_eq!(
            shell_join("parted", &["-s", "/dev/sda", "unit", "b", "print"]),
            "parted -s /dev/sda unit b print"
        );
    }
}
