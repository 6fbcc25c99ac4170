//! Clean-up of raw command output.

use memchr::memrchr2;

use crate::channel::filter::split_lines;

/// Drop the first line of `output` if it is exactly `cmd` (the terminal
/// echoing the command back).
pub fn strip_command_echo<'a>(output: &'a str, cmd: &str) -> &'a str {
    let end = output.find(['\n', '\r']).unwrap_or(output.len());
    if output.is_empty() || output[..end] != *cmd {
        return output;
    }
    let rest = &output[end..];
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .or_else(|| rest.strip_prefix('\r'))
        .unwrap_or(rest)
}

/// Drop the last non-blank line and everything blank after it.
///
/// Line terminators of the remaining lines are kept.
pub fn strip_last_non_blank_line(output: &str) -> &str {
    let trimmed = output.trim_end();
    match memrchr2(b'\n', b'\r', trimmed.as_bytes()) {
        Some(i) => &trimmed[..=i],
        None => "",
    }
}

/// Convert `\r\n` to `\n` and drop trailing line terminators.
pub fn normalize_output(output: &str) -> String {
    output
        .replace("\r\n", "\n")
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// The first line consisting of digits only, parsed.
pub fn first_status_line(output: &str) -> Option<i32> {
    split_lines(output)
        .map(str::trim)
        .find(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|line| line.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_command_echo() {
        assert_eq!(strip_command_echo("ls\r\na b\r\n$ ", "ls"), "a b\r\n$ ");
        assert_eq!(strip_command_echo("ls\nx", "ls"), "x");
        assert_eq!(strip_command_echo("ls", "ls"), "");
        // Only an exact first line counts
        assert_eq!(strip_command_echo("ls -l\nx", "ls"), "ls -l\nx");
        assert_eq!(strip_command_echo("x\nls\n", "ls"), "x\nls\n");
        assert_eq!(strip_command_echo("", ""), "");
    }

    #[test]
    fn test_strip_last_non_blank_line() {
        assert_eq!(strip_last_non_blank_line("a\r\nb\r\n$ "), "a\r\nb\r\n");
        assert_eq!(strip_last_non_blank_line("a\n$ \n\n  "), "a\n");
        assert_eq!(strip_last_non_blank_line("$ "), "");
        assert_eq!(strip_last_non_blank_line(""), "");
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello\r\n"), "hello");
        assert_eq!(normalize_output("a\r\nb\r\n\r\n"), "a\nb");
        assert_eq!(normalize_output("  indented\n"), "  indented");
        assert_eq!(normalize_output(""), "");
    }

    #[test]
    fn test_first_status_line() {
        assert_eq!(first_status_line("0\r\n"), Some(0));
        assert_eq!(first_status_line("noise\n 42 \n7\n"), Some(42));
        assert_eq!(first_status_line("abc\n"), None);
        assert_eq!(first_status_line(""), None);
    }
}
