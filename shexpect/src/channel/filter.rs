//! Transformations applied to accumulated output before matching.

use std::borrow::Cow;

use memchr::memrchr2;
use vte::{Parser, Perform};

/// A transformation of the accumulated output.
///
/// The expect engine applies the filter to the whole output after every
/// read and tests the result against its patterns.
pub trait OutputFilter: Send + Sync {
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str>;

    /// Apply `self`, then `next` to the result.
    fn then<G>(self, next: G) -> Chain<Self, G>
    where
        Self: Sized,
        G: OutputFilter,
    {
        Chain {
            first: self,
            second: next,
        }
    }
}

impl<F> OutputFilter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Owned(self(text))
    }
}

/// Leaves the output as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl OutputFilter for Identity {
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }
}

/// Keeps only the last line that contains something other than whitespace.
///
/// Prompts must be matched at the true end of the output, not anywhere
/// inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastNonBlankLine;

impl OutputFilter for LastNonBlankLine {
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(last_non_blank_line(text))
    }
}

/// Drops terminal escape sequences, keeping printable text and `\n`, `\r`
/// and `\t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripAnsi;

impl OutputFilter for StripAnsi {
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let plain = text
            .bytes()
            .all(|b| (b >= 0x20 && b != 0x7f) || matches!(b, b'\n' | b'\r' | b'\t'));
        if plain {
            return Cow::Borrowed(text);
        }
        let mut printer = Printer(String::with_capacity(text.len()));
        let mut parser: Parser = Parser::new();
        parser.advance(&mut printer, text.as_bytes());
        Cow::Owned(printer.0)
    }
}

struct Printer(String);

impl Perform for Printer {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.push(byte as char);
        }
    }
}

/// Two filters applied in sequence, built by [`OutputFilter::then`].
#[derive(Debug, Clone, Copy)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> OutputFilter for Chain<A, B>
where
    A: OutputFilter,
    B: OutputFilter,
{
    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.first.apply(text) {
            Cow::Borrowed(text) => self.second.apply(text),
            Cow::Owned(text) => Cow::Owned(self.second.apply(&text).into_owned()),
        }
    }
}

/// The last line of `text` that is not blank, or `""` if there is none.
///
/// `\n`, `\r` and `\r\n` all end a line.
pub fn last_non_blank_line(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = bytes.len();
    loop {
        let start = memrchr2(b'\n', b'\r', &bytes[..end]).map_or(0, |i| i + 1);
        let line = &text[start..end];
        if !line.trim().is_empty() {
            return line;
        }
        if start == 0 {
            return "";
        }
        end = start - 1;
    }
}

/// Lines of `text`, each without its terminator.
///
/// Like [`str::lines`], but a lone `\r` also ends a line.
pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let line = match rest.find(['\n', '\r']) {
            Some(i) => {
                let line = &rest[..i];
                let terminator = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[i + terminator..];
                line
            }
            None => std::mem::take(&mut rest),
        };
        Some(line)
    })
}
