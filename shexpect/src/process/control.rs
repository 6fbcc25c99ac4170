//! Control character mapping (ctrl+<char> to the byte a terminal sends).

use crate::error::ProcessError;

/// Symbols with a control-key equivalent, besides the letters `a`..=`z`.
pub const CONTROL_SYMBOLS: [(char, u8); 12] = [
    ('@', 0x00),
    ('`', 0x00),
    ('[', 0x1b),
    ('{', 0x1b),
    ('\\', 0x1c),
    ('|', 0x1c),
    (']', 0x1d),
    ('}', 0x1d),
    ('^', 0x1e),
    ('~', 0x1e),
    ('_', 0x1f),
    ('?', 0x7f),
];

/// Translate `c` into the byte produced by pressing ctrl+`c`.
///
/// Letters are case-insensitive: `'a'` and `'A'` both give `0x01`.
pub fn control_byte(c: char) -> Result<u8, ProcessError> {
    let lower = c.to_ascii_lowercase();
    if lower.is_ascii_lowercase() {
        return Ok(lower as u8 - b'a' + 1);
    }

    CONTROL_SYMBOLS
        .iter()
        .find(|(symbol, _)| *symbol == c)
        .map(|(_, byte)| *byte)
        .ok_or(ProcessError::UnmappableControlChar(c))
}
