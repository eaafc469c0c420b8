//! String helpers for wire parameter values

use std::fmt::{self, Display, Formatter, Write};

/// Encodes a string as RFC 3461 xtext when displayed.
///
/// Control characters, space, `+` and `=` become `+HH`; everything else
/// passes through unchanged.
#[derive(Debug)]
pub(crate) struct XText<'a>(pub &'a str);

impl Display for XText<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if c < '!' || c == '+' || c == '=' {
                write!(f, "+{:02X}", c as u8)?;
            } else {
                f.write_char(c)?;
            }
        }
        Ok(())
    }
}
