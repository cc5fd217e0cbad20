//! Open mode parsing.
//!
//! Mode strings follow the familiar `fopen` vocabulary (`"w"`, `"ab"`,
//! `"r+"`, `"x"`, ...). They are parsed once into [`OpenMode`]; nothing else
//! in the crate inspects the raw string.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// `r`: open an existing destination.
    pub read: bool,
    /// `w`: replace the destination.
    pub write: bool,
    /// `a`: extend the destination's existing content.
    pub append: bool,
    /// `x`: create the destination, failing if it exists.
    pub exclusive: bool,
    /// `+`: the stream may seek and overwrite.
    pub update: bool,
    /// `b`: binary payload; text otherwise.
    pub binary: bool,
}

impl OpenMode {
    /// Plain text write mode, `"w"`.
    pub const WRITE: Self = Self {
        read: false,
        write: true,
        append: false,
        exclusive: false,
        update: false,
        binary: false,
    };

    /// Parses a mode string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMode`] if the string contains an unknown
    /// character, repeats a flag, names more than one of `r`/`w`/`a`/`x`,
    /// names none of them, or mixes `b` and `t`.
    pub fn parse(mode: &str) -> Result<Self> {
        let mut parsed = Self {
            write: false,
            ..Self::WRITE
        };
        let mut text = false;
        let mut seen = String::with_capacity(mode.len());

        for c in mode.chars() {
            if seen.contains(c) {
                return Err(Error::invalid_mode(mode, format!("repeated flag '{c}'")));
            }
            seen.push(c);
            match c {
                'r' => parsed.read = true,
                'w' => parsed.write = true,
                'a' => parsed.append = true,
                'x' => parsed.exclusive = true,
                '+' => parsed.update = true,
                'b' => parsed.binary = true,
                't' => text = true,
                other => {
                    return Err(Error::invalid_mode(
                        mode,
                        format!("unknown flag '{other}'"),
                    ))
                }
            }
        }

        let primary = [parsed.read, parsed.write, parsed.append, parsed.exclusive]
            .iter()
            .filter(|&&set| set)
            .count();
        if primary != 1 {
            return Err(Error::invalid_mode(
                mode,
                "must have exactly one of read/write/append/create",
            ));
        }
        if parsed.binary && text {
            return Err(Error::invalid_mode(
                mode,
                "can't have text and binary mode at once",
            ));
        }
        Ok(parsed)
    }

    /// Returns true if a stream opened with this mode can be written.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write || self.append || self.exclusive || self.update
    }

    /// Returns true if the destination's current content must be copied into
    /// the staging buffer before the first write.
    ///
    /// This holds for append modes and for `r+`; `w+` truncates.
    #[must_use]
    pub const fn preserves_existing(&self) -> bool {
        self.append || (self.read && self.update)
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::WRITE
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let primary = if self.read {
            'r'
        } else if self.append {
            'a'
        } else if self.exclusive {
            'x'
        } else {
            'w'
        };
        write!(f, "{primary}")?;
        if self.binary {
            write!(f, "b")?;
        }
        if self.update {
            write!(f, "+")?;
        }
        Ok(())
    }
}
