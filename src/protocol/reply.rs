//! Reply-line parsing for the backend's text protocol.
//!
//! Every command the server answers begins with a single reply line: a
//! 3-digit code, optionally followed by a space and human-readable text.
//! The hundreds digit carries the meaning:
//!
//! | Class | Meaning                                              |
//! |-------|------------------------------------------------------|
//! | 1xx   | Listing follows — read lines until [`LISTING_END`]   |
//! | 2xx   | Ok                                                   |
//! | 3xx   | More data expected (e.g. password after username)    |
//! | 4xx   | Binary data follows (not consumed by this client)    |
//! | 5xx   | Error                                                |

/// Terminator line for 1xx listings.
pub const LISTING_END: &str = "000";

/// A parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// 3-digit reply code.
    pub code: u16,
    /// Text after the code, empty if the server sent none.
    pub text: String,
}

/// Reply code class (hundreds digit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Listing,
    Ok,
    MoreData,
    Binary,
    Error,
}

impl Reply {
    /// Parse a reply line (without the trailing newline). Returns `None` if
    /// the line does not start with a 3-digit code in a known class.
    pub fn parse(line: &str) -> Option<Self> {
        if line.len() < 3 || !line.is_char_boundary(3) {
            return None;
        }
        let code: u16 = line[..3].parse().ok()?;
        if !(100..600).contains(&code) {
            return None;
        }
        let text = line[3..].trim_start().to_string();
        Some(Reply { code, text })
    }

    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Listing,
            2 => ReplyClass::Ok,
            3 => ReplyClass::MoreData,
            4 => ReplyClass::Binary,
            _ => ReplyClass::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.class() == ReplyClass::Ok
    }

    pub fn is_more_data(&self) -> bool {
        self.class() == ReplyClass::MoreData
    }

    pub fn is_listing(&self) -> bool {
        self.class() == ReplyClass::Listing
    }

    pub fn is_error(&self) -> bool {
        self.class() == ReplyClass::Error
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.text)
        }
    }
}
