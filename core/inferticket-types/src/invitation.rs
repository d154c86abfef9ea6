//! Invitation code validation.
//!
//! A code is exactly 24 characters. The trailing four characters are a
//! 16-bit hexadecimal ticket count, so `...0005` mints five tickets.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Required length of an invitation code.
pub const INVITATION_CODE_LEN: usize = 24;

const COUNT_SUFFIX_LEN: usize = 4;

/// A validated invitation code and the ticket count it grants.
#[derive(Clone, PartialEq, Eq)]
pub struct InvitationCode {
    raw: String,
    ticket_count: u16,
}

impl InvitationCode {
    /// Validates a code and derives its ticket count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInvitationCode` for a wrong length, a non-hex suffix,
    /// or a suffix that parses to zero.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.chars().count() != INVITATION_CODE_LEN {
            return Err(Error::InvalidInvitationCode(format!(
                "expected {INVITATION_CODE_LEN} characters, got {}",
                code.chars().count()
            )));
        }
        if !code.is_ascii() {
            return Err(Error::InvalidInvitationCode(
                "code must be ASCII".to_string(),
            ));
        }

        let suffix = &code[INVITATION_CODE_LEN - COUNT_SUFFIX_LEN..];
        if !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInvitationCode(
                "ticket count suffix is not hexadecimal".to_string(),
            ));
        }
        let ticket_count = u16::from_str_radix(suffix, 16).map_err(|e| {
            Error::InvalidInvitationCode(format!("invalid ticket count suffix: {e}"))
        })?;
        if ticket_count == 0 {
            return Err(Error::InvalidInvitationCode(
                "code grants zero tickets".to_string(),
            ));
        }

        Ok(Self {
            raw: code.to_string(),
            ticket_count,
        })
    }

    /// Returns the code as submitted to the issuer.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the number of tickets this code mints.
    #[must_use]
    pub fn ticket_count(&self) -> u16 {
        self.ticket_count
    }
}

impl FromStr for InvitationCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Only the count suffix is safe to show.
impl fmt::Debug for InvitationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvitationCode")
            .field("raw", &format_args!("****{}", &self.raw[INVITATION_CODE_LEN - COUNT_SUFFIX_LEN..]))
            .field("ticket_count", &self.ticket_count)
            .finish()
    }
}
