//! Academic session identifiers of the form `<startYear>_<endYearSuffix>`
//! (e.g. `2024_25`) and their mapping to store files.

use thiserror::Error;

pub const STORE_FILE_PREFIX: &str = "school_";
pub const STORE_FILE_EXTENSION: &str = ".db";

/// Longest year token we accept; keeps suffix arithmetic inside `u32`.
const MAX_YEAR_DIGITS: usize = 9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("session id must look like <start>_<end>, got '{0}'")]
    Malformed(String),

    #[error("session id '{0}' cannot be shifted by a year")]
    OutOfRange(String),
}

/// A parsed academic year such as `2024_25`.
///
/// The end token keeps its original width, so `2024_25` steps to `2023_24`
/// and `2099_2100` to `2098_2099`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicYear {
    start: u32,
    end: u32,
    end_width: usize,
}

impl AcademicYear {
    pub fn parse(session_id: &str) -> Result<Self, SessionIdError> {
        let malformed = || SessionIdError::Malformed(session_id.to_string());

        let mut tokens = session_id.split('_');
        let (Some(start), Some(end), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(malformed());
        };

        let is_year_token = |token: &str| {
            !token.is_empty()
                && token.len() <= MAX_YEAR_DIGITS
                && token.bytes().all(|b| b.is_ascii_digit())
        };
        if !is_year_token(start) || !is_year_token(end) {
            return Err(malformed());
        }

        Ok(Self {
            start: start.parse().map_err(|_| malformed())?,
            end: end.parse().map_err(|_| malformed())?,
            end_width: end.len(),
        })
    }

    pub fn start_year(&self) -> u32 {
        self.start
    }

    /// The session one year earlier; `None` when the start year is 0.
    pub fn previous(&self) -> Option<Self> {
        let modulus = self.suffix_modulus();
        Some(Self {
            start: self.start.checked_sub(1)?,
            end: (self.end + modulus - 1) % modulus,
            end_width: self.end_width,
        })
    }

    /// The session one year later.
    pub fn next(&self) -> Option<Self> {
        let modulus = self.suffix_modulus();
        Some(Self {
            start: self.start.checked_add(1)?,
            end: (self.end + 1) % modulus,
            end_width: self.end_width,
        })
    }

    fn suffix_modulus(&self) -> u32 {
        10u32.pow(self.end_width as u32)
    }
}

impl std::fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{:0width$}", self.start, self.end, width = self.end_width)
    }
}

/// Identifier of the session immediately before `session_id`, or `None`
/// when the id is not a well-formed academic year.
pub fn previous_session(session_id: &str) -> Option<String> {
    AcademicYear::parse(session_id)
        .ok()?
        .previous()
        .map(|year| year.to_string())
}

/// Identifier of the session immediately after `session_id`.
pub fn next_session(session_id: &str) -> Result<String, SessionIdError> {
    AcademicYear::parse(session_id)?
        .next()
        .map(|year| year.to_string())
        .ok_or_else(|| SessionIdError::OutOfRange(session_id.to_string()))
}

/// Filesystem-safe form of a session id: only alphanumerics, `_` and `-`
/// survive.
pub fn sanitize_session_id(session_id: &str) -> String {
    session_id
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '-')
        .collect()
}

/// Store file name for a session, e.g. `school_2024_25.db`.
pub fn store_file_name(session_id: &str) -> String {
    format!(
        "{}{}{}",
        STORE_FILE_PREFIX,
        sanitize_session_id(session_id),
        STORE_FILE_EXTENSION
    )
}

/// Inverse of [`store_file_name`] for directory listings.
pub fn session_from_file_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(STORE_FILE_PREFIX)?
        .strip_suffix(STORE_FILE_EXTENSION)
        .filter(|name| !name.is_empty())
}
