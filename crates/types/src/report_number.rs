use crate::TypesError;
use std::fmt;
use std::str::FromStr;

/// Prefix of every generated report number.
pub const REPORT_NUMBER_PREFIX: &str = "LAUDO-";

/// A report number of the form `LAUDO-001001`.
///
/// The sequence value is zero-padded to six digits when displayed. Values wider than six digits
/// are printed in full rather than truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportNumber(u64);

impl ReportNumber {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }

    /// Finds the first `LAUDO-<digits>` occurrence anywhere in `text`.
    ///
    /// Restored drafts carry the number as free text typed into a form input, so surrounding
    /// characters are ignored. Returns `None` when no digits follow the prefix or they overflow.
    pub fn extract(text: &str) -> Option<Self> {
        let mut rest = text;
        while let Some(pos) = rest.find(REPORT_NUMBER_PREFIX) {
            let after = &rest[pos + REPORT_NUMBER_PREFIX.len()..];
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                return digits.parse().ok().map(Self);
            }
            rest = after;
        }
        None
    }
}

impl fmt::Display for ReportNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:06}", REPORT_NUMBER_PREFIX, self.0)
    }
}

impl FromStr for ReportNumber {
    type Err = TypesError;

    /// Strict parse: the whole input must be `LAUDO-<digits>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix(REPORT_NUMBER_PREFIX)
            .ok_or_else(|| TypesError::InvalidReportNumber(s.to_string()))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(TypesError::InvalidReportNumber(s.to_string()));
        }
        digits
            .parse()
            .map(Self)
            .map_err(|_| TypesError::InvalidReportNumber(s.to_string()))
    }
}
