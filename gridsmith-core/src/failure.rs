//! Error-message families shared by the ledger, retry policy and the
//! targeted corrector.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFamily {
    Dimension,
    Syntax,
    UnsupportedApi,
    SheetName,
    Reference,
    Timeout,
    Permission,
    RateLimit,
    Unavailable,
    Other,
}

impl ErrorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorFamily::Dimension => "dimension",
            ErrorFamily::Syntax => "syntax",
            ErrorFamily::UnsupportedApi => "unsupported_api",
            ErrorFamily::SheetName => "sheet_name",
            ErrorFamily::Reference => "reference",
            ErrorFamily::Timeout => "timeout",
            ErrorFamily::Permission => "permission",
            ErrorFamily::RateLimit => "rate_limit",
            ErrorFamily::Unavailable => "unavailable",
            ErrorFamily::Other => "other",
        }
    }

    /// Families whose failures no amount of rewriting will fix.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            ErrorFamily::Permission | ErrorFamily::RateLimit | ErrorFamily::Unavailable
        )
    }
}

impl std::fmt::Display for ErrorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins.
static FAMILY_PATTERNS: LazyLock<Vec<(ErrorFamily, Regex)>> = LazyLock::new(|| {
    [
        (
            ErrorFamily::RateLimit,
            r"(?i)rate[ _-]?limit|too many requests|throttl|quota exceeded",
        ),
        (
            ErrorFamily::Permission,
            r"(?i)permission denied|access denied|read-?only|protected|not authori[sz]ed",
        ),
        (
            ErrorFamily::Unavailable,
            r"(?i)api (is )?(not )?unavailable|runtime api unavailable|requirement set|service unavailable",
        ),
        (ErrorFamily::Timeout, r"(?i)\btime ?out\b|\btimed out\b|deadline"),
        (
            ErrorFamily::Dimension,
            r"(?i)number of rows or columns|dimensions? of the range|incorrect format|2d array|two-dimensional|dimension",
        ),
        (
            ErrorFamily::SheetName,
            r"(?i)itemnotfound|itemalreadyexists|worksheet|sheet name|invalid name",
        ),
        (
            ErrorFamily::UnsupportedApi,
            r"(?i)is not a function|not supported|unsupported|forbidden api|excelscript|spreadsheetapp",
        ),
        (
            ErrorFamily::Reference,
            r"(?i)referenceerror|is not defined|cannot read propert|undefined is not|null is not",
        ),
        (
            ErrorFamily::Syntax,
            r"(?i)syntaxerror|unexpected token|unexpected end|unterminated|missing \)|unbalanced",
        ),
    ]
    .into_iter()
    .map(|(family, pattern)| (family, Regex::new(pattern).expect("valid")))
    .collect()
});

/// Buckets a failure message by case-insensitive signature matching.
pub fn classify_error(message: &str) -> ErrorFamily {
    FAMILY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(family, _)| *family)
        .unwrap_or(ErrorFamily::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_common_messages() {
        let cases = [
            (
                "The number of rows or columns in the input array doesn't match the size or dimensions of the range.",
                ErrorFamily::Dimension,
            ),
            ("Request was rate limited, retry later", ErrorFamily::RateLimit),
            ("Permission denied: workbook is protected", ErrorFamily::Permission),
            ("Runtime API unavailable on this host", ErrorFamily::Unavailable),
            ("ReferenceError: sheet2 is not defined", ErrorFamily::Reference),
            ("SyntaxError: Unexpected token '}'", ErrorFamily::Syntax),
            ("ItemNotFound: worksheet 'Data' does not exist", ErrorFamily::SheetName),
            ("range.autoFit is not a function", ErrorFamily::UnsupportedApi),
            ("execution timed out after 30000ms", ErrorFamily::Timeout),
            ("something odd", ErrorFamily::Other),
        ];
        for (msg, family) in cases {
            assert_eq!(classify_error(msg), family, "{msg}");
        }
    }

    #[test]
    fn environmental_families() {
        assert!(ErrorFamily::RateLimit.is_environmental());
        assert!(!ErrorFamily::Dimension.is_environmental());
    }
}
