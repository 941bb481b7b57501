use std::{fmt, str::FromStr};

use crate::error::Error;

/// How much history a new export should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateRange {
    OneDay,
    SevenDays,
    ThirtyDays,
    Full,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::OneDay,
        DateRange::SevenDays,
        DateRange::ThirtyDays,
        DateRange::Full,
    ];

    /// Position of this range in the wizard's preset dropdown.
    pub fn option_index(self) -> usize {
        match self {
            DateRange::OneDay => 0,
            DateRange::SevenDays => 1,
            DateRange::ThirtyDays => 2,
            DateRange::Full => 3,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            DateRange::OneDay => "1",
            DateRange::SevenDays => "7",
            DateRange::ThirtyDays => "30",
            DateRange::Full => "full",
        }
    }
}

impl FromStr for DateRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateRange::ALL
            .into_iter()
            .find(|r| r.as_token() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown date range `{}`; expected one of 1, 7, 30, full",
                    s
                ))
            })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_to_option_index() {
        let cases = [("1", 0), ("7", 1), ("30", 2), ("full", 3)];
        for (token, idx) in cases {
            let range: DateRange = token.parse().unwrap();
            assert_eq!(range.option_index(), idx);
            assert_eq!(range.to_string(), token);
        }
    }

    #[test]
    fn test_rejects_unknown_tokens() {
        for token in ["15", "", "FULL", " 7", "all"] {
            let err = token.parse::<DateRange>().unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{:?}", token);
        }
    }
}
