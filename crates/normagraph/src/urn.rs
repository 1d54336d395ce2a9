use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum UrnParseError {
    #[error("URN has no act number separator ';': {0}")]
    MissingNumber(String),
    #[error("URN has too few segments: {0}")]
    MissingSegments(String),
    #[error("Unparseable URN date field: {0}")]
    BadDate(String),
}

static RE_FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("invalid regex: full date")
});
static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})").expect("invalid regex: year"));

/// Date field of a NIR URN. Normattiva encodes either a full promulgation
/// date or a bare year; very old acts occasionally carry trailing characters
/// after the year, which are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UrnDate {
    Day(NaiveDate),
    Year(i32),
}

impl UrnDate {
    pub fn year(&self) -> i32 {
        match self {
            UrnDate::Day(date) => date.year(),
            UrnDate::Year(year) => *year,
        }
    }
}

impl FromStr for UrnDate {
    type Err = UrnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(caps) = RE_FULL_DATE.captures(s) {
            let year: i32 = caps[1].parse().unwrap_or_default();
            let month: u32 = caps[2].parse().unwrap_or_default();
            let day: u32 = caps[3].parse().unwrap_or_default();
            // An impossible calendar date degrades to its year, like the
            // bare-year-with-junk case below.
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Ok(UrnDate::Day(date));
            }
        }
        let caps = RE_YEAR
            .captures(s)
            .ok_or_else(|| UrnParseError::BadDate(s.to_string()))?;
        let year = caps[1]
            .parse()
            .map_err(|_| UrnParseError::BadDate(s.to_string()))?;
        Ok(UrnDate::Year(year))
    }
}

impl Display for UrnDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrnDate::Day(date) => write!(f, "{}", date.format("%d/%m/%Y")),
            UrnDate::Year(year) => write!(f, "{}", year),
        }
    }
}

/// A fully qualified NIR URN, e.g.
/// `urn:nir:stato:decreto.legislativo:2016-03-18;50`.
///
/// Partial URNs (`urn:nir:2016;249`) do not carry enough segments to
/// identify an act and fail to parse; they are only ever fed to the
/// normattiva resolver, which maps them to fully qualified ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Urn {
    raw: String,
    pub act_type: String,
    pub date: UrnDate,
    pub number: String,
}

impl Urn {
    /// A partial URN for the normattiva resolver, covering act `number` of
    /// `year` in its current ("vigente") consolidation.
    pub fn partial(year: i32, number: u32) -> String {
        format!("urn:nir:{};{}", year, number)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Abbreviation of the act type, one dotted initial per word
    /// ("Decreto Legislativo" becomes "D.L.").
    pub fn initials(&self) -> String {
        self.act_type
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .map(|c| format!("{}.", c))
            .collect()
    }

    /// Human readable act name, e.g. "D.L. 50 del 18/03/2016". Nodes in the
    /// stored graph are keyed on (act type, name).
    pub fn name(&self) -> String {
        format!("{} {} del {}", self.initials(), self.number, self.date)
    }
}

impl FromStr for Urn {
    type Err = UrnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (inner, number) = s
            .split_once(';')
            .ok_or_else(|| UrnParseError::MissingNumber(s.to_string()))?;

        let segments: Vec<&str> = inner.split(':').collect();
        if segments.len() < 5 {
            return Err(UrnParseError::MissingSegments(s.to_string()));
        }

        let act_type = segments[3]
            .split('.')
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ");
        let date = segments[4].parse()?;

        Ok(Urn {
            raw: s.to_string(),
            act_type,
            date,
            number: number.to_string(),
        })
    }
}

impl Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_urn() {
        let urn: Urn = "urn:nir:stato:decreto.legislativo:2016-03-18;50"
            .parse()
            .expect("Failed to parse urn");

        assert_eq!(urn.act_type, "Decreto Legislativo");
        assert_eq!(urn.number, "50");
        assert_eq!(
            urn.date,
            UrnDate::Day(NaiveDate::from_ymd_opt(2016, 3, 18).unwrap())
        );
        assert_eq!(urn.year(), 2016);
        assert_eq!(urn.initials(), "D.L.");
        assert_eq!(urn.name(), "D.L. 50 del 18/03/2016");
    }

    #[test]
    fn test_parse_year_only_date() {
        let urn: Urn = "urn:nir:stato:legge:1990;241"
            .parse()
            .expect("Failed to parse urn");

        assert_eq!(urn.act_type, "Legge");
        assert_eq!(urn.date, UrnDate::Year(1990));
        assert_eq!(urn.name(), "L. 241 del 1990");
    }

    #[test]
    fn test_parse_year_with_trailing_junk() {
        // Some pre-republican acts carry extra characters after the year.
        let urn: Urn = "urn:nir:stato:regio.decreto:1865-06-25bis;2359"
            .parse()
            .expect("Failed to parse urn");

        assert_eq!(urn.act_type, "Regio Decreto");
        assert_eq!(urn.date, UrnDate::Year(1865));
        assert_eq!(urn.name(), "R.D. 2359 del 1865");
    }

    #[test]
    fn test_impossible_date_degrades_to_year() {
        let urn: Urn = "urn:nir:stato:legge:2016-13-40;7"
            .parse()
            .expect("Failed to parse urn");

        assert_eq!(urn.date, UrnDate::Year(2016));
    }

    #[test]
    fn test_partial_urn_is_rejected() {
        let err = "urn:nir:2016;249".parse::<Urn>().unwrap_err();
        assert!(matches!(err, UrnParseError::MissingSegments(_)));
    }

    #[test]
    fn test_urn_without_number_is_rejected() {
        let err = "urn:nir:stato:costituzione:1947-12-27"
            .parse::<Urn>()
            .unwrap_err();
        assert!(matches!(err, UrnParseError::MissingNumber(_)));
    }

    #[test]
    fn test_unparseable_date_is_rejected() {
        let err = "urn:nir:stato:legge:senzadata;1".parse::<Urn>().unwrap_err();
        assert!(matches!(err, UrnParseError::BadDate(_)));
    }

    #[test]
    fn test_partial_urn_formatting() {
        assert_eq!(Urn::partial(2016, 249), "urn:nir:2016;249");
    }

    #[test]
    fn test_multi_word_type_initials() {
        let urn: Urn = "urn:nir:presidente.repubblica:decreto:2000-12-28;445"
            .parse()
            .expect("Failed to parse urn");

        assert_eq!(urn.act_type, "Decreto");
        assert_eq!(urn.initials(), "D.");
        assert_eq!(urn.name(), "D. 445 del 28/12/2000");
    }
}
