use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// The currency every rate is expressed against.
pub const BASE_CURRENCY: &str = "USD";

/// Static exchange rates to the base currency.
///
/// Parsed from lines of the form `CUR rate`. Blank lines and lines starting
/// with `#` are skipped. The base currency is always present at `1.0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
}

impl RateTable {
    /// Loads a rate table from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let table: Self = contents.parse()?;
        debug!("Loaded {} exchange rate(s) from {}", table.rates.len(), path.display());
        Ok(table)
    }

    /// Rate of `currency` to the base currency.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }

    /// Whether `currency` has a rate.
    pub fn contains(&self, currency: &str) -> bool {
        self.rates.contains_key(currency)
    }

    /// Known currencies, sorted.
    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    /// Converts `amount` of `from` into `to`.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        let from_rate = self
            .rate(from)
            .ok_or_else(|| Error::UnknownCurrency(from.to_string()))?;
        let to_rate = self
            .rate(to)
            .ok_or_else(|| Error::UnknownCurrency(to.to_string()))?;

        Ok(amount * from_rate / to_rate)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            rates: BTreeMap::from([(BASE_CURRENCY.to_string(), 1.0)]),
        }
    }
}

impl FromStr for RateTable {
    type Err = Error;

    fn from_str(contents: &str) -> Result<Self> {
        let mut table = Self::default();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let invalid = |reason: &str| Error::InvalidRate {
                line: index + 1,
                reason: reason.to_string(),
            };

            let mut fields = line.split_whitespace();
            let (Some(currency), Some(rate)) = (fields.next(), fields.next()) else {
                return Err(invalid("expected '<currency> <rate>'"));
            };
            let rate: f64 = rate.parse().map_err(|_| invalid("rate is not a number"))?;
            if !rate.is_finite() || rate <= 0.0 {
                return Err(invalid("rate must be positive"));
            }

            table.rates.insert(currency.to_string(), rate);
        }

        table.rates.insert(BASE_CURRENCY.to_string(), 1.0);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let table: RateTable = "# rates to USD\n\nEUR 1.10\n  NOK 0.095  \n".parse().unwrap();

        assert_eq!(table.rate("EUR"), Some(1.10));
        assert_eq!(table.rate("NOK"), Some(0.095));
        assert_eq!(table.rate("USD"), Some(1.0));
        assert_eq!(table.currencies().collect::<Vec<_>>(), vec!["EUR", "NOK", "USD"]);
    }

    #[test]
    fn test_base_currency_is_always_one() {
        let table: RateTable = "USD 3.0\n".parse().unwrap();
        assert_eq!(table.rate(BASE_CURRENCY), Some(1.0));
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert_matches!(
            "EUR\n".parse::<RateTable>(),
            Err(Error::InvalidRate { line: 1, .. })
        );
        assert_matches!(
            "EUR 1.1\nGBP abc\n".parse::<RateTable>(),
            Err(Error::InvalidRate { line: 2, .. })
        );
        assert_matches!(
            "GBP -1\n".parse::<RateTable>(),
            Err(Error::InvalidRate { line: 1, .. })
        );
    }

    #[test]
    fn test_convert_through_base_currency() {
        let table: RateTable = "EUR 2.0\nGBP 4.0\n".parse().unwrap();

        assert!((table.convert(10.0, "EUR", "USD").unwrap() - 20.0).abs() < f64::EPSILON);
        assert!((table.convert(10.0, "EUR", "GBP").unwrap() - 5.0).abs() < f64::EPSILON);
        assert_matches!(table.convert(1.0, "JPY", "USD"), Err(Error::UnknownCurrency(c)) if c == "JPY");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "EUR 1.25").unwrap();

        let table = RateTable::load(file.path()).unwrap();
        assert_eq!(table.rate("EUR"), Some(1.25));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        assert_matches!(RateTable::load(&missing), Err(Error::Io { path, .. }) if path == missing);
    }
}
