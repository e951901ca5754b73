use std::fmt;

use anyhow::{bail, Context, Result};

/// Field delimiter for both input and output lines.
pub const FIELD_SEP: char = '\t';

/// Expected number of tab-separated fields per input line:
/// date, user id, IP, OS, browser.
pub const INPUT_FIELDS: usize = 5;

/// One parsed or aggregated visit event.
///
/// Identified users (`user_id > 0`) are tracked purely by ID, anonymous
/// traffic (`user_id == 0`) purely by device/network fingerprint. The two
/// identity spaces never mix, so the constructor clears the fingerprint
/// fields for identified users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub user_id: u32,
    pub ip: String,
    pub os: String,
    pub browser: String,
    pub count: u32,
    key: String,
}

impl Visit {
    pub fn new(user_id: u32, ip: &str, os: &str, browser: &str) -> Self {
        let (ip, os, browser) = if user_id > 0 {
            (String::new(), String::new(), String::new())
        } else {
            (ip.to_string(), os.to_string(), browser.to_string())
        };
        // Tab-joined so the key is unambiguous: tab is the field delimiter
        // and can never appear inside a field.
        let key = format!("{}\t{}\t{}\t{}", user_id, ip, os, browser);
        Self {
            user_id,
            ip,
            os,
            browser,
            count: 1,
            key,
        }
    }

    /// Canonical dedup identity. Two visits with equal keys are the same
    /// visit class and get merged by the aggregator.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parse one input line: `date \t user_id \t ip \t os \t browser`.
    /// The date field is accepted but not interpreted.
    pub fn parse_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(FIELD_SEP).collect();
        if parts.len() != INPUT_FIELDS {
            bail!(
                "wrong number of fields ({}, expected {}) in line: {}",
                parts.len(),
                INPUT_FIELDS,
                line
            );
        }
        let user_id: u32 = parts[1]
            .parse()
            .with_context(|| format!("invalid user id '{}' in line: {}", parts[1], line))?;
        Ok(Self::new(user_id, parts[2], parts[3], parts[4]))
    }
}

/// Output line format: `count \t user_id \t ip \t os \t browser`.
impl fmt::Display for Visit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.count, self.user_id, self.ip, self.os, self.browser
        )
    }
}

/// Placeholder for the computation a real parser would spend per line.
/// Trial-division primality check over `2..cost`; a cost of 0 disables it.
pub fn busy_work(cost: u32) {
    for i in 2..cost {
        let mut is_prime = true;
        for j in 2..i {
            if i % j == 0 {
                is_prime = false;
            }
        }
        std::hint::black_box(is_prime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_identified_line() {
        let visit =
            Visit::parse_line("2018-06-05 06:00:00\t5\t192.168.0.1\tWindows\tChrome").unwrap();
        assert_eq!(visit.user_id, 5);
        assert_eq!(visit.ip, "");
        assert_eq!(visit.os, "");
        assert_eq!(visit.browser, "");
        assert_eq!(visit.count, 1);
        assert_eq!(visit.key(), "5\t\t\t");
    }

    #[test]
    fn test_parse_anonymous_line() {
        let visit =
            Visit::parse_line("2018-06-05 06:00:00\t0\t192.168.0.7\tMac OS X\tSafari").unwrap();
        assert_eq!(visit.user_id, 0);
        assert_eq!(visit.ip, "192.168.0.7");
        assert_eq!(visit.os, "Mac OS X");
        assert_eq!(visit.browser, "Safari");
        assert_eq!(visit.key(), "0\t192.168.0.7\tMac OS X\tSafari");
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        let err = Visit::parse_line("2018-06-05 06:00:00\t5\t192.168.0.1\tWindows").unwrap_err();
        assert!(err.to_string().contains("wrong number of fields"));

        let err = Visit::parse_line("a\t1\tb\tc\td\te").unwrap_err();
        assert!(err.to_string().contains("wrong number of fields"));
    }

    #[test]
    fn test_parse_rejects_bad_user_id() {
        assert!(Visit::parse_line("date\tabc\tip\tos\tbrowser").is_err());
        assert!(Visit::parse_line("date\t-1\tip\tos\tbrowser").is_err());
        assert!(Visit::parse_line("date\t4294967296\tip\tos\tbrowser").is_err());
    }

    #[test]
    fn test_same_user_different_fingerprints_share_key() {
        let a = Visit::new(5, "192.168.0.1", "Windows", "Chrome");
        let b = Visit::new(5, "192.168.0.2", "Mac OS X", "Safari");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_anonymous_fingerprints_keep_distinct_keys() {
        let a = Visit::new(0, "192.168.0.1", "Windows", "Chrome");
        let b = Visit::new(0, "192.168.0.2", "Windows", "Chrome");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_output_line_format() {
        let mut visit = Visit::new(5, "192.168.0.1", "Windows", "Chrome");
        visit.count = 2;
        assert_eq!(visit.to_string(), "2\t5\t\t\t");

        let visit = Visit::new(0, "192.168.0.1", "Windows", "Chrome");
        assert_eq!(visit.to_string(), "1\t0\t192.168.0.1\tWindows\tChrome");
    }

    #[test]
    fn test_busy_work_runs() {
        busy_work(0);
        busy_work(50);
    }

    proptest! {
        #[test]
        fn prop_anonymization_invariant(
            user_id in 0u32..2000,
            ip in "[0-9.]{1,15}",
            os in "[a-zA-Z ]{1,12}",
            browser in "[a-zA-Z]{1,10}",
        ) {
            let visit = Visit::new(user_id, &ip, &os, &browser);
            if user_id > 0 {
                prop_assert_eq!(visit.ip.as_str(), "");
                prop_assert_eq!(visit.os.as_str(), "");
                prop_assert_eq!(visit.browser.as_str(), "");
            } else {
                prop_assert_eq!(&visit.ip, &ip);
                prop_assert_eq!(&visit.os, &os);
                prop_assert_eq!(&visit.browser, &browser);
            }
            prop_assert_eq!(visit.count, 1);
        }

        #[test]
        fn prop_parse_roundtrips_fields(
            user_id in 1u32..100_000,
            date in "[0-9: -]{1,19}",
        ) {
            let line = format!("{}\t{}\tip\tos\tbrowser", date, user_id);
            let visit = Visit::parse_line(&line).unwrap();
            prop_assert_eq!(visit.user_id, user_id);
        }
    }
}
