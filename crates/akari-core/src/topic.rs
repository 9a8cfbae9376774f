// ── Discovery topic matching ──
//
// Patterns carry exactly one single-level `+` wildcard; the segment it
// matches is the device id. Multi-level `#` is not supported.

use std::fmt;

use crate::error::CoreError;

/// The topic did not match the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("topic does not match the discovery pattern")]
pub struct NoMatch;

/// A validated topic pattern such as `home/+/info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    prefix: Vec<String>,
    suffix: Vec<String>,
}

impl TopicPattern {
    /// Validate a pattern. It must contain exactly one segment that is a
    /// bare `+` and no `#` anywhere.
    pub fn parse(pattern: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern.contains('#') {
            return Err(invalid("multi-level wildcard '#' is not supported"));
        }

        let segments: Vec<&str> = pattern.split('/').collect();
        if segments.iter().any(|s| s.contains('+') && *s != "+") {
            return Err(invalid("'+' must occupy a whole segment"));
        }

        let mut wildcards = segments.iter().enumerate().filter(|(_, s)| **s == "+");
        let Some((at, _)) = wildcards.next() else {
            return Err(invalid("pattern needs one '+' segment for the device id"));
        };
        if wildcards.next().is_some() {
            return Err(invalid("pattern has more than one '+' segment"));
        }

        let owned = |s: &[&str]| s.iter().map(|s| (*s).to_owned()).collect();
        Ok(Self {
            raw: pattern.to_owned(),
            prefix: owned(&segments[..at]),
            suffix: owned(&segments[at + 1..]),
        })
    }

    /// The pattern as passed to the subscription transport.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Extract the wildcard segment from a concrete topic.
    ///
    /// Fails on a different segment count, any literal mismatch, or an
    /// empty captured segment.
    pub fn capture<'t>(&self, topic: &'t str) -> Result<&'t str, NoMatch> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() != self.prefix.len() + 1 + self.suffix.len() {
            return Err(NoMatch);
        }

        let (head, rest) = segments.split_at(self.prefix.len());
        let Some((captured, tail)) = rest.split_first() else {
            return Err(NoMatch);
        };

        let literals_match =
            head.iter().eq(self.prefix.iter()) && tail.iter().eq(self.suffix.iter());
        if !literals_match || captured.is_empty() {
            return Err(NoMatch);
        }
        Ok(*captured)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn home() -> TopicPattern {
        TopicPattern::parse("home/+/info").unwrap()
    }

    #[test]
    fn captures_the_wildcard_segment() {
        let pattern = home();
        assert_eq!(pattern.capture("home/rpi-zona-giorno/info"), Ok("rpi-zona-giorno"));
        assert_eq!(pattern.capture("home/a/info"), Ok("a"));
    }

    #[test]
    fn wrong_depth_is_no_match() {
        let pattern = home();
        assert_eq!(pattern.capture("home/rpi/info/extra"), Err(NoMatch));
        assert_eq!(pattern.capture("home/info"), Err(NoMatch));
        assert_eq!(pattern.capture("home"), Err(NoMatch));
        assert_eq!(pattern.capture(""), Err(NoMatch));
    }

    #[test]
    fn literal_mismatch_is_no_match() {
        let pattern = home();
        assert_eq!(pattern.capture("office/rpi/info"), Err(NoMatch));
        assert_eq!(pattern.capture("home/rpi/status"), Err(NoMatch));
        assert_eq!(pattern.capture("Home/rpi/info"), Err(NoMatch));
    }

    #[test]
    fn empty_capture_is_no_match() {
        assert_eq!(home().capture("home//info"), Err(NoMatch));
    }

    #[test]
    fn wildcard_at_either_end() {
        let leading = TopicPattern::parse("+/info").unwrap();
        assert_eq!(leading.capture("rpi/info"), Ok("rpi"));

        let trailing = TopicPattern::parse("akari/devices/+").unwrap();
        assert_eq!(trailing.capture("akari/devices/rpi"), Ok("rpi"));
        assert_eq!(trailing.capture("akari/devices/rpi/x"), Err(NoMatch));
    }

    #[test]
    fn rejects_invalid_patterns() {
        for bad in ["", "home/info", "home/+/+", "home/#", "home/dev+/info", "#"] {
            assert!(
                matches!(TopicPattern::parse(bad), Err(CoreError::InvalidPattern { .. })),
                "pattern {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_the_raw_pattern() {
        assert_eq!(home().to_string(), "home/+/info");
        assert_eq!(home().as_str(), "home/+/info");
    }
}
