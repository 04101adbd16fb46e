//! Closest-capture selection.

use chrono::{NaiveDateTime, Utc};

use memento_core::timestamp::parse_target;
use memento_core::{Captures, Error, StorageLocator, Timestamp};

/// A selected capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub timestamp: Timestamp,
    pub locator: StorageLocator,
}

/// Locator of the capture closest to `target`.
///
/// `target` is a 14-digit or ISO-8601 (`...Z`) timestamp; None means now (UTC).
pub fn closest(captures: &Captures, target: Option<&str>) -> Result<Option<StorageLocator>, Error> {
    Ok(closest_capture(captures, target)?.map(|m| m.locator))
}

/// Like [`closest`] but also reports which capture won.
pub fn closest_capture(captures: &Captures, target: Option<&str>) -> Result<Option<Match>, Error> {
    let target = match target {
        Some(t) => parse_target(t)?,
        None => Utc::now().naive_utc(),
    };
    Ok(closest_to(captures, target))
}

/// Minimises the absolute distance to `target`; on a tie the earlier capture wins.
pub fn closest_to(captures: &Captures, target: NaiveDateTime) -> Option<Match> {
    let mut best: Option<(i64, &Timestamp, &StorageLocator)> = None;

    for (timestamp, locator) in captures {
        let distance = (timestamp.naive() - target).num_milliseconds().saturating_abs();
        if best.is_none_or(|(best_distance, _, _)| distance < best_distance) {
            best = Some((distance, timestamp, locator));
        }
    }

    best.map(|(_, timestamp, locator)| Match { timestamp: *timestamp, locator: locator.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memento_core::Capture;

    fn captures(timestamps: &[&str]) -> Captures {
        timestamps
            .iter()
            .map(|ts| Capture {
                timestamp: Timestamp::parse(ts).unwrap(),
                file: format!("{ts}.warc.gz"),
                compressed_offset: 0,
                compressed_end_offset: None,
            })
            .collect()
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(closest(&Captures::new(), Some("20200101000000")).unwrap(), None);
        assert_eq!(closest(&Captures::new(), None).unwrap(), None);
    }

    #[test]
    fn test_picks_nearest_earlier() {
        let m = captures(&["20200101000000", "20210101000000"]);
        let locator = closest(&m, Some("20200601000000")).unwrap().unwrap();
        assert_eq!(locator.file, "20200101000000.warc.gz");
    }

    #[test]
    fn test_picks_nearest_later() {
        let m = captures(&["20200101000000", "20210101000000"]);
        let locator = closest(&m, Some("20201201000000")).unwrap().unwrap();
        assert_eq!(locator.file, "20210101000000.warc.gz");
    }

    #[test]
    fn test_tie_goes_to_earlier() {
        let m = captures(&["20200101000000", "20200101000010"]);
        let found = closest_capture(&m, Some("20200101000005")).unwrap().unwrap();
        assert_eq!(found.timestamp.to_string(), "20200101000000");
    }

    #[test]
    fn test_exact_match() {
        let m = captures(&["20190101000000", "20200101000000", "20210101000000"]);
        let found = closest_capture(&m, Some("2020-01-01T00:00:00Z")).unwrap().unwrap();
        assert_eq!(found.timestamp.to_string(), "20200101000000");
    }

    #[test]
    fn test_no_target_uses_now() {
        let m = captures(&["19990101000000", "20200101000000"]);
        let found = closest_capture(&m, None).unwrap().unwrap();
        assert_eq!(found.timestamp.to_string(), "20200101000000");
    }

    #[test]
    fn test_bad_target() {
        let m = captures(&["20200101000000"]);
        assert!(matches!(closest(&m, Some("soon")), Err(Error::InvalidTimestamp(_))));
    }

    #[test]
    fn test_result_minimises_distance() {
        let m = captures(&["20000101000000", "20050615120000", "20100101000000", "20150101000000"]);
        for target in ["20040101000000", "20080101000000", "20120101000000", "20300101000000"] {
            let t = parse_target(target).unwrap();
            let found = closest_to(&m, t).unwrap();
            let best = (found.timestamp.naive() - t).num_seconds().abs();
            assert!(m.iter().all(|(ts, _)| (ts.naive() - t).num_seconds().abs() >= best));
        }
    }
}
