use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use config::shared::WatermarkConfig;
use pg_escape::quote_literal;
use std::fmt;

/// Lower bound on `archived_on` for incremental runs.
///
/// Held at microsecond precision, the precision of Postgres timestamps. Only rows whose
/// `archived_on` is strictly later than the watermark are exported, so feeding the largest
/// `archived_on` of a run back as the next watermark exports nothing when no new rows
/// arrived and never skips a row archived later within the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Creates a watermark at a whole second. Out of range values saturate.
    pub fn from_epoch_seconds(seconds: i64) -> Self {
        let datetime = DateTime::from_timestamp(seconds, 0).unwrap_or(if seconds < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });

        Self(datetime)
    }

    /// Creates a watermark at `datetime`, truncated to microseconds.
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(6))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns whether a row archived at `archived_on` lies past this watermark.
    ///
    /// Rows without a timestamp never pass, matching SQL `NULL` comparison semantics.
    pub fn admits(&self, archived_on: Option<DateTime<Utc>>) -> bool {
        archived_on.is_some_and(|archived_on| archived_on > self.0)
    }

    /// Renders the `where` predicate selecting rows past this watermark.
    ///
    /// The session runs with `timezone = UTC`, so `timestamp` columns compare as UTC.
    pub fn sql_filter(&self) -> String {
        format!("archived_on > {}::timestamptz", quote_literal(&self.to_string()))
    }
}

impl From<WatermarkConfig> for Watermark {
    fn from(config: WatermarkConfig) -> Self {
        match config {
            WatermarkConfig::EpochSeconds(seconds) => Watermark::from_epoch_seconds(seconds),
            WatermarkConfig::Timestamp(datetime) => Watermark::from_datetime(datetime),
        }
    }
}

impl fmt::Display for Watermark {
    /// RFC 3339 with microseconds, accepted back as a `source.watermark` value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_millis(millis: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis).single()
    }

    #[test]
    fn admits_only_strictly_later_timestamps() {
        let watermark = Watermark::from_epoch_seconds(300);

        assert!(!watermark.admits(at_millis(300_000)));
        assert!(watermark.admits(at_millis(300_001)));
        assert!(watermark.admits(at_millis(300_900)));
        assert!(!watermark.admits(at_millis(299_999)));
        assert!(!watermark.admits(None));
    }

    #[test]
    fn sub_second_watermark_admits_later_rows_of_the_same_second() {
        let watermark = Watermark::from_datetime(at_millis(300_200).unwrap());

        assert!(!watermark.admits(at_millis(300_200)));
        assert!(watermark.admits(at_millis(300_700)));
        assert!(!watermark.admits(at_millis(300_100)));
    }

    #[test]
    fn nanoseconds_are_truncated_to_postgres_precision() {
        let datetime = Utc.timestamp_opt(300, 123_456_789).unwrap();

        let watermark = Watermark::from_datetime(datetime);

        assert_eq!(
            watermark.as_datetime(),
            Utc.timestamp_opt(300, 123_456_000).unwrap()
        );
        assert!(watermark.admits(Some(datetime)));
    }

    #[test]
    fn sql_filter_renders_predicate() {
        assert_eq!(
            Watermark::from_epoch_seconds(1_600_000_000).sql_filter(),
            "archived_on > '2020-09-13T12:26:40.000000Z'::timestamptz"
        );
        assert_eq!(
            Watermark::from_datetime(at_millis(300_700).unwrap()).sql_filter(),
            "archived_on > '1970-01-01T00:05:00.700000Z'::timestamptz"
        );
    }

    #[test]
    fn converts_from_config() {
        assert_eq!(
            Watermark::from(WatermarkConfig::EpochSeconds(300)),
            Watermark::from_epoch_seconds(300)
        );
        assert_eq!(
            Watermark::from(WatermarkConfig::Timestamp(at_millis(300_700).unwrap())),
            Watermark::from_datetime(at_millis(300_700).unwrap())
        );
    }
}
