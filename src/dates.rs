use chrono::{
    DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d@%H:%M",
];

// chrono accepts short or long month names for both %b and %B.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%B %d %Y"];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("could not understand the date `{token}`")]
pub struct DateResolutionFailure {
    pub token: String,
}

/// Resolves a date token relative to `now`.
///
/// `today`/`tomorrow` keep the time of day of `now`; literal dates without a
/// time land on midnight of that day in `now`'s zone.
pub fn resolve_date<Tz: TimeZone>(
    token: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, DateResolutionFailure> {
    let token = token.trim();
    let fail = || DateResolutionFailure {
        token: token.to_string(),
    };
    let tz = now.timezone();

    if token.eq_ignore_ascii_case("today") {
        return Ok(now.with_timezone(&Utc));
    }
    if token.eq_ignore_ascii_case("tomorrow") {
        return now
            .clone()
            .checked_add_days(Days::new(1))
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(fail);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(token, format) {
            return localize(&tz, naive).ok_or_else(fail);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(token, format) {
            return localize(&tz, day.and_time(NaiveTime::MIN)).ok_or_else(fail);
        }
    }
    if let Ok(weekday) = token.parse::<Weekday>() {
        let today = now.weekday().num_days_from_monday();
        let target = weekday.num_days_from_monday();
        let ahead = match (target + 7 - today) % 7 {
            0 => 7,
            n => n,
        };
        return now
            .clone()
            .checked_add_days(Days::new(u64::from(ahead)))
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(fail);
    }
    Err(fail())
}

/// Human-readable day for replies, in the given zone.
pub fn format_day<Tz: TimeZone>(date: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.with_timezone(tz).format("%a, %b %-d, %Y").to_string()
}

/// Date resolution bound to one "now", usable behind a trait object.
pub trait ResolveDate {
    fn resolve(&self, token: &str) -> Result<DateTime<Utc>, DateResolutionFailure>;
    fn describe(&self, date: &DateTime<Utc>) -> String;
}

#[derive(Debug, Clone)]
pub struct DateResolver<Tz: TimeZone> {
    now: DateTime<Tz>,
}

impl<Tz: TimeZone> DateResolver<Tz> {
    pub fn new(now: DateTime<Tz>) -> Self {
        DateResolver { now }
    }
}

impl<Tz: TimeZone> ResolveDate for DateResolver<Tz>
where
    Tz::Offset: std::fmt::Display,
{
    fn resolve(&self, token: &str) -> Result<DateTime<Utc>, DateResolutionFailure> {
        resolve_date(token, &self.now)
    }

    fn describe(&self, date: &DateTime<Utc>) -> String {
        format_day(date, &self.now.timezone())
    }
}

fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn now() -> DateTime<Utc> {
        // A Thursday.
        Utc.with_ymd_and_hms(2025, 5, 1, 14, 30, 0).unwrap()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(resolve_date("Today", &now()), Ok(now()));
        assert_eq!(
            resolve_date("  TOMORROW ", &now()),
            Ok(now() + Duration::days(1))
        );
    }

    #[test]
    fn rfc3339_keeps_its_offset() {
        let resolved = resolve_date("2025-05-15T09:00:00+02:00", &now()).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2025, 5, 15, 7, 0, 0).unwrap());
    }

    #[test]
    fn date_only_literals_resolve_to_local_midnight() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 15, 0, 0, 0).unwrap();
        for token in ["2025-05-15", "05/15/2025", "May 15, 2025", "may 15 2025", "5/15/2025"] {
            assert_eq!(resolve_date(token, &now()), Ok(expected), "{token}");
        }
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = now().with_timezone(&plus_two);
        assert_eq!(
            resolve_date("2025-05-15", &local_now),
            Ok(Utc.with_ymd_and_hms(2025, 5, 14, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn naive_date_times_use_wall_clock() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 2, 18, 45, 0).unwrap();
        assert_eq!(resolve_date("2025-06-02 18:45", &now()), Ok(expected));
        assert_eq!(resolve_date("2025.06.02@18:45", &now()), Ok(expected));
        assert_eq!(resolve_date("2025-06-02T18:45", &now()), Ok(expected));
    }

    #[test]
    fn weekday_names_pick_the_next_occurrence() {
        assert_eq!(resolve_date("friday", &now()), Ok(now() + Duration::days(1)));
        assert_eq!(resolve_date("Thursday", &now()), Ok(now() + Duration::days(7)));
        assert_eq!(resolve_date("mon", &now()), Ok(now() + Duration::days(4)));
    }

    #[test]
    fn garbage_is_a_reportable_failure() {
        assert_eq!(
            resolve_date("banana", &now()),
            Err(DateResolutionFailure {
                token: "banana".into()
            })
        );
        assert!(resolve_date("", &now()).is_err());
        assert!(resolve_date("2025-13-45", &now()).is_err());
    }

    #[test]
    fn format_day_reads_naturally() {
        assert_eq!(format_day(&now(), &Utc), "Thu, May 1, 2025");
    }
}
