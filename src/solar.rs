//! Solar ephemeris calculations for sunrise and sunset instants.
//!
//! Thin layer over the `sunrise` crate's NOAA implementation, reshaped into
//! the contract the transition scheduler needs: for a calendar date and a
//! coordinate, either both sunrise and sunset instants, or `NoEvent` when the
//! location is inside a polar day/night period for that date. Degenerate
//! input (out-of-range coordinates) is an error, never a silent fallback.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use sunrise::{Coordinates, SolarDay, SolarEvent};
use tzf_rs::DefaultFinder;

use crate::location::Coordinate;

/// Minimum plausible day length. Anything shorter is polar night.
const MIN_DAY_LENGTH_SECS: i64 = 60;
/// Maximum plausible day length. Anything longer is polar day.
const MAX_DAY_LENGTH_SECS: i64 = 23 * 60 * 60;

static TIMEZONE_FINDER: Lazy<DefaultFinder> = Lazy::new(DefaultFinder::new);

/// Sunrise and sunset instants for one date at one coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarEvents {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Result of a solar calculation for one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolarOutcome {
    /// Both events occur on this date.
    Events(SolarEvents),
    /// The sun does not rise or does not set on this date (polar regions).
    NoEvent,
}

/// Source of sunrise/sunset instants.
///
/// The scheduler only ever talks to this trait; tests substitute scripted
/// calendars for the real ephemeris.
pub trait SolarCalculator: Send + Sync {
    fn solar_events(&self, date: NaiveDate, coordinate: Coordinate) -> Result<SolarOutcome>;
}

/// NOAA-based calculator backed by the `sunrise` crate.
pub struct EphemerisCalculator;

impl SolarCalculator for EphemerisCalculator {
    fn solar_events(&self, date: NaiveDate, coordinate: Coordinate) -> Result<SolarOutcome> {
        let coords = Coordinates::new(coordinate.latitude, coordinate.longitude)
            .ok_or_else(|| anyhow!("coordinates out of range: {coordinate}"))?;

        let solar_day = SolarDay::new(coords, date);
        let sunrise = solar_day.event_time(SolarEvent::Sunrise);
        let sunset = solar_day.event_time(SolarEvent::Sunset);

        // Inside the polar circles the ephemeris degenerates: during polar
        // night both events collapse onto solar noon, during polar day they
        // span the whole solar cycle. Either way there is no real transition
        // on this date.
        let day_length = (sunset - sunrise).num_seconds();
        if day_length < MIN_DAY_LENGTH_SECS || day_length > MAX_DAY_LENGTH_SECS {
            return Ok(SolarOutcome::NoEvent);
        }

        Ok(SolarOutcome::Events(SolarEvents { sunrise, sunset }))
    }
}

/// Resolve the IANA timezone a coordinate falls in.
///
/// Used for display only: when the configured location is far from the local
/// timezone, transition instants are shown in both. Falls back to UTC for
/// coordinates without a zone (open ocean).
pub fn coordinate_timezone(coordinate: Coordinate) -> Tz {
    let name = TIMEZONE_FINDER.get_tz_name(coordinate.longitude, coordinate.latitude);
    name.parse::<Tz>().unwrap_or(chrono_tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAN_FRANCISCO: Coordinate = Coordinate {
        latitude: 37.7749,
        longitude: -122.4194,
    };
    const LONGYEARBYEN: Coordinate = Coordinate {
        latitude: 78.2232,
        longitude: 15.6267,
    };

    #[test]
    fn san_francisco_midsummer_has_both_events() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let outcome = EphemerisCalculator.solar_events(date, SAN_FRANCISCO).unwrap();

        let SolarOutcome::Events(events) = outcome else {
            panic!("expected events, got {outcome:?}");
        };
        assert!(events.sunrise < events.sunset);

        // Local sunrise just before 6am PDT lands in the 12:00Z hour.
        assert_eq!(events.sunrise.hour(), 12);

        let day_length_hours = (events.sunset - events.sunrise).num_minutes() as f64 / 60.0;
        assert!(
            (13.0..16.0).contains(&day_length_hours),
            "unexpected day length: {day_length_hours:.1}h"
        );
    }

    #[test]
    fn polar_day_reports_no_event() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let outcome = EphemerisCalculator.solar_events(date, LONGYEARBYEN).unwrap();
        assert_eq!(outcome, SolarOutcome::NoEvent);
    }

    #[test]
    fn polar_night_reports_no_event() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        let outcome = EphemerisCalculator.solar_events(date, LONGYEARBYEN).unwrap();
        assert_eq!(outcome, SolarOutcome::NoEvent);
    }

    #[test]
    fn out_of_range_coordinates_are_an_error() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let bogus = Coordinate {
            latitude: 95.0,
            longitude: 10.0,
        };
        assert!(EphemerisCalculator.solar_events(date, bogus).is_err());
    }

    #[test]
    fn coordinate_timezone_resolves_known_city() {
        let tz = coordinate_timezone(SAN_FRANCISCO);
        assert_eq!(tz, chrono_tz::America::Los_Angeles);
    }
}
