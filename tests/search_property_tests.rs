use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nightfall::location::Coordinate;
use nightfall::scheduler::{SearchOutcome, next_transition};
use nightfall::solar::{SolarCalculator, SolarEvents, SolarOutcome};
use nightfall::theme::Theme;

const SAN_FRANCISCO: Coordinate = Coordinate {
    latitude: 37.7749,
    longitude: -122.4194,
};

/// Calculator scripted with a closure.
struct FnCalculator<F>(F);

impl<F> SolarCalculator for FnCalculator<F>
where
    F: Fn(NaiveDate, Coordinate) -> Result<SolarOutcome> + Send + Sync,
{
    fn solar_events(&self, date: NaiveDate, coordinate: Coordinate) -> Result<SolarOutcome> {
        (self.0)(date, coordinate)
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
}

/// Every date gets the same sunrise offset and day length, which keeps the
/// event sequence monotone across dates the way real ephemerides are.
fn events_for(date: NaiveDate, sunrise_offset_mins: i64, day_length_mins: i64) -> SolarEvents {
    let sunrise = day_start(date) + Duration::minutes(sunrise_offset_mins);
    SolarEvents {
        sunrise,
        sunset: sunrise + Duration::minutes(day_length_mins),
    }
}

/// Generate a base instant within 2024.
fn now_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..366 * 24 * 60).prop_map(|minutes| {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    })
}

proptest! {
    /// The search must terminate within its iteration budget for any
    /// calculator behavior, including one that never produces events.
    #[test]
    fn search_is_bounded_for_eventless_calendars(
        now in now_strategy(),
        budget in 0u32..6
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let calculator = FnCalculator(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(SolarOutcome::NoEvent)
        });

        let outcome = next_transition(&calculator, SAN_FRANCISCO, now, budget).unwrap();

        prop_assert_eq!(outcome, SearchOutcome::NoTransitionFound);
        prop_assert!(calls.load(Ordering::SeqCst) <= (budget + 2) as usize);
    }

    /// A returned transition is strictly in the future, its theme matches
    /// the kind of event it points at, and no earlier qualifying event was
    /// skipped.
    #[test]
    fn search_returns_the_earliest_future_event(
        now in now_strategy(),
        sunrise_offset_mins in 240i64..720,
        day_length_mins in 60i64..1200,
        // With a budget of at least two days the window always reaches the
        // next day's sunrise, so a transition must exist.
        budget in 2u32..5
    ) {
        let calculator = FnCalculator(move |date, _| {
            Ok(SolarOutcome::Events(events_for(date, sunrise_offset_mins, day_length_mins)))
        });

        let outcome = next_transition(&calculator, SAN_FRANCISCO, now, budget).unwrap();
        let SearchOutcome::Transition(transition) = outcome else {
            // With events on every date and a small offset range, something
            // within the window always qualifies.
            return Err(TestCaseError::fail("expected a transition"));
        };

        prop_assert!(transition.at > now, "transition must be strictly future");

        // Rebuild the event sequence around `now` and check both the theme
        // and that nothing sits between `now` and the result.
        let first = now.date_naive() - Duration::days(3);
        let mut is_known_event = false;
        for offset in 0..(budget as i64 + 7) {
            let events = events_for(first + Duration::days(offset), sunrise_offset_mins, day_length_mins);
            for (at, theme) in [(events.sunrise, Theme::Light), (events.sunset, Theme::Dark)] {
                prop_assert!(
                    !(now < at && at < transition.at),
                    "skipped an earlier event at {at}"
                );
                if at == transition.at {
                    is_known_event = true;
                    prop_assert_eq!(theme, transition.theme, "theme does not match event kind");
                }
            }
        }
        prop_assert!(is_known_event, "returned instant is not one of the calendar's events");
    }

    /// `now` exactly on an event boundary must resolve to the *next* event,
    /// never re-trigger the boundary itself.
    #[test]
    fn boundary_instants_favor_the_later_event(
        sunrise_offset_mins in 240i64..720,
        day_length_mins in 60i64..1200,
    ) {
        let calculator = FnCalculator(move |date, _| {
            Ok(SolarOutcome::Events(events_for(date, sunrise_offset_mins, day_length_mins)))
        });
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let events = events_for(date, sunrise_offset_mins, day_length_mins);

        // At sunrise: next is that day's sunset.
        let at_sunrise = next_transition(&calculator, SAN_FRANCISCO, events.sunrise, 2).unwrap();
        prop_assert_eq!(
            at_sunrise,
            SearchOutcome::Transition(nightfall::Transition {
                theme: Theme::Dark,
                at: events.sunset,
            })
        );

        // At sunset: next is the following day's sunrise.
        let next_events = events_for(date + Duration::days(1), sunrise_offset_mins, day_length_mins);
        let at_sunset = next_transition(&calculator, SAN_FRANCISCO, events.sunset, 2).unwrap();
        prop_assert_eq!(
            at_sunset,
            SearchOutcome::Transition(nightfall::Transition {
                theme: Theme::Light,
                at: next_events.sunrise,
            })
        );
    }

    /// Sporadic eventless dates (patchy polar shoulder seasons) are stepped
    /// over, not treated as errors.
    #[test]
    fn eventless_gaps_are_stepped_over(
        now in now_strategy(),
        gap_days in 1i64..3,
    ) {
        let sunrise_offset_mins = 360;
        let day_length_mins = 600;
        // Events only exist on dates at least `gap_days` past `now`'s date.
        let first_event_date = now.date_naive() + Duration::days(gap_days);
        let calculator = FnCalculator(move |date, _| {
            if date < first_event_date {
                Ok(SolarOutcome::NoEvent)
            } else {
                Ok(SolarOutcome::Events(events_for(date, sunrise_offset_mins, day_length_mins)))
            }
        });

        // A budget covering the gap finds the first real event.
        let outcome = next_transition(&calculator, SAN_FRANCISCO, now, 4).unwrap();
        let SearchOutcome::Transition(transition) = outcome else {
            return Err(TestCaseError::fail("expected a transition past the gap"));
        };
        prop_assert_eq!(transition.theme, Theme::Light);
        prop_assert_eq!(
            transition.at,
            events_for(first_event_date, sunrise_offset_mins, day_length_mins).sunrise
        );
    }
}
