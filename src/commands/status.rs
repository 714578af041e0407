//! The `status` subcommand: show the configuration and the next transition.

use anyhow::Result;
use chrono::{DateTime, Local, Offset, Utc};

use crate::config::Config;
use crate::constants::SEARCH_BUDGET_DAYS;
use crate::location::Coordinate;
use crate::scheduler::{SearchOutcome, next_transition};
use crate::solar::{EphemerisCalculator, coordinate_timezone};

pub fn handle_status_command() -> Result<()> {
    let config = Config::load()?;
    config.log_config();

    match (config.latitude, config.longitude) {
        (Some(latitude), Some(longitude)) => {
            let coordinate = Coordinate {
                latitude,
                longitude,
            };
            let now = Utc::now();
            match next_transition(&EphemerisCalculator, coordinate, now, SEARCH_BUDGET_DAYS)? {
                SearchOutcome::Transition(transition) => {
                    log_block_start!("Next transition: {} theme", transition.theme);
                    log_indented!("{}", format_instant(transition.at, coordinate));
                }
                SearchOutcome::NoTransitionFound => {
                    log_block_start!(
                        "No sunrise or sunset within the next {} days",
                        SEARCH_BUDGET_DAYS
                    );
                    log_indented!("Expected inside the polar circles; the daemon re-checks daily");
                }
            }
        }
        _ => {
            log_block_start!("No location configured");
            log_indented!("Set latitude and longitude in nightfall.toml for automatic transitions");
        }
    }

    log_end!();
    Ok(())
}

/// Format an instant in the coordinate's timezone, adding the local time
/// when the two differ.
fn format_instant(at: DateTime<Utc>, coordinate: Coordinate) -> String {
    let coordinate_tz = coordinate_timezone(coordinate);
    let at_coordinate = at.with_timezone(&coordinate_tz);
    let at_local = at.with_timezone(&Local);

    if at_coordinate.offset().fix() == at_local.offset().fix() {
        at_local.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        format!(
            "{} ({}) [{} local]",
            at_coordinate.format("%Y-%m-%d %H:%M:%S"),
            coordinate_tz,
            at_local.format("%H:%M:%S")
        )
    }
}
