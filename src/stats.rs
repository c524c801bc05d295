//! Summary statistics over activity records

use chrono::Datelike;
use serde::Serialize;

use crate::activity::Activity;

/// Totals and maxima over outdoor activities (indoor `trainer` sessions excluded).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityStats {
    /// Meters
    pub total_distance: f64,
    /// Meters
    pub total_elevation_gain: f64,
    /// Seconds of moving time
    pub total_time: f64,
    pub total_activities: usize,
    pub longest_ride: f64,
    pub highest_elevation: f64,
    /// Meters per second
    pub fastest_speed: f64,
}

pub fn calculate_stats<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> ActivityStats {
    activities
        .into_iter()
        .filter(|a| !a.flag("trainer"))
        .fold(ActivityStats::default(), |mut stats, a| {
            let distance = a.number("distance");
            let elevation = a.number("total_elevation_gain");
            stats.total_distance += distance;
            stats.total_elevation_gain += elevation;
            stats.total_time += a.number("moving_time");
            stats.total_activities += 1;
            stats.longest_ride = stats.longest_ride.max(distance);
            stats.highest_elevation = stats.highest_elevation.max(elevation);
            stats.fastest_speed = stats.fastest_speed.max(a.number("max_speed"));
            stats
        })
}

/// Activities whose `start_date` falls in `year` (in the timestamp's own offset).
pub fn activities_in_year(activities: &[Activity], year: i32) -> Vec<&Activity> {
    activities
        .iter()
        .filter(|a| a.timestamp().map(|ts| ts.year() == year).unwrap_or(false))
        .collect()
}
