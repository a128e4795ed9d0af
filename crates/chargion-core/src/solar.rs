// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ChargION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Sunrise/sunset arithmetic (NOAA low-accuracy solar position).
//!
//! Pure functions of calendar date and observer location, accurate to a
//! couple of minutes at mid latitudes, which is plenty for charge-window
//! boundaries. Latitudes inside the polar circles are rejected at config
//! validation, so the "sun never rises/sets" case surfaces only as an error
//! here, never as a silently wrong window.

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::f64::consts::PI;

/// Official sunrise/sunset zenith: 90° plus refraction and solar radius
const ZENITH_DEG: f64 = 90.833;

/// Which horizon crossing to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Crossing {
    Sunrise,
    Sunset,
}

/// Sunrise on `date` (UTC) at the given location, positive east longitude.
pub fn sunrise_utc(date: NaiveDate, latitude: f64, longitude: f64) -> Result<DateTime<Utc>> {
    crossing_utc(date, latitude, longitude, Crossing::Sunrise)
}

/// Sunset on `date` (UTC) at the given location, positive east longitude.
pub fn sunset_utc(date: NaiveDate, latitude: f64, longitude: f64) -> Result<DateTime<Utc>> {
    crossing_utc(date, latitude, longitude, Crossing::Sunset)
}

fn crossing_utc(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    crossing: Crossing,
) -> Result<DateTime<Utc>> {
    let gamma = fractional_year(date);
    let eqtime_min = equation_of_time_minutes(gamma);
    let decl_rad = solar_declination_rad(gamma);

    let lat_rad = latitude.to_radians();
    let cos_ha = ZENITH_DEG.to_radians().cos() / (lat_rad.cos() * decl_rad.cos())
        - lat_rad.tan() * decl_rad.tan();

    if !(-1.0..=1.0).contains(&cos_ha) {
        // Polar day or polar night: there is no crossing on this date
        bail!(
            "sun does not {} on {} at latitude {:.2}",
            match crossing {
                Crossing::Sunrise => "rise",
                Crossing::Sunset => "set",
            },
            date,
            latitude
        );
    }

    let ha_deg = cos_ha.acos().to_degrees();
    let ha_signed = match crossing {
        Crossing::Sunrise => ha_deg,
        Crossing::Sunset => -ha_deg,
    };

    // Minutes past midnight UTC
    let minutes = 720.0 - 4.0 * (longitude + ha_signed) - eqtime_min;

    let midnight = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    Ok(midnight + Duration::seconds((minutes * 60.0).round() as i64))
}

/// Fractional year in radians, evaluated at solar noon of the date
fn fractional_year(date: NaiveDate) -> f64 {
    let day_of_year = f64::from(date.ordinal());
    2.0 * PI / 365.0 * (day_of_year - 1.0)
}

/// Equation of time in minutes
fn equation_of_time_minutes(gamma: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin())
}

/// Solar declination in radians
fn solar_declination_rad(gamma: f64) -> f64 {
    0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin() - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin()
}
