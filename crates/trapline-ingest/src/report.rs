//! Daily-report parsing
//!
//! Cameras upload a line-oriented `key: value` TXT next to their images.
//! Two dialects exist:
//!
//! - **Legacy (2024)**: has both `IMEI` and `CamID`; temperature as
//!   `26 Celsius Degree`; GPS as DMS with asterisks
//!   (`N52*05'55" E005*07'31"`); date with a double space; counters under
//!   `Total Pics` / `Send times`.
//! - **Current (2025)**: `IMEI` only; temperature as `24℃`; decimal GPS
//!   `lat,lon`; single-space date; counters under `Total` / `Send`.
//!
//! Dispatch is by key presence. Individual field failures degrade to `None`
//! with a warning; only a report whose dialect cannot be determined is
//! rejected.

use crate::error::{Rejection, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;
use trapline_core::model::{CameraHealth, GeoPoint};

/// A parsed daily report: which camera it came from plus the health snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    /// Camera IMEI (the identifier both dialects share)
    pub camera_id: String,
    /// Legacy friendly name (`CamID`), when present
    pub friendly_name: Option<String>,
    pub health: CameraHealth,
}

/// Parse a daily report body.
///
/// # Errors
/// Returns `Rejection::ParseFailed` when the camera dialect cannot be
/// determined (no `IMEI` key).
pub fn parse_daily_report(content: &str) -> Result<DailyReport> {
    let fields = split_fields(content);

    match (fields.get("IMEI"), fields.get("CamID")) {
        (Some(imei), Some(cam_id)) => Ok(parse_legacy(imei, Some(cam_id.clone()), &fields)),
        (Some(imei), None) => Ok(parse_current(imei, &fields)),
        (None, _) => Err(Rejection::ParseFailed(format!(
            "cannot determine camera dialect, keys: {:?}",
            fields.keys().collect::<Vec<_>>()
        ))
        .into()),
    }
}

/// `key: value` lines into a map; CR/LF tolerated, later keys win
fn split_fields(content: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    fields
}

fn parse_legacy(imei: &str, friendly_name: Option<String>, fields: &HashMap<String, String>) -> DailyReport {
    let health = CameraHealth {
        battery_percent: fields.get("Battery").and_then(|v| parse_battery(v)),
        temperature_c: fields.get("Temp").and_then(|v| parse_temperature_legacy(v)),
        signal_quality: fields.get("CSQ").and_then(|v| parse_signal_quality(v)),
        gps: fields.get("GPS").and_then(|v| parse_gps_dms(v)),
        total_images: fields.get("Total Pics").and_then(|v| v.parse().ok()),
        sent_images: fields.get("Send times").and_then(|v| v.parse().ok()),
        report_datetime: fields.get("Date").and_then(|v| parse_report_datetime(v)),
        ..sd_fields(fields)
    };
    DailyReport {
        camera_id: imei.to_string(),
        friendly_name,
        health,
    }
}

fn parse_current(imei: &str, fields: &HashMap<String, String>) -> DailyReport {
    let health = CameraHealth {
        battery_percent: fields.get("Battery").and_then(|v| parse_battery(v)),
        temperature_c: fields.get("Temp").and_then(|v| parse_temperature_current(v)),
        signal_quality: fields.get("CSQ").and_then(|v| parse_signal_quality(v)),
        gps: fields.get("GPS").and_then(|v| parse_gps_decimal(v)),
        total_images: fields.get("Total").and_then(|v| v.parse().ok()),
        sent_images: fields.get("Send").and_then(|v| v.parse().ok()),
        report_datetime: fields.get("Date").and_then(|v| parse_report_datetime(v)),
        ..sd_fields(fields)
    };
    DailyReport {
        camera_id: imei.to_string(),
        friendly_name: None,
        health,
    }
}

fn sd_fields(fields: &HashMap<String, String>) -> CameraHealth {
    let mut health = CameraHealth::default();
    if let Some((used, total)) = fields.get("SD").and_then(|v| parse_sd_card(v)) {
        health.sd_used_mb = Some(used);
        health.sd_total_mb = Some(total);
        health.sd_utilization_percent = Some(if total == 0 {
            0.0
        } else {
            (f64::from(used) / f64::from(total) * 10_000.0).round() / 100.0
        });
    }
    health
}

/// `31` clamped to 0..=31
fn parse_signal_quality(raw: &str) -> Option<i32> {
    match raw.parse::<i32>() {
        Ok(csq) => Some(csq.clamp(0, 31)),
        Err(_) => {
            warn!(raw, "failed to parse CSQ");
            None
        }
    }
}

/// `60%` clamped to 0..=100
fn parse_battery(raw: &str) -> Option<i32> {
    match raw.trim_end_matches('%').trim().parse::<i32>() {
        Ok(battery) => Some(battery.clamp(0, 100)),
        Err(_) => {
            warn!(raw, "failed to parse battery");
            None
        }
    }
}

/// Legacy `26 Celsius Degree`
fn parse_temperature_legacy(raw: &str) -> Option<i32> {
    match raw.split_whitespace().next().map(str::parse::<i32>) {
        Some(Ok(temp)) => Some(temp),
        _ => {
            warn!(raw, "failed to parse legacy temperature");
            None
        }
    }
}

/// Current `24℃` (trailing space tolerated)
fn parse_temperature_current(raw: &str) -> Option<i32> {
    match raw.trim_end_matches(['℃', ' ']).parse::<i32>() {
        Ok(temp) => Some(temp),
        Err(_) => {
            warn!(raw, "failed to parse temperature");
            None
        }
    }
}

/// `59405M/59628M` into (used, total) megabytes
fn parse_sd_card(raw: &str) -> Option<(i32, i32)> {
    let (used_raw, total_raw) = raw.split_once('/')?;
    let used = used_raw.trim().trim_end_matches(['M', 'm']).parse().ok();
    let total = total_raw.trim().trim_end_matches(['M', 'm']).parse().ok();
    match (used, total) {
        (Some(used), Some(total)) => Some((used, total)),
        _ => {
            warn!(raw, "failed to parse SD card usage");
            None
        }
    }
}

/// Decimal `52.098737,5.125504`; `(0, 0)` filtered as invalid
fn parse_gps_decimal(raw: &str) -> Option<GeoPoint> {
    let (lat_raw, lon_raw) = raw.split_once(',')?;
    let lat = lat_raw.trim().parse::<f64>().ok()?;
    let lon = lon_raw.trim().parse::<f64>().ok()?;
    if lat == 0.0 && lon == 0.0 {
        warn!(raw, "ignoring invalid (0, 0) GPS");
        return None;
    }
    Some(GeoPoint::new(lat, lon))
}

/// DMS with asterisks: `N52*05'55" E005*07'31"`
fn parse_gps_dms(raw: &str) -> Option<GeoPoint> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r#"([NS])(\d+)\*(\d+)'(\d+)"?\s*([EW])(\d+)\*(\d+)'(\d+)"?"#).ok()
        })
        .as_ref()?;

    let captures = match pattern.captures(raw) {
        Some(captures) => captures,
        None => {
            warn!(raw, "failed to parse DMS GPS");
            return None;
        }
    };

    let component = |deg: usize, min: usize, sec: usize| -> Option<f64> {
        let d: f64 = captures.get(deg)?.as_str().parse().ok()?;
        let m: f64 = captures.get(min)?.as_str().parse().ok()?;
        let s: f64 = captures.get(sec)?.as_str().parse().ok()?;
        Some(d + m / 60.0 + s / 3600.0)
    };

    let mut lat = component(2, 3, 4)?;
    let mut lon = component(6, 7, 8)?;
    if captures.get(1).map(|m| m.as_str()) == Some("S") {
        lat = -lat;
    }
    if captures.get(5).map(|m| m.as_str()) == Some("W") {
        lon = -lon;
    }
    Some(GeoPoint::new(lat, lon))
}

/// `DD/MM/YYYY HH:MM:SS`; the legacy dialect puts a double space before the
/// time, so runs of whitespace are collapsed first. Camera clocks are
/// timezone-naive and read as UTC.
fn parse_report_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match NaiveDateTime::parse_from_str(&normalized, "%d/%m/%Y %H:%M:%S") {
        Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
        Err(e) => {
            warn!(raw, error = %e, "failed to parse report datetime");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;

    const LEGACY_REPORT: &str = "IMEI: 860946063660255\r\n\
        CamID: WUH09\r\n\
        CSQ: 31\r\n\
        Temp: 26 Celsius Degree\r\n\
        Battery: 60%\r\n\
        SD: 59405M/59628M\r\n\
        GPS: N52*05'55\" E005*07'31\"\r\n\
        Date: 19/12/2025  16:21:42\r\n\
        Total Pics: 123\r\n\
        Send times: 120\r\n";

    const CURRENT_REPORT: &str = "IMEI: 861943070068027\n\
        CSQ: 17\n\
        Temp: 24℃\n\
        Battery: 85%\n\
        SD: 1024M/59628M\n\
        GPS: 52.098737,5.125504\n\
        Date: 05/12/2025 15:46:47\n\
        Total: 37\n\
        Send: 36\n";

    #[test]
    fn test_legacy_report_full_parse() {
        let report = parse_daily_report(LEGACY_REPORT).expect("parse");
        assert_eq!(report.camera_id, "860946063660255");
        assert_eq!(report.friendly_name.as_deref(), Some("WUH09"));

        let health = &report.health;
        assert_eq!(health.battery_percent, Some(60));
        assert_eq!(health.temperature_c, Some(26));
        assert_eq!(health.signal_quality, Some(31));
        assert_eq!(health.sd_used_mb, Some(59405));
        assert_eq!(health.sd_total_mb, Some(59628));
        assert_eq!(health.total_images, Some(123));
        assert_eq!(health.sent_images, Some(120));

        let gps = health.gps.expect("gps");
        assert!((gps.lat - (52.0 + 5.0 / 60.0 + 55.0 / 3600.0)).abs() < 1e-9);
        assert!((gps.lon - (5.0 + 7.0 / 60.0 + 31.0 / 3600.0)).abs() < 1e-9);

        assert_eq!(
            health.report_datetime,
            Some(Utc.with_ymd_and_hms(2025, 12, 19, 16, 21, 42).unwrap())
        );
    }

    #[test]
    fn test_current_report_full_parse() {
        let report = parse_daily_report(CURRENT_REPORT).expect("parse");
        assert_eq!(report.camera_id, "861943070068027");
        assert!(report.friendly_name.is_none());

        let health = &report.health;
        assert_eq!(health.battery_percent, Some(85));
        assert_eq!(health.temperature_c, Some(24));
        assert_eq!(health.signal_quality, Some(17));
        assert_eq!(health.total_images, Some(37));
        assert_eq!(health.sent_images, Some(36));

        let gps = health.gps.expect("gps");
        assert!((gps.lat - 52.098737).abs() < 1e-9);
        assert!((gps.lon - 5.125504).abs() < 1e-9);

        assert_eq!(
            health.report_datetime,
            Some(Utc.with_ymd_and_hms(2025, 12, 5, 15, 46, 47).unwrap())
        );
    }

    #[test]
    fn test_sd_utilization_percent() {
        let report = parse_daily_report(LEGACY_REPORT).expect("parse");
        let utilization = report.health.sd_utilization_percent.expect("utilization");
        assert!((utilization - 99.63).abs() < 0.01);
    }

    #[test]
    fn test_missing_imei_is_rejected() {
        let result = parse_daily_report("CamID: WUH09\nBattery: 60%\n");
        assert!(matches!(
            result,
            Err(IngestError::Rejected(Rejection::ParseFailed(_)))
        ));
    }

    #[test]
    fn test_unparseable_fields_degrade_to_none() {
        let report = parse_daily_report(
            "IMEI: 1\nBattery: dead\nTemp: chilly\nCSQ: many\nSD: full\nGPS: nowhere\n",
        )
        .expect("parse");
        let health = &report.health;
        assert!(health.battery_percent.is_none());
        assert!(health.temperature_c.is_none());
        assert!(health.signal_quality.is_none());
        assert!(health.sd_used_mb.is_none());
        assert!(health.gps.is_none());
    }

    #[test]
    fn test_battery_and_csq_are_clamped() {
        let report =
            parse_daily_report("IMEI: 1\nBattery: 150%\nCSQ: 99\n").expect("parse");
        assert_eq!(report.health.battery_percent, Some(100));
        assert_eq!(report.health.signal_quality, Some(31));
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let report =
            parse_daily_report("IMEI: 1\nCamID: WUH01\nGPS: S33*51'25\" W070*39'10\"\n")
                .expect("parse");
        let gps = report.health.gps.expect("gps");
        assert!(gps.lat < 0.0);
        assert!(gps.lon < 0.0);
    }

    #[test]
    fn test_zero_zero_gps_is_filtered() {
        let report = parse_daily_report("IMEI: 1\nGPS: 0.0,0.0\n").expect("parse");
        assert!(report.health.gps.is_none());
    }
}
