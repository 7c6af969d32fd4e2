//! Periodic email reports
//!
//! At 06:00 UTC: daily reports every day, weekly reports on Mondays,
//! monthly reports on the 1st. Each eligible (user, project) preference with
//! `email_report.enabled` and a matching frequency receives one HTML + plain
//! text email with the period's statistics.

use crate::core::NotificationCore;
use crate::{render, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use std::sync::OnceLock;
use tera::Tera;
use tracing::{error, info};
use trapline_core::events;
use trapline_core::messages::EmailDelivery;
use trapline_core::model::ReportFrequency;
use trapline_queue::names;

const HTML_TEMPLATE: &str = include_str!("../templates/report.html");
const TEXT_TEMPLATE: &str = include_str!("../templates/report.txt");

/// How many species rows a report lists
const TOP_SPECIES_LIMIT: usize = 10;
/// How many highlight detections a report lists
const NOTABLE_LIMIT: i64 = 5;

/// One report window
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPeriod {
    pub frequency: ReportFrequency,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

/// Periods due on `today` (which is the morning the job fires):
/// daily always covers yesterday; weekly covers the previous Mon-Sun and
/// fires on Mondays; monthly covers the previous month and fires on the 1st.
pub fn due_periods(today: NaiveDate) -> Vec<ReportPeriod> {
    let yesterday = today - Duration::days(1);
    let mut periods = vec![ReportPeriod {
        frequency: ReportFrequency::Daily,
        start: yesterday,
        end: yesterday,
        label: yesterday.format("%B %d, %Y").to_string(),
    }];

    if today.weekday() == Weekday::Mon {
        let end = yesterday; // Sunday
        let start = end - Duration::days(6); // previous Monday
        periods.push(ReportPeriod {
            frequency: ReportFrequency::Weekly,
            start,
            end,
            label: format!("{} - {}", start.format("%B %d"), end.format("%B %d, %Y")),
        });
    }

    if today.day() == 1 {
        let end = yesterday; // last day of the previous month
        let start = end.with_day(1).unwrap_or(end);
        periods.push(ReportPeriod {
            frequency: ReportFrequency::Monthly,
            start,
            end,
            label: start.format("%B %Y").to_string(),
        });
    }

    periods
}

fn period_datetimes(period: &ReportPeriod) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&period.start.and_time(NaiveTime::MIN));
    let end = Utc.from_utc_datetime(
        &period
            .end
            .and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)),
    );
    (start, end)
}

fn templates() -> &'static Option<Tera> {
    static TERA: OnceLock<Option<Tera>> = OnceLock::new();
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        match tera.add_raw_templates(vec![
            ("report.html", HTML_TEMPLATE),
            ("report.txt", TEXT_TEMPLATE),
        ]) {
            Ok(()) => Some(tera),
            Err(e) => {
                error!(error = %e, "report templates failed to compile");
                None
            }
        }
    })
}

impl NotificationCore {
    /// Send all reports due on `today`
    pub async fn send_periodic_reports(&self, today: NaiveDate) -> Result<()> {
        for period in due_periods(today) {
            info!(
                frequency = period.frequency.as_str(),
                label = period.label.as_str(),
                "starting email reports"
            );
            if let Err(e) = self.send_reports_for(&period).await {
                error!(
                    frequency = period.frequency.as_str(),
                    error = %e,
                    "report sweep failed"
                );
            }
        }
        Ok(())
    }

    async fn send_reports_for(&self, period: &ReportPeriod) -> Result<()> {
        let recipients = self.db().all_eligible_recipients().await?;
        let mut sent = 0usize;

        for recipient in &recipients {
            let pref = &recipient.preference;
            let Some(config) = pref.channels.email_report.as_ref() else {
                continue;
            };
            if !config.enabled || config.frequency != period.frequency {
                continue;
            }

            match self.send_one_report(recipient, period).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!(
                        user_id = pref.user_id,
                        project_id = pref.project_id,
                        error = %e,
                        "report generation failed for user, continuing"
                    );
                }
            }
        }

        info!(
            frequency = period.frequency.as_str(),
            reports_sent = sent,
            "email reports queued"
        );
        Ok(())
    }

    async fn send_one_report(
        &self,
        recipient: &trapline_db::notifications::Recipient,
        period: &ReportPeriod,
    ) -> Result<()> {
        let pref = &recipient.preference;
        let project = self.db().get_project(pref.project_id).await?;
        let (start, end) = period_datetimes(period);

        let overview = self.db().overview_stats(project.id, start, end).await?;
        let observations = self.db().fetch_observations(project.id, start, end).await?;
        let grouped = events::group_events(
            &observations,
            i64::from(project.independence_interval_minutes),
        );

        // Top species by independent-event totals.
        let mut top_species: Vec<(String, i64)> = events::species_totals(&grouped)
            .into_iter()
            .collect();
        top_species.sort_by(|a, b| b.1.cmp(&a.1));
        top_species.truncate(TOP_SPECIES_LIMIT);

        // Hourly activity and daily timeline over event starts.
        let mut hourly = [0i64; 24];
        let mut daily: std::collections::BTreeMap<NaiveDate, i64> = Default::default();
        for event in &grouped {
            hourly[event.start.hour() as usize % 24] += event.count;
            *daily.entry(event.start.date_naive()).or_insert(0) += event.count;
        }

        let cameras = self.db().list_project_cameras(project.id).await?;
        let notable = self
            .db()
            .notable_detections(project.id, start, end, NOTABLE_LIMIT)
            .await?;

        let mut context = tera::Context::new();
        context.insert("project_name", &project.name);
        context.insert("period_label", &period.label);
        context.insert("frequency", period.frequency.as_str());
        context.insert("total_images", &overview.total_images);
        context.insert("new_images", &overview.new_images);
        context.insert("total_cameras", &overview.total_cameras);
        context.insert(
            "top_species",
            &top_species
                .iter()
                .map(|(species, count)| {
                    serde_json::json!({
                        "name": render::species_sentence_case(species),
                        "count": count,
                    })
                })
                .collect::<Vec<_>>(),
        );
        context.insert(
            "cameras",
            &cameras
                .iter()
                .map(|camera| {
                    serde_json::json!({
                        "name": camera.name,
                        "status": camera.status.as_str(),
                        "battery_percent": camera.battery_percent,
                    })
                })
                .collect::<Vec<_>>(),
        );
        context.insert(
            "notable_detections",
            &notable
                .iter()
                .map(|detection| {
                    serde_json::json!({
                        "species": render::species_sentence_case(&detection.species),
                        "confidence_percent": (detection.confidence * 100.0) as i64,
                        "camera_name": detection.camera_name,
                        "captured_at": detection.captured_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                })
                .collect::<Vec<_>>(),
        );
        context.insert("hourly_activity", &hourly.to_vec());
        context.insert(
            "daily_timeline",
            &daily
                .iter()
                .map(|(date, count)| {
                    serde_json::json!({ "date": date.format("%Y-%m-%d").to_string(), "count": count })
                })
                .collect::<Vec<_>>(),
        );
        context.insert(
            "dashboard_url",
            &render::project_images_url(self.domain(), project.id),
        );

        let (body_html, body_text) = match templates() {
            Some(tera) => (
                Some(tera.render("report.html", &context)?),
                tera.render("report.txt", &context)?,
            ),
            None => (None, fallback_text(&project.name, &period.label, &overview)),
        };

        let subject = format!(
            "{} report for {} - {}",
            capitalized(period.frequency.as_str()),
            project.name,
            period.label
        );
        let trigger_data = serde_json::json!({
            "project_id": project.id,
            "frequency": period.frequency.as_str(),
            "period_start": period.start.to_string(),
            "period_end": period.end.to_string(),
        });

        let log_id = self
            .db()
            .create_notification_log(
                pref.user_id,
                "email_report",
                trapline_core::model::Channel::Email,
                &trigger_data,
                &subject,
            )
            .await?;

        self.queues()
            .with_queue(names::NOTIFICATION_EMAIL)
            .publish(&EmailDelivery {
                notification_log_id: log_id,
                to_email: recipient.email.clone(),
                subject,
                body_text,
                body_html,
            })
            .await?;

        info!(
            log_id,
            user_id = pref.user_id,
            project_id = project.id,
            frequency = period.frequency.as_str(),
            "queued email report"
        );
        Ok(())
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn fallback_text(
    project_name: &str,
    period_label: &str,
    overview: &trapline_db::stats::OverviewStats,
) -> String {
    format!(
        "Report for {project_name} ({period_label})\n\nNew images: {}\nTotal images: {}\nCameras: {}\n",
        overview.new_images, overview.total_images, overview.total_cameras
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_midweek_day_is_daily_only() {
        // Wednesday 2025-12-17.
        let periods = due_periods(date(2025, 12, 17));
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].frequency, ReportFrequency::Daily);
        assert_eq!(periods[0].start, date(2025, 12, 16));
        assert_eq!(periods[0].end, date(2025, 12, 16));
    }

    #[test]
    fn test_monday_adds_weekly_covering_previous_week() {
        // Monday 2025-12-15.
        let periods = due_periods(date(2025, 12, 15));
        assert_eq!(periods.len(), 2);
        let weekly = &periods[1];
        assert_eq!(weekly.frequency, ReportFrequency::Weekly);
        assert_eq!(weekly.start, date(2025, 12, 8));
        assert_eq!(weekly.end, date(2025, 12, 14));
    }

    #[test]
    fn test_first_of_month_adds_monthly() {
        let periods = due_periods(date(2026, 1, 1));
        assert!(periods
            .iter()
            .any(|p| p.frequency == ReportFrequency::Monthly
                && p.start == date(2025, 12, 1)
                && p.end == date(2025, 12, 31)));
    }

    #[test]
    fn test_monday_first_of_month_fires_all_three() {
        // 2025-12-01 was a Monday.
        let periods = due_periods(date(2025, 12, 1));
        assert_eq!(periods.len(), 3);
    }

    #[test]
    fn test_templates_compile_and_render() {
        let tera = templates().as_ref().expect("templates compile");
        let mut context = tera::Context::new();
        context.insert("project_name", "Veluwe");
        context.insert("period_label", "December 16, 2025");
        context.insert("frequency", "daily");
        context.insert("total_images", &120i64);
        context.insert("new_images", &12i64);
        context.insert("total_cameras", &4i64);
        context.insert(
            "top_species",
            &vec![serde_json::json!({"name": "Roe deer", "count": 7})],
        );
        context.insert(
            "cameras",
            &vec![serde_json::json!({"name": "WUH09", "status": "active", "battery_percent": 68})],
        );
        context.insert("notable_detections", &Vec::<serde_json::Value>::new());
        context.insert("hourly_activity", &vec![0i64; 24]);
        context.insert("daily_timeline", &Vec::<serde_json::Value>::new());
        context.insert("dashboard_url", "https://example.org/projects/3/images");

        let text = tera.render("report.txt", &context).expect("text renders");
        assert!(text.contains("Veluwe"));
        assert!(text.contains("Roe deer: 7"));

        let html = tera.render("report.html", &context).expect("html renders");
        assert!(html.contains("Veluwe"));
        assert!(html.contains("Roe deer"));
    }
}
