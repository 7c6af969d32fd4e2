//! Integration tests for the PostgreSQL store
//!
//! These tests require a running PostgreSQL instance:
//!
//! ```bash
//! docker run --rm -p 5432:5432 -e POSTGRES_PASSWORD=postgres postgres:16
//! cargo test --package trapline-db --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{Duration, TimeZone, Utc};
use trapline_core::model::{GeoPoint, ImageMetadata, ImageStatus, Role};
use trapline_db::images::NewImage;
use trapline_db::Database;
use uuid::Uuid;

fn get_connection_string() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "host=localhost user=postgres password=postgres dbname=postgres".to_string())
}

async fn database() -> Database {
    let db = Database::connect(&get_connection_string())
        .await
        .expect("Failed to connect to PostgreSQL");
    db.init_schema().await.expect("Failed to ensure schema");
    db
}

fn unique_serial() -> String {
    // Serial column is VARCHAR(50); a UUID fits with room to spare.
    format!("{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_camera_get_or_create_is_idempotent() {
    let db = database().await;
    let serial = unique_serial();

    let first = db
        .get_or_create_camera("WUH09", Some(&serial), Some("SY"), Some("4.0PCG"), "Willfine-2024")
        .await
        .expect("Failed to create camera");
    let second = db
        .get_or_create_camera("WUH09", Some(&serial), Some("SY"), Some("4.0PCG"), "Willfine-2024")
        .await
        .expect("Failed to fetch camera");

    assert_eq!(first.id, second.id);
    assert_eq!(second.serial_number.as_deref(), Some(serial.as_str()));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_duplicate_image_detection_within_one_second() {
    let db = database().await;
    let camera = db
        .get_or_create_camera("dup-cam", Some(&unique_serial()), None, None, "Willfine-2025")
        .await
        .expect("Failed to create camera");

    let captured_at = Utc.with_ymd_and_hms(2025, 12, 5, 15, 46, 7).unwrap();
    let image = NewImage {
        uuid: Uuid::new_v4(),
        filename: "E1000159.JPG".to_string(),
        camera_id: camera.id,
        captured_at,
        storage_path: "cam/2025/12/x_E1000159.JPG".to_string(),
        thumbnail_path: None,
        metadata: ImageMetadata::default(),
    };
    db.create_image(&image).await.expect("Failed to insert image");

    assert!(db
        .is_duplicate_image(camera.id, "E1000159.JPG", captured_at)
        .await
        .expect("Failed duplicate check"));
    // Sub-second clock skew still counts as the same frame.
    assert!(db
        .is_duplicate_image(
            camera.id,
            "E1000159.JPG",
            captured_at + Duration::milliseconds(800)
        )
        .await
        .expect("Failed duplicate check"));
    // A different filename is a different image.
    assert!(!db
        .is_duplicate_image(camera.id, "E1000160.JPG", captured_at)
        .await
        .expect("Failed duplicate check"));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_image_status_advances() {
    let db = database().await;
    let camera = db
        .get_or_create_camera("status-cam", Some(&unique_serial()), None, None, "Willfine-2025")
        .await
        .expect("Failed to create camera");

    let uuid = Uuid::new_v4();
    db.create_image(&NewImage {
        uuid,
        filename: "a.jpg".to_string(),
        camera_id: camera.id,
        captured_at: Utc::now(),
        storage_path: "p".to_string(),
        thumbnail_path: None,
        metadata: ImageMetadata::default(),
    })
    .await
    .expect("Failed to insert image");

    for status in [
        ImageStatus::Processing,
        ImageStatus::Detected,
        ImageStatus::Classifying,
        ImageStatus::Classified,
    ] {
        db.update_image_status(uuid, status)
            .await
            .expect("Failed to update status");
        let image = db.get_image_by_uuid(uuid).await.expect("Failed to fetch");
        assert_eq!(image.status, status);
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_deployment_rollover_on_relocation() {
    let db = database().await;
    let camera = db
        .get_or_create_camera("deploy-cam", Some(&unique_serial()), None, None, "Willfine-2025")
        .await
        .expect("Failed to create camera");

    let d1 = chrono::NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
    let d6 = chrono::NaiveDate::from_ymd_opt(2025, 12, 6).unwrap();

    let first = db
        .record_gps_fix(camera.id, d1, GeoPoint::new(52.100, 5.100))
        .await
        .expect("Failed first fix");
    assert_eq!(first.deployment_number, 1);

    // ~20 m of jitter stays in the same deployment.
    let same = db
        .record_gps_fix(camera.id, d1, GeoPoint::new(52.10018, 5.100))
        .await
        .expect("Failed second fix");
    assert_eq!(same.id, first.id);

    // ~720 m is a relocation.
    let moved = db
        .record_gps_fix(camera.id, d6, GeoPoint::new(52.102, 5.110))
        .await
        .expect("Failed third fix");
    assert_eq!(moved.deployment_number, 2);

    let periods = db.list_deployments(camera.id).await.expect("Failed to list");
    assert_eq!(periods.len(), 2);
    assert!(periods[0].end_date.is_some());
    assert!(periods[1].end_date.is_none());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_invitation_registration_flow() {
    let db = database().await;
    let project = db
        .create_project(&format!("inv-{}", Uuid::new_v4()), None)
        .await
        .expect("Failed to create project");

    let email = format!("{}@example.org", Uuid::new_v4().simple());
    let invitation = db
        .create_invitation(&email, Role::ProjectViewer, Some(project.id))
        .await
        .expect("Failed to create invitation");

    let user = db
        .register_with_invitation(&invitation.token, &email, "hunter2hunter2")
        .await
        .expect("Failed to register");
    assert!(user.is_verified);
    assert_eq!(
        db.get_membership_role(user.id, project.id)
            .await
            .expect("Failed role lookup"),
        Some(Role::ProjectViewer)
    );

    // The token is consumed: a second registration must fail.
    let again = db
        .register_with_invitation(&invitation.token, &email, "hunter2hunter2")
        .await;
    assert!(again.is_err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL (run with --ignored)"]
async fn test_wrong_email_rejects_invitation_without_burning_it() {
    let db = database().await;
    let email = format!("{}@example.org", Uuid::new_v4().simple());
    let invitation = db
        .create_invitation(&email, Role::ProjectAdmin, None)
        .await
        .expect("Failed to create invitation");

    let result = db
        .register_with_invitation(&invitation.token, "someone-else@example.org", "hunter2hunter2")
        .await;
    assert!(result.is_err());

    // The mismatched attempt must not consume the token: the invited
    // address can still register with it.
    let user = db
        .register_with_invitation(&invitation.token, &email, "hunter2hunter2")
        .await
        .expect("Invitation should still be redeemable by the invited email");
    assert!(user.is_verified);
}
