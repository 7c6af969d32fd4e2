//! Schema DDL, applied idempotently at worker startup
//!
//! Locations are stored as paired `DOUBLE PRECISION` lat/lon columns and the
//! project boundary as a GeoJSON JSONB polygon; all distance math in the core
//! is haversine in Rust. Capture time lives in `captured_at` (UTC) and is the
//! timestamp statistics read; `uploaded_at` is ingestion time.

/// Complete DDL. Every statement is `IF NOT EXISTS` so any worker can run it.
pub const DDL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id               SERIAL PRIMARY KEY,
    email            VARCHAR(255) NOT NULL UNIQUE,
    hashed_password  VARCHAR(255) NOT NULL,
    is_active        BOOLEAN NOT NULL DEFAULT TRUE,
    is_verified      BOOLEAN NOT NULL DEFAULT FALSE,
    is_server_admin  BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS projects (
    id                             SERIAL PRIMARY KEY,
    name                           VARCHAR(255) NOT NULL,
    description                    TEXT,
    boundary                       JSONB,
    included_species               JSONB,
    detection_threshold            DOUBLE PRECISION NOT NULL DEFAULT 0.5,
    blur_people_vehicles           BOOLEAN NOT NULL DEFAULT FALSE,
    independence_interval_minutes  INTEGER NOT NULL DEFAULT 30,
    created_at                     TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at                     TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS project_memberships (
    id          SERIAL PRIMARY KEY,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    role        VARCHAR(50) NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_user_project UNIQUE (user_id, project_id)
);
CREATE INDEX IF NOT EXISTS ix_project_memberships_user_id ON project_memberships (user_id);
CREATE INDEX IF NOT EXISTS ix_project_memberships_project_id ON project_memberships (project_id);

CREATE TABLE IF NOT EXISTS user_invitations (
    id          SERIAL PRIMARY KEY,
    email       VARCHAR(255) NOT NULL,
    role        VARCHAR(50) NOT NULL,
    project_id  INTEGER REFERENCES projects(id) ON DELETE CASCADE,
    token       VARCHAR(64) NOT NULL UNIQUE,
    expires_at  TIMESTAMPTZ NOT NULL,
    used        BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_user_invitations_token ON user_invitations (token);

CREATE TABLE IF NOT EXISTS cameras (
    id                   SERIAL PRIMARY KEY,
    name                 VARCHAR(255) NOT NULL,
    serial_number        VARCHAR(50) UNIQUE,
    imei                 VARCHAR(50) UNIQUE,
    manufacturer         VARCHAR(100),
    model                VARCHAR(100),
    project_id           INTEGER REFERENCES projects(id),
    status               VARCHAR(50) NOT NULL DEFAULT 'inventory',
    latitude             DOUBLE PRECISION,
    longitude            DOUBLE PRECISION,
    battery_percent      INTEGER,
    sd_used_mb           INTEGER,
    sd_total_mb          INTEGER,
    temperature_c        INTEGER,
    signal_quality       INTEGER,
    last_seen            TIMESTAMPTZ,
    last_daily_report_at TIMESTAMPTZ,
    last_image_at        TIMESTAMPTZ,
    config               JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_cameras_serial_number ON cameras (serial_number);
CREATE INDEX IF NOT EXISTS ix_cameras_project_id ON cameras (project_id);
CREATE INDEX IF NOT EXISTS ix_cameras_status ON cameras (status);

CREATE TABLE IF NOT EXISTS camera_deployment_periods (
    id                 SERIAL PRIMARY KEY,
    camera_id          INTEGER NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    deployment_number  INTEGER NOT NULL,
    latitude           DOUBLE PRECISION NOT NULL,
    longitude          DOUBLE PRECISION NOT NULL,
    start_date         DATE NOT NULL,
    end_date           DATE,
    CONSTRAINT uq_camera_deployment UNIQUE (camera_id, deployment_number)
);
CREATE INDEX IF NOT EXISTS ix_deployment_periods_camera_id ON camera_deployment_periods (camera_id);

CREATE TABLE IF NOT EXISTS images (
    id              SERIAL PRIMARY KEY,
    uuid            UUID NOT NULL UNIQUE,
    filename        VARCHAR(255) NOT NULL,
    camera_id       INTEGER NOT NULL REFERENCES cameras(id),
    captured_at     TIMESTAMPTZ NOT NULL,
    uploaded_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    storage_path    VARCHAR(512) NOT NULL,
    thumbnail_path  VARCHAR(512),
    status          VARCHAR(50) NOT NULL DEFAULT 'pending',
    image_metadata  JSONB NOT NULL DEFAULT '{}'::jsonb,
    is_verified     BOOLEAN NOT NULL DEFAULT FALSE,
    CONSTRAINT uq_image_identity UNIQUE (camera_id, filename, captured_at)
);
CREATE INDEX IF NOT EXISTS ix_images_uuid ON images (uuid);
CREATE INDEX IF NOT EXISTS ix_images_camera_id ON images (camera_id);
CREATE INDEX IF NOT EXISTS ix_images_captured_at ON images (captured_at);
CREATE INDEX IF NOT EXISTS ix_images_status ON images (status);

CREATE TABLE IF NOT EXISTS detections (
    id          SERIAL PRIMARY KEY,
    image_id    INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    category    VARCHAR(50) NOT NULL,
    bbox        JSONB NOT NULL,
    confidence  DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_detections_image_id ON detections (image_id);
CREATE INDEX IF NOT EXISTS ix_detections_category ON detections (category);

CREATE TABLE IF NOT EXISTS classifications (
    id               SERIAL PRIMARY KEY,
    detection_id     INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    species          VARCHAR(255) NOT NULL,
    confidence       DOUBLE PRECISION NOT NULL,
    raw_predictions  JSONB,
    model_version    VARCHAR(100)
);
CREATE INDEX IF NOT EXISTS ix_classifications_detection_id ON classifications (detection_id);
CREATE INDEX IF NOT EXISTS ix_classifications_species ON classifications (species);

CREATE TABLE IF NOT EXISTS human_observations (
    id         SERIAL PRIMARY KEY,
    image_id   INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    species    VARCHAR(255) NOT NULL,
    count      INTEGER NOT NULL CHECK (count >= 1)
);
CREATE INDEX IF NOT EXISTS ix_human_observations_image_id ON human_observations (image_id);

CREATE TABLE IF NOT EXISTS project_notification_preferences (
    id                SERIAL PRIMARY KEY,
    user_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    project_id        INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    enabled           BOOLEAN NOT NULL DEFAULT FALSE,
    telegram_chat_id  VARCHAR(50),
    signal_phone      VARCHAR(50),
    notification_channels JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at        TIMESTAMPTZ,
    CONSTRAINT uq_user_project_notification UNIQUE (user_id, project_id)
);
CREATE INDEX IF NOT EXISTS ix_notification_preferences_project_id
    ON project_notification_preferences (project_id);

CREATE TABLE IF NOT EXISTS notification_logs (
    id                 SERIAL PRIMARY KEY,
    user_id            INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    notification_type  VARCHAR(50) NOT NULL,
    channel            VARCHAR(50) NOT NULL,
    status             VARCHAR(50) NOT NULL,
    trigger_data       JSONB NOT NULL,
    message_content    TEXT NOT NULL,
    error_message      TEXT,
    sent_at            TIMESTAMPTZ,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_notification_logs_user_id ON notification_logs (user_id);
CREATE INDEX IF NOT EXISTS ix_notification_logs_status ON notification_logs (status);

CREATE TABLE IF NOT EXISTS telegram_config (
    id            SERIAL PRIMARY KEY,
    bot_token     VARCHAR(100),
    bot_username  VARCHAR(100),
    is_configured BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS telegram_linking_tokens (
    id          SERIAL PRIMARY KEY,
    token       VARCHAR(64) NOT NULL UNIQUE,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    expires_at  TIMESTAMPTZ NOT NULL,
    used        BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS ix_telegram_linking_tokens_token ON telegram_linking_tokens (token);

CREATE TABLE IF NOT EXISTS signal_config (
    id            SERIAL PRIMARY KEY,
    phone_number  VARCHAR(50),
    is_registered BOOLEAN NOT NULL DEFAULT FALSE
);
";
