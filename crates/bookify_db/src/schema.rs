//! Table definitions. Every provider-owned table cascades from `providers`.
//!
//! Timestamps are RFC 3339 text in UTC, dates are `YYYY-MM-DD`, ids are UUID blobs.

pub(crate) const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS providers (
        id BLOB PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        time_zone TEXT NOT NULL,
        default_duration_minutes INTEGER NOT NULL,
        buffer_minutes INTEGER NOT NULL DEFAULT 0,
        advance_booking_days INTEGER NOT NULL,
        allowed_durations TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS calendar_connections (
        id BLOB PRIMARY KEY NOT NULL,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        platform TEXT NOT NULL,
        account_email TEXT,
        access_token TEXT NOT NULL,
        refresh_token TEXT,
        token_expires_at TEXT,
        calendars TEXT NOT NULL DEFAULT '[]',
        is_active INTEGER NOT NULL DEFAULT 1,
        reauth_required INTEGER NOT NULL DEFAULT 0,
        is_default_for_bookings INTEGER NOT NULL DEFAULT 0,
        last_sync_at TEXT,
        sync_frequency_minutes INTEGER NOT NULL DEFAULT 15,
        webhook_subscription_id TEXT,
        webhook_expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_one_default
        ON calendar_connections(provider_id) WHERE is_default_for_bookings = 1
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS calendar_events (
        id BLOB PRIMARY KEY NOT NULL,
        connection_id BLOB NOT NULL REFERENCES calendar_connections(id) ON DELETE CASCADE,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        remote_calendar_id TEXT NOT NULL,
        remote_event_id TEXT NOT NULL,
        title TEXT,
        location TEXT,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        is_all_day INTEGER NOT NULL DEFAULT 0,
        allow_bookings INTEGER NOT NULL DEFAULT 0,
        max_bookings INTEGER NOT NULL DEFAULT 1,
        synced_at TEXT NOT NULL,
        UNIQUE(connection_id, remote_event_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_provider_time
        ON calendar_events(provider_id, start_time, end_time)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS availability_templates (
        id BLOB PRIMARY KEY NOT NULL,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_templates_one_default
        ON availability_templates(provider_id) WHERE is_default = 1
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS template_slots (
        template_id BLOB NOT NULL REFERENCES availability_templates(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        day_of_week INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (template_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS template_assignments (
        id BLOB PRIMARY KEY NOT NULL,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        template_id BLOB NOT NULL REFERENCES availability_templates(id) ON DELETE CASCADE,
        start_date TEXT NOT NULL,
        end_date TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id BLOB PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        phone TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id BLOB PRIMARY KEY NOT NULL,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        customer_id BLOB NOT NULL REFERENCES customers(id),
        calendar_event_id BLOB REFERENCES calendar_events(id) ON DELETE SET NULL,
        start_time TEXT NOT NULL,
        duration_minutes INTEGER NOT NULL,
        status TEXT NOT NULL,
        service_type TEXT,
        notes TEXT,
        rescheduled_from BLOB,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bookings_event ON bookings(calendar_event_id, status)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bookings_provider_time ON bookings(provider_id, start_time)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_locations (
        id BLOB PRIMARY KEY NOT NULL,
        provider_id BLOB NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        address TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS location_schedules (
        id BLOB PRIMARY KEY NOT NULL,
        location_id BLOB NOT NULL REFERENCES provider_locations(id) ON DELETE CASCADE,
        day_of_week INTEGER,
        specific_date TEXT,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1
    )
    "#,
];
