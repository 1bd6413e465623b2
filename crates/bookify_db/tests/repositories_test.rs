use bookify_common::models::{
    AvailabilityTemplate, Booking, BookingStatus, CalendarConnection, CalendarSettings,
    LocationSchedule, Platform, Provider, ProviderLocation, TemplateAssignment, TimeSlot,
};
use bookify_db::repositories::booking::tx::{self, CustomerInput};
use bookify_db::repositories::{
    BookingRepository, CalendarEventRepository, ConnectionRepository, EventUpsert,
    ProviderRepository, PruneScope, TemplateRepository, TokenUpdate,
};
use bookify_db::{DbClient, DbError, Repositories};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;
use uuid::Uuid;

async fn setup() -> (DbClient, Repositories, Provider) {
    let db = DbClient::in_memory().await.expect("in-memory db");
    let repos = Repositories::new(&db);
    let provider = repos
        .providers
        .create_provider(Provider::new("Test Provider", "Europe/Zurich"))
        .await
        .expect("provider");
    (db, repos, provider)
}

async fn connection_for(repos: &Repositories, provider: &Provider) -> CalendarConnection {
    let mut connection = CalendarConnection::new(provider.id, Platform::Google, "access");
    connection.refresh_token = Some("refresh".to_string());
    connection.calendars = vec![CalendarSettings::new("primary")];
    repos
        .connections
        .insert_connection(connection)
        .await
        .expect("connection")
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 22, hour, minute, 0).unwrap()
}

fn event(remote_id: &str, start: DateTime<Utc>, minutes: i64) -> EventUpsert {
    EventUpsert {
        remote_event_id: remote_id.to_string(),
        title: Some(format!("Event {}", remote_id)),
        location: None,
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        is_all_day: false,
    }
}

#[tokio::test]
async fn provider_round_trip_and_tenant_scoping() {
    let (_db, repos, provider) = setup().await;

    let found = repos.providers.find_provider(provider.id).await.unwrap();
    assert_eq!(found.map(|p| p.name), Some("Test Provider".to_string()));

    let location = repos
        .providers
        .create_location(ProviderLocation {
            id: Uuid::new_v4(),
            provider_id: provider.id,
            name: "Main office".to_string(),
            address: None,
        })
        .await
        .unwrap();
    repos
        .providers
        .add_location_schedule(LocationSchedule {
            id: Uuid::new_v4(),
            location_id: location.id,
            day_of_week: Some(1),
            specific_date: None,
            start_time: "09:00".to_string(),
            end_time: "12:00".to_string(),
            enabled: true,
        })
        .await
        .unwrap();

    let own = repos
        .providers
        .find_location_schedules(provider.id, location.id)
        .await
        .unwrap();
    assert_eq!(own.map(|s| s.len()), Some(1));

    let foreign = repos
        .providers
        .find_location_schedules(Uuid::new_v4(), location.id)
        .await
        .unwrap();
    assert!(foreign.is_none());
}

#[tokio::test]
async fn resync_of_unchanged_events_writes_nothing() {
    let (_db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;
    let events = vec![event("a", at(10, 0), 60), event("b", at(14, 0), 30)];
    let synced_at = Utc::now();

    let first = repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &events, synced_at)
        .await
        .unwrap();
    assert_eq!(first, 2);

    let second = repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &events, synced_at + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(second, 0);

    let mut moved = events.clone();
    moved[1].start_time = at(15, 0);
    moved[1].end_time = at(15, 30);
    let third = repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &moved, synced_at)
        .await
        .unwrap();
    assert_eq!(third, 1);
    assert_eq!(repos.events.count_for_connection(connection.id).await.unwrap(), 2);
}

#[tokio::test]
async fn upsert_keeps_provider_booking_policy() {
    let (_db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;
    let events = vec![event("slot", at(10, 0), 60)];

    repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &events, Utc::now())
        .await
        .unwrap();
    let stored = repos
        .events
        .find_for_provider_in_range(provider.id, at(0, 0), at(23, 0))
        .await
        .unwrap();
    assert!(!stored[0].allow_bookings);
    assert_eq!(stored[0].max_bookings, 1);

    assert!(repos
        .events
        .set_booking_policy(provider.id, stored[0].id, true, 3)
        .await
        .unwrap());

    let mut renamed = events.clone();
    renamed[0].title = Some("Renamed".to_string());
    repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &renamed, Utc::now())
        .await
        .unwrap();

    let after = repos
        .events
        .find_event(provider.id, stored[0].id)
        .await
        .unwrap()
        .expect("event kept its id");
    assert_eq!(after.title.as_deref(), Some("Renamed"));
    assert!(after.allow_bookings);
    assert_eq!(after.max_bookings, 3);
}

#[tokio::test]
async fn prune_only_touches_the_synced_window_and_calendar() {
    let (_db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;

    let primary = vec![
        event("kept", at(9, 0), 60),
        event("gone", at(11, 0), 60),
        event("outside", at(9, 0) + Duration::days(40), 60),
    ];
    repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &primary, Utc::now())
        .await
        .unwrap();
    repos
        .events
        .upsert_events(provider.id, connection.id, "work", &[event("other-cal", at(13, 0), 60)], Utc::now())
        .await
        .unwrap();

    let keep: HashSet<String> = ["kept".to_string()].into_iter().collect();
    let removed = repos
        .events
        .prune_missing(
            PruneScope {
                connection_id: connection.id,
                remote_calendar_id: "primary",
                window_start: at(0, 0),
                window_end: at(0, 0) + Duration::days(30),
            },
            &keep,
        )
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(repos.events.count_for_connection(connection.id).await.unwrap(), 3);
}

#[tokio::test]
async fn only_one_default_connection_per_provider() {
    let (_db, repos, provider) = setup().await;
    let first = connection_for(&repos, &provider).await;
    let second = connection_for(&repos, &provider).await;

    assert!(repos
        .connections
        .set_default_for_bookings(provider.id, first.id)
        .await
        .unwrap());
    assert!(repos
        .connections
        .set_default_for_bookings(provider.id, second.id)
        .await
        .unwrap());
    assert!(!repos
        .connections
        .set_default_for_bookings(provider.id, Uuid::new_v4())
        .await
        .unwrap());

    let defaults: Vec<Uuid> = repos
        .connections
        .find_for_provider(provider.id, false)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.is_default_for_bookings)
        .map(|c| c.id)
        .collect();
    assert_eq!(defaults, vec![second.id]);
}

#[tokio::test]
async fn token_update_keeps_refresh_token_when_not_rotated() {
    let (_db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;
    let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

    repos
        .connections
        .update_tokens(
            connection.id,
            TokenUpdate {
                access_token: "fresh".to_string(),
                refresh_token: None,
                expires_at: Some(expires_at),
            },
        )
        .await
        .unwrap();

    let stored = repos
        .connections
        .find_connection(connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(stored.token_expires_at, Some(expires_at));

    repos.connections.mark_reauth_required(connection.id).await.unwrap();
    let active = repos
        .connections
        .find_for_provider(provider.id, true)
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn deleting_a_connection_removes_its_events() {
    let (_db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;
    repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &[event("a", at(10, 0), 60)], Utc::now())
        .await
        .unwrap();

    assert!(!repos
        .connections
        .delete_connection(Uuid::new_v4(), connection.id)
        .await
        .unwrap());
    assert!(repos
        .connections
        .delete_connection(provider.id, connection.id)
        .await
        .unwrap());
    assert_eq!(repos.events.count_for_connection(connection.id).await.unwrap(), 0);
}

#[tokio::test]
async fn later_assignment_is_listed_first() {
    let (_db, repos, provider) = setup().await;
    let winter = repos
        .templates
        .create_template(AvailabilityTemplate::new(
            provider.id,
            "Winter",
            vec![TimeSlot::new(1, "08:00", "12:00")],
        ))
        .await
        .unwrap();
    let holiday = repos
        .templates
        .create_template(AvailabilityTemplate::new(
            provider.id,
            "Holiday",
            vec![TimeSlot::new(1, "10:00", "11:00")],
        ))
        .await
        .unwrap();

    let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
    let mut older = TemplateAssignment::new(provider.id, winter.id, jan(1), Some(jan(31)));
    older.created_at = Utc::now() - Duration::hours(1);
    repos.templates.create_assignment(older).await.unwrap();
    let newer = TemplateAssignment::new(
        provider.id,
        holiday.id,
        jan(15),
        NaiveDate::from_ymd_opt(2024, 2, 15),
    );
    repos.templates.create_assignment(newer).await.unwrap();

    let covering = repos
        .templates
        .find_assignments_covering(provider.id, jan(20))
        .await
        .unwrap();
    assert_eq!(
        covering.iter().map(|a| a.template_id).collect::<Vec<_>>(),
        vec![holiday.id, winter.id]
    );

    let early = repos
        .templates
        .find_assignments_covering(provider.id, jan(5))
        .await
        .unwrap();
    assert_eq!(early.len(), 1);
}

#[tokio::test]
async fn template_slots_keep_their_order_and_reject_bad_input() {
    let (_db, repos, provider) = setup().await;
    let mut template = AvailabilityTemplate::new(
        provider.id,
        "Week",
        vec![TimeSlot::new(1, "14:00", "18:00"), TimeSlot::new(1, "08:00", "12:00")],
    );
    template.is_default = true;
    let template = repos.templates.create_template(template).await.unwrap();

    let default = repos
        .templates
        .find_default_template(provider.id)
        .await
        .unwrap()
        .expect("default template");
    assert_eq!(default.id, template.id);
    assert_eq!(default.slots[0].start_time, "14:00");

    let bad = repos
        .templates
        .replace_slots(provider.id, template.id, vec![TimeSlot::new(1, "18:00", "08:00")])
        .await;
    assert!(matches!(bad, Err(DbError::InvalidData(_))));

    let foreign = AvailabilityTemplate::new(Uuid::new_v4(), "Other", vec![]);
    let assignment = TemplateAssignment::new(
        provider.id,
        foreign.id,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        None,
    );
    assert!(repos.templates.create_assignment(assignment).await.is_err());
}

#[tokio::test]
async fn capacity_checked_insert_stops_at_max_bookings() {
    let (db, repos, provider) = setup().await;
    let connection = connection_for(&repos, &provider).await;
    repos
        .events
        .upsert_events(provider.id, connection.id, "primary", &[event("class", at(10, 0), 60)], Utc::now())
        .await
        .unwrap();
    let class = repos
        .events
        .find_for_provider_in_range(provider.id, at(0, 0), at(23, 0))
        .await
        .unwrap()
        .remove(0);

    let mut conn = db.begin().await.unwrap();
    let customer = tx::upsert_customer(
        &mut conn,
        CustomerInput {
            email: "Ada@Example.com",
            name: Some("Ada"),
            phone: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(customer.email, "ada@example.com");

    let booking = |id| Booking {
        id,
        provider_id: provider.id,
        customer_id: customer.id,
        calendar_event_id: Some(class.id),
        start_time: class.start_time,
        duration_minutes: 60,
        status: BookingStatus::Confirmed,
        service_type: None,
        notes: None,
        rescheduled_from: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let first = booking(Uuid::new_v4());
    assert!(tx::insert_booking_within_capacity(&mut conn, &first, 1).await.unwrap());
    assert!(!tx::insert_booking_within_capacity(&mut conn, &booking(Uuid::new_v4()), 1)
        .await
        .unwrap());
    assert_eq!(tx::count_active_bookings(&mut conn, class.id).await.unwrap(), 1);

    assert!(!tx::update_status(&mut conn, Uuid::new_v4(), first.id, BookingStatus::Cancelled)
        .await
        .unwrap());
    assert!(tx::update_status(&mut conn, provider.id, first.id, BookingStatus::Cancelled)
        .await
        .unwrap());
    assert!(!tx::update_status(&mut conn, provider.id, first.id, BookingStatus::Cancelled)
        .await
        .unwrap());
    assert!(tx::insert_booking_within_capacity(&mut conn, &booking(Uuid::new_v4()), 1)
        .await
        .unwrap());
    conn.commit().await.unwrap();

    let counts = repos.bookings.active_counts_by_event(provider.id).await.unwrap();
    assert_eq!(counts.get(&class.id), Some(&1));
}

#[tokio::test]
async fn unlinked_booking_rejects_overlap() {
    let (db, repos, provider) = setup().await;
    let mut conn = db.begin().await.unwrap();
    let customer = tx::upsert_customer(
        &mut conn,
        CustomerInput {
            email: "bob@example.com",
            name: None,
            phone: Some("+41000000"),
        },
    )
    .await
    .unwrap();

    let booking = |start, minutes| Booking {
        id: Uuid::new_v4(),
        provider_id: provider.id,
        customer_id: customer.id,
        calendar_event_id: None,
        start_time: start,
        duration_minutes: minutes,
        status: BookingStatus::Pending,
        service_type: Some("consultation".to_string()),
        notes: None,
        rescheduled_from: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let first = booking(at(10, 0), 60);
    assert!(tx::insert_booking_if_free(&mut conn, &first, None).await.unwrap());
    assert!(!tx::insert_booking_if_free(&mut conn, &booking(at(10, 30), 30), None)
        .await
        .unwrap());
    assert!(tx::insert_booking_if_free(&mut conn, &booking(at(11, 0), 30), None)
        .await
        .unwrap());
    assert!(tx::insert_booking_if_free(&mut conn, &booking(at(10, 15), 30), Some(first.id))
        .await
        .unwrap());
    conn.commit().await.unwrap();

    let active = repos
        .bookings
        .find_active_in_range(provider.id, at(9, 0), at(12, 0))
        .await
        .unwrap();
    assert_eq!(active.len(), 3);
}

#[tokio::test]
async fn unlinked_booking_keeps_the_provider_buffer() {
    let db = DbClient::in_memory().await.expect("in-memory db");
    let repos = Repositories::new(&db);
    let mut provider = Provider::new("Buffered Provider", "Europe/Zurich");
    provider.buffer_minutes = 30;
    let provider = repos.providers.create_provider(provider).await.unwrap();
    let connection = connection_for(&repos, &provider).await;
    repos
        .events
        .upsert_events(
            provider.id,
            connection.id,
            "primary",
            &[event("class", at(14, 0), 60)],
            Utc::now(),
        )
        .await
        .unwrap();
    let class = repos
        .events
        .find_for_provider_in_range(provider.id, at(0, 0), at(23, 0))
        .await
        .unwrap()
        .remove(0);

    let mut conn = db.begin().await.unwrap();
    let customer = tx::upsert_customer(
        &mut conn,
        CustomerInput {
            email: "eva@example.com",
            name: None,
            phone: None,
        },
    )
    .await
    .unwrap();
    let booking = |calendar_event_id, start, minutes| Booking {
        id: Uuid::new_v4(),
        provider_id: provider.id,
        customer_id: customer.id,
        calendar_event_id,
        start_time: start,
        duration_minutes: minutes,
        status: BookingStatus::Confirmed,
        service_type: None,
        notes: None,
        rescheduled_from: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    assert!(tx::insert_booking_if_free(&mut conn, &booking(None, at(10, 0), 60), None)
        .await
        .unwrap());
    // back to back with 10:00-11:00 leaves no room for the 30 minute buffer
    assert!(!tx::insert_booking_if_free(&mut conn, &booking(None, at(11, 0), 60), None)
        .await
        .unwrap());
    assert!(!tx::insert_booking_if_free(&mut conn, &booking(None, at(9, 0), 45), None)
        .await
        .unwrap());
    assert!(tx::insert_booking_if_free(&mut conn, &booking(None, at(11, 30), 60), None)
        .await
        .unwrap());

    // event bookings are bounded by event capacity, not by the buffer
    tx::insert_booking(&mut conn, &booking(Some(class.id), at(14, 0), 60))
        .await
        .unwrap();
    assert!(tx::insert_booking_if_free(&mut conn, &booking(None, at(15, 0), 30), None)
        .await
        .unwrap());
    conn.commit().await.unwrap();
}
