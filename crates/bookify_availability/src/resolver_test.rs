#[cfg(test)]
mod tests {
    use bookify_common::models::{
        AvailabilityTemplate, Booking, BookingStatus, CalendarConnection, CalendarSettings,
        LocationSchedule, Platform, Provider, ProviderLocation, TimeSlot,
    };
    use bookify_config::AppConfig;
    use bookify_db::repositories::booking::tx::{self, CustomerInput};
    use bookify_db::repositories::{
        BookingRepository, CalendarEventRepository, ConnectionRepository, EventUpsert,
        ProviderRepository, TemplateRepository,
    };
    use bookify_db::{DbClient, Repositories};
    use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
    use uuid::Uuid;

    use crate::error::AvailabilityError;
    use crate::resolver::AvailabilityResolver;

    // Monday; Zurich is UTC+1 in January
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 22).unwrap()
    }

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    /// Sunday noon before the Monday under test.
    fn now() -> DateTime<Utc> {
        utc(21, 12, 0)
    }

    fn hhmm(value: &str) -> NaiveTime {
        NaiveTime::parse_from_str(value, "%H:%M").unwrap()
    }

    struct Setup {
        db: DbClient,
        repos: Repositories,
        provider: Provider,
        resolver: AvailabilityResolver,
    }

    async fn setup_with(configure: impl FnOnce(&mut Provider)) -> Setup {
        let db = DbClient::in_memory().await.expect("in-memory db");
        let repos = Repositories::new(&db);

        let mut provider = Provider::new("Praxis Brunner", "Europe/Zurich");
        configure(&mut provider);
        let provider = repos.providers.create_provider(provider).await.unwrap();

        let template = repos
            .templates
            .create_template(AvailabilityTemplate::new(
                provider.id,
                "Weekdays",
                (1..=5).map(|dow| TimeSlot::new(dow, "08:00", "18:00")).collect(),
            ))
            .await
            .unwrap();
        repos
            .templates
            .set_default_template(provider.id, template.id)
            .await
            .unwrap();

        let resolver = AvailabilityResolver::new(repos.clone(), &AppConfig::default());
        Setup {
            db,
            repos,
            provider,
            resolver,
        }
    }

    async fn setup() -> Setup {
        setup_with(|_| {}).await
    }

    async fn connect(setup: &Setup, calendars: Vec<CalendarSettings>) -> CalendarConnection {
        let mut connection = CalendarConnection::new(setup.provider.id, Platform::Google, "token");
        connection.calendars = calendars;
        setup
            .repos
            .connections
            .insert_connection(connection)
            .await
            .unwrap()
    }

    async fn cache_event(
        setup: &Setup,
        connection: &CalendarConnection,
        calendar_id: &str,
        start: DateTime<Utc>,
        minutes: i64,
    ) -> Uuid {
        let remote_id = format!("evt-{}", start.timestamp());
        setup
            .repos
            .events
            .upsert_events(
                setup.provider.id,
                connection.id,
                calendar_id,
                &[EventUpsert {
                    remote_event_id: remote_id.clone(),
                    title: Some("Busy".to_string()),
                    location: None,
                    start_time: start,
                    end_time: start + Duration::minutes(minutes),
                    is_all_day: false,
                }],
                Utc::now(),
            )
            .await
            .unwrap();
        setup
            .repos
            .events
            .find_for_provider_in_range(setup.provider.id, start, start + Duration::minutes(1))
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.remote_event_id == remote_id)
            .map(|e| e.id)
            .expect("cached event")
    }

    async fn book(setup: &Setup, event_id: Option<Uuid>, start: DateTime<Utc>, minutes: i64) {
        let mut conn = setup.db.begin().await.unwrap();
        let customer = tx::upsert_customer(
            &mut conn,
            CustomerInput {
                email: "lea@example.com",
                name: Some("Lea"),
                phone: None,
            },
        )
        .await
        .unwrap();
        let booking = Booking {
            id: Uuid::new_v4(),
            provider_id: setup.provider.id,
            customer_id: customer.id,
            calendar_event_id: event_id,
            start_time: start,
            duration_minutes: minutes,
            status: BookingStatus::Confirmed,
            service_type: None,
            notes: None,
            rescheduled_from: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        tx::insert_booking(&mut conn, &booking).await.unwrap();
        conn.commit().await.unwrap();
    }

    async fn starts(
        setup: &Setup,
        date: NaiveDate,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        setup
            .resolver
            .get_available_slots_at(setup.provider.id, date, minutes, None, now)
            .await
            .unwrap()
            .into_iter()
            .map(|slot| slot.start_time)
            .collect()
    }

    #[tokio::test]
    async fn busy_event_splits_the_day() {
        let setup = setup().await;
        let connection = connect(&setup, vec![CalendarSettings::new("primary")]).await;
        // 10:00-11:00 local
        cache_event(&setup, &connection, "primary", utc(22, 9, 0), 60).await;

        let slots = starts(&setup, monday(), 60, now()).await;

        assert_eq!(slots.first().map(String::as_str), Some("08:00"));
        assert!(slots.contains(&"09:00".to_string()));
        assert!(!slots.contains(&"09:30".to_string()));
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(slots.contains(&"11:00".to_string()));
        assert_eq!(slots.last().map(String::as_str), Some("17:00"));
        // 08:00..=09:00 and 11:00..=17:00 on a 15 minute grid
        assert_eq!(slots.len(), 5 + 25);
    }

    #[tokio::test]
    async fn slots_carry_utc_instants_and_weekday() {
        let setup = setup().await;
        let slots = setup
            .resolver
            .get_available_slots_at(setup.provider.id, monday(), 30, None, now())
            .await
            .unwrap();

        let first = &slots[0];
        assert_eq!(first.starts_at, utc(22, 7, 0));
        assert_eq!(first.ends_at, utc(22, 7, 30));
        assert_eq!(first.day_of_week, 1);
    }

    #[tokio::test]
    async fn nothing_before_now_on_the_same_day() {
        let setup = setup().await;
        // 09:10 local
        let now = utc(22, 8, 10);

        let slots = setup
            .resolver
            .get_available_slots_at(setup.provider.id, monday(), 60, None, now)
            .await
            .unwrap();

        assert_eq!(slots.first().map(|s| s.start_time.as_str()), Some("09:15"));
        assert!(slots.iter().all(|s| s.starts_at >= now));
    }

    #[tokio::test]
    async fn past_and_far_future_dates_are_empty() {
        let setup = setup().await;
        let friday_before = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        // default horizon is 90 days
        let beyond_horizon = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();

        assert!(starts(&setup, friday_before, 60, now()).await.is_empty());
        assert!(starts(&setup, beyond_horizon, 60, now()).await.is_empty());
    }

    #[tokio::test]
    async fn weekend_without_template_hours_is_closed() {
        let setup = setup().await;
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 27).unwrap();
        assert!(starts(&setup, saturday, 30, now()).await.is_empty());
    }

    #[tokio::test]
    async fn appointment_event_blocks_only_when_full() {
        let setup = setup().await;
        let connection = connect(&setup, vec![CalendarSettings::new("primary")]).await;
        let event_id = cache_event(&setup, &connection, "primary", utc(22, 9, 0), 60).await;
        setup
            .repos
            .events
            .set_booking_policy(setup.provider.id, event_id, true, 2)
            .await
            .unwrap();

        book(&setup, Some(event_id), utc(22, 9, 0), 60).await;
        let slots = starts(&setup, monday(), 60, now()).await;
        assert!(slots.contains(&"10:00".to_string()), "one of two seats left");

        book(&setup, Some(event_id), utc(22, 9, 0), 60).await;
        let slots = starts(&setup, monday(), 60, now()).await;
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(!slots.contains(&"09:30".to_string()));
    }

    #[tokio::test]
    async fn calendars_not_used_for_bookings_are_ignored() {
        let setup = setup().await;
        let mut holidays = CalendarSettings::new("holidays");
        holidays.booking_enabled = false;
        let connection = connect(&setup, vec![CalendarSettings::new("primary"), holidays]).await;
        cache_event(&setup, &connection, "holidays", utc(22, 9, 0), 60).await;

        let slots = starts(&setup, monday(), 60, now()).await;
        assert!(slots.contains(&"10:00".to_string()));
    }

    #[tokio::test]
    async fn unlinked_bookings_are_widened_by_the_buffer() {
        let setup = setup_with(|p| p.buffer_minutes = 15).await;
        // 12:00-13:00 local
        book(&setup, None, utc(22, 11, 0), 60).await;

        let slots = starts(&setup, monday(), 60, now()).await;
        assert!(slots.contains(&"10:45".to_string()));
        assert!(!slots.contains(&"11:00".to_string()));
        assert!(!slots.contains(&"13:00".to_string()));
        assert!(slots.contains(&"13:15".to_string()));
    }

    #[tokio::test]
    async fn cancelled_bookings_do_not_block() {
        let setup = setup().await;
        book(&setup, None, utc(22, 11, 0), 60).await;
        let booked = setup
            .repos
            .bookings
            .find_active_in_range(setup.provider.id, utc(22, 0, 0), utc(23, 0, 0))
            .await
            .unwrap();
        let mut conn = setup.db.begin().await.unwrap();
        tx::update_status(&mut conn, setup.provider.id, booked[0].id, BookingStatus::Cancelled)
            .await
            .unwrap();
        conn.commit().await.unwrap();

        let slots = starts(&setup, monday(), 60, now()).await;
        assert!(slots.contains(&"12:00".to_string()));
    }

    #[tokio::test]
    async fn location_hours_narrow_the_template() {
        let setup = setup().await;
        let location = setup
            .repos
            .providers
            .create_location(ProviderLocation {
                id: Uuid::new_v4(),
                provider_id: setup.provider.id,
                name: "Filiale Bern".to_string(),
                address: None,
            })
            .await
            .unwrap();
        setup
            .repos
            .providers
            .add_location_schedule(LocationSchedule {
                id: Uuid::new_v4(),
                location_id: location.id,
                day_of_week: Some(1),
                specific_date: None,
                start_time: "10:00".to_string(),
                end_time: "14:00".to_string(),
                enabled: true,
            })
            .await
            .unwrap();

        let slots: Vec<String> = setup
            .resolver
            .get_available_slots_at(setup.provider.id, monday(), 60, Some(location.id), now())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.start_time)
            .collect();

        assert_eq!(slots.first().map(String::as_str), Some("10:00"));
        assert_eq!(slots.last().map(String::as_str), Some("13:00"));
        assert_eq!(slots.len(), 13);
    }

    #[tokio::test]
    async fn is_available_matches_free_time() {
        let setup = setup().await;
        let connection = connect(&setup, vec![CalendarSettings::new("primary")]).await;
        cache_event(&setup, &connection, "primary", utc(22, 9, 0), 60).await;
        let check = |start: &'static str, now: DateTime<Utc>| {
            let resolver = setup.resolver.clone();
            let provider_id = setup.provider.id;
            async move {
                resolver
                    .is_available_at(provider_id, monday(), hhmm(start), 60, None, now)
                    .await
                    .unwrap()
            }
        };

        assert!(check("08:00", now()).await);
        assert!(!check("09:30", now()).await);
        assert!(check("11:00", now()).await);
        // would run past closing
        assert!(!check("17:30", now()).await);
        // off-grid starts are fine as long as they fit
        assert!(check("08:07", now()).await);
        // already started
        assert!(!check("08:00", utc(22, 7, 30)).await);
    }

    #[tokio::test]
    async fn evening_hours_may_run_until_midnight() {
        let setup = setup().await;
        let evenings = setup
            .repos
            .templates
            .create_template(AvailabilityTemplate::new(
                setup.provider.id,
                "Saturday evenings",
                vec![TimeSlot::new(6, "18:00", "24:00")],
            ))
            .await
            .unwrap();
        setup
            .repos
            .templates
            .set_default_template(setup.provider.id, evenings.id)
            .await
            .unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 27).unwrap();

        let slots = setup
            .resolver
            .get_available_slots_at(setup.provider.id, saturday, 60, None, now())
            .await
            .unwrap();

        assert_eq!(slots.first().map(|s| s.start_time.as_str()), Some("18:00"));
        let last = slots.last().unwrap();
        assert_eq!(last.start_time, "23:00");
        assert_eq!(last.ends_at, utc(27, 23, 0));
        // 18:00..=23:00 on a 15 minute grid
        assert_eq!(slots.len(), 21);

        let resolver = &setup.resolver;
        let id = setup.provider.id;
        assert!(resolver
            .is_available_at(id, saturday, hhmm("23:00"), 60, None, now())
            .await
            .unwrap());
        assert!(!resolver
            .is_available_at(id, saturday, hhmm("23:15"), 60, None, now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn invalid_duration_and_unknown_provider() {
        let setup = setup().await;

        let zero = setup
            .resolver
            .get_available_slots_at(setup.provider.id, monday(), 0, None, now())
            .await;
        assert!(matches!(zero, Err(AvailabilityError::InvalidInput(_))));

        let unknown = setup
            .resolver
            .get_available_slots_at(Uuid::new_v4(), monday(), 60, None, now())
            .await;
        assert!(matches!(unknown, Err(AvailabilityError::ProviderNotFound(_))));
    }
}
