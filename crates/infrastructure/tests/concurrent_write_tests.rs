use geofence_core::config::DatabaseConfig;
use geofence_domain::{
    Coordinates, EventQueue, GeofenceRegion, RegistrationStore, RetryPolicy, TransitionEvent,
    TransitionType,
};
use geofence_infrastructure::DatabaseManager;

#[tokio::test]
async fn test_register_succeeds_while_queue_is_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("geofence.db").display()),
        ..DatabaseConfig::default()
    };
    let db = DatabaseManager::new(&config).await.unwrap();
    db.migrate().await.unwrap();

    let queue = db.event_queue(RetryPolicy::default(), None);
    let writer = tokio::spawn(async move {
        for i in 0..1_000i64 {
            let event = TransitionEvent::new("busy", TransitionType::Enter, i * 60_000, 60_000);
            queue.enqueue(&event, "H1").await.unwrap();
        }
    });

    let store = db.registration_store();
    let mut failures = Vec::new();
    for round in 0..10 {
        for region in 0..20 {
            let region = GeofenceRegion::new(
                format!("region-{region}"),
                Coordinates::new(48.85, 2.35).unwrap(),
                100.0 + f64::from(round),
                [TransitionType::Enter, TransitionType::Exit],
            )
            .unwrap();
            let handler = format!("H{}", round % 2);
            if let Err(e) = store.register(&region, &handler).await {
                failures.push(e);
            }
        }
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    assert!(failures.is_empty(), "register failed under contention: {:?}", failures.first());

    let registrations = store.list().await.unwrap();
    assert_eq!(registrations.len(), 20);
    assert!(registrations.iter().all(|r| r.handler_id == "H1"));
    assert!(registrations.iter().all(|r| r.region.radius_meters == 109.0));
    db.close().await;
}
