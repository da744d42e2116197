use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use selene::config::InfluxConfig;
use selene::influx::{InfluxWriter, line};
use selene::pipe::{Deduplicator, Limiter, Sample, pipe};
use selene::shutdown::ShutdownSignal;
use std::time::Duration;
use tokio::sync::mpsc;

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn filters_thin_out_a_noisy_stream() {
    let shutdown = ShutdownSignal::new();
    let (tx, rx) = mpsc::channel(64);
    let rx = pipe(
        Deduplicator::new(Duration::from_secs(30 * 60), &["socCharge"]),
        rx,
        shutdown.clone(),
    );
    let mut rx = pipe(Limiter::new(Duration::from_secs(5)), rx, shutdown.clone());

    // One sample per second for a minute, SoC never changes
    for s in 0..60 {
        tx.send(Sample::at(Some(0), "chargePower", 11000.0, at(s)))
            .await
            .unwrap();
        tx.send(Sample::at(Some(0), "socCharge", 50.0, at(s)))
            .await
            .unwrap();
    }
    drop(tx);

    let mut power = 0;
    let mut soc = 0;
    while let Some(sample) = rx.recv().await {
        match sample.key.as_str() {
            "chargePower" => power += 1,
            "socCharge" => soc += 1,
            other => panic!("unexpected key {}", other),
        }
    }
    assert_eq!(power, 12);
    assert_eq!(soc, 1);
}

#[test]
fn line_protocol_escapes_tags() {
    let sample = Sample::at(Some(0), "chargePower", 7400.5, at(0));
    assert_eq!(
        line(&sample, Some("Garage, left")),
        "chargePower,loadpoint=Garage\\,\\ left value=7400.5 1700000000"
    );
    assert_eq!(
        line(&Sample::at(None, "gridPower", -120.0, at(0)), None),
        "gridPower value=-120 1700000000"
    );
}

#[tokio::test]
async fn v1_writer_authenticates_with_query_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/write")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("db".into(), "selene".into()),
            Matcher::UrlEncoded("precision".into(), "s".into()),
            Matcher::UrlEncoded("u".into(), "admin".into()),
            Matcher::UrlEncoded("p".into(), "pw".into()),
        ]))
        .match_body("pvPower value=3000 1700000000")
        .with_status(204)
        .create_async()
        .await;

    let writer = InfluxWriter::new(&InfluxConfig {
        url: format!("{}/", server.url()),
        database: "selene".to_string(),
        user: "admin".to_string(),
        password: "pw".to_string(),
        ..Default::default()
    })
    .unwrap();

    let shutdown = ShutdownSignal::new();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(writer.run(vec![], rx, shutdown));
    tx.send(Sample::at(None, "pvPower", 3000.0, at(0))).await.unwrap();
    drop(tx);
    task.await.unwrap();

    mock.assert_async().await;
}
