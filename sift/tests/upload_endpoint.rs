use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use flate2::read::GzDecoder;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use sift::config::Config;
use sift::server::serve;
use zip::ZipArchive;

const SAMPLE: &str = "gender,name\nmale,Alice\nfemale,Bob\nmale,Carl\n";

async fn start_server() -> SocketAddr {
    let config = Config {
        address: "127.0.0.1:0".parse().unwrap(),
        estimated_line_bytes: 64,
        progress_buffer: 128,
        line_buffer: 64,
    };

    let listener = tokio::net::TcpListener::bind(config.address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(config, listener, std::future::pending()));
    addr
}

fn csv_form(content: &str) -> Form {
    let part = Part::bytes(content.as_bytes().to_vec())
        .file_name("people.csv")
        .mime_str("text/csv")
        .unwrap();
    Form::new().part("file", part)
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let entry = archive.by_name(name).expect("archive entry present");
    let mut decoded = String::new();
    GzDecoder::new(entry)
        .read_to_string(&mut decoded)
        .expect("valid gzip stream");
    decoded
}

#[tokio::test]
async fn upload_round_trips_to_a_two_entry_archive() -> Result<()> {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/upload"))
        .multipart(csv_form(SAMPLE))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/zip")
    );

    let body = response.bytes().await?.to_vec();
    let mut archive = ZipArchive::new(Cursor::new(body))?;
    assert_eq!(archive.len(), 2);
    assert_eq!(
        read_entry(&mut archive, "male.csv.gz"),
        "gender,name\nmale,Alice\nmale,Carl\n"
    );
    assert_eq!(
        read_entry(&mut archive, "female.csv.gz"),
        "gender,name\nfemale,Bob\n"
    );
    Ok(())
}

#[tokio::test]
async fn missing_designated_column_is_a_bad_request() -> Result<()> {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/upload"))
        .multipart(csv_form("sex,name\nmale,Alice\n"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await?.contains("gender"));
    Ok(())
}

#[tokio::test]
async fn request_without_file_field_is_a_bad_request() -> Result<()> {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/upload"))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn progress_subscriber_sees_all_stages_complete() -> Result<()> {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    // Attach before the upload starts; only events broadcast after
    // attachment are guaranteed to arrive.
    let mut events = client
        .get(format!("http://{addr}/progress"))
        .send()
        .await?;
    assert_eq!(events.status(), StatusCode::OK);

    let response = client
        .post(format!("http://{addr}/upload"))
        .multipart(csv_form(SAMPLE))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let mut seen = String::new();
    let complete = |seen: &str| {
        ["upload", "parsing", "gzipMale", "gzipFemale"].iter().all(|stage| {
            seen.contains(&format!(r#"{{"stage":"{stage}","percent":100.0}}"#))
        })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !complete(&seen) {
        let chunk = tokio::time::timeout_at(deadline, events.chunk())
            .await
            .expect("timed out waiting for progress events")?
            .expect("progress stream ended early");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    Ok(())
}
