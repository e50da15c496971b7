mod common;

use common::TestServer;
use reqwest::blocking::{multipart, Client};
use reqwest::StatusCode;
use std::fs;

fn upload(client: &Client, url: &str, name: &str, content: &'static [u8]) -> reqwest::blocking::Response {
    let part = multipart::Part::bytes(content).file_name(name.to_string());
    let form = multipart::Form::new().part("upload", part);
    client.post(url).multipart(form).send().unwrap()
}

#[test]
fn test_browse_download_and_upload() {
    let server = TestServer::new();
    let client = Client::new();

    // Directory listing: directories before files.
    let res = client.get(server.url("/")).send().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let body = res.text().unwrap();
    assert!(body.find(">Sub<").unwrap() < body.find(">a.txt<").unwrap());

    // File download with exact length.
    let res = client.get(server.url("/a.txt")).send().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-length"], "10");
    assert_eq!(res.bytes().unwrap().as_ref(), b"0123456789");

    // Upload shows the refreshed listing.
    let res = upload(&client, &server.url("/"), "b.txt", b"hi");
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().unwrap().contains(">b.txt<"));
    assert_eq!(fs::read_to_string(server.dir.path().join("b.txt")).unwrap(), "hi");

    // Same name again is a conflict and leaves the file alone.
    let res = upload(&client, &server.url("/"), "b.txt", b"changed");
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(res.text().unwrap().contains("/b.txt already exists"));
    assert_eq!(fs::read_to_string(server.dir.path().join("b.txt")).unwrap(), "hi");

    // The uploaded file is downloadable with its content intact.
    let res = client.get(server.url("/b.txt")).send().unwrap();
    assert_eq!(res.text().unwrap(), "hi");
}

#[test]
fn test_not_found_creates_nothing() {
    let server = TestServer::new();
    let client = Client::new();

    let res = client.get(server.url("/missing/file.txt")).send().unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.text().unwrap().contains("/missing/file.txt not found"));
    assert!(!server.dir.path().join("missing").exists());
}

#[test]
fn test_upload_into_percent_encoded_directory() {
    let server = TestServer::new();
    fs::create_dir(server.dir.path().join("My Files")).unwrap();
    let client = Client::new();

    let res = upload(&client, &server.url("/My%20Files/"), "notes & todo.txt", b"x");
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().unwrap();
    assert!(body.contains("<title>/My Files</title>"));
    assert!(body.contains("href=\"/My%20Files/notes%20%26%20todo.txt\""));
    assert!(body.contains(">notes &amp; todo.txt<"));

    let res = client
        .get(server.url("/My%20Files/notes%20%26%20todo.txt"))
        .send()
        .unwrap();
    assert_eq!(res.text().unwrap(), "x");
}

#[test]
fn test_large_file_round_trips() {
    let server = TestServer::new();
    let payload: Vec<u8> = (0..3_000_000u32).map(|i| (i % 253) as u8).collect();
    let client = Client::new();

    let part = multipart::Part::bytes(payload.clone()).file_name("big.bin");
    let res = client
        .post(server.url("/Sub"))
        .multipart(multipart::Form::new().text("note", "first").part("upload", part))
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/Sub/big.bin")).send().unwrap();
    assert_eq!(
        res.headers()["content-length"],
        payload.len().to_string().as_str()
    );
    assert_eq!(res.bytes().unwrap().as_ref(), payload.as_slice());
}

#[test]
fn test_large_conflicting_upload_gets_409() {
    let server = TestServer::new();
    let client = Client::new();
    let content: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let send = |content: Vec<u8>| {
        let part = multipart::Part::bytes(content).file_name("big.bin");
        let form = multipart::Form::new().part("upload", part);
        client.post(server.url("/")).multipart(form).send().unwrap()
    };

    let res = send(content.clone());
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(vec![b'x'; 8 * 1024 * 1024]);
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(res.text().unwrap().contains("/big.bin already exists"));
    assert_eq!(fs::read(server.dir.path().join("big.bin")).unwrap(), content);
}

#[test]
fn test_upload_over_limit_is_rejected() {
    let server = TestServer::with_limit(1024);
    let client = Client::new();

    let part = multipart::Part::bytes(vec![b'x'; 4096]).file_name("big.txt");
    let res = client
        .post(server.url("/"))
        .multipart(multipart::Form::new().part("upload", part))
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!server.dir.path().join("big.txt").exists());
}

#[test]
fn test_concurrent_downloads() {
    let server = TestServer::new();
    let url = server.url("/a.txt");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let url = url.clone();
            std::thread::spawn(move || {
                reqwest::blocking::get(url).unwrap().text().unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "0123456789");
    }
}
