//! HTTP-level tests for the HLS server.

use std::path::Path;

use hlscast::server::HlsServer;
use hlscast_common::SegmentLayout;
use tempfile::{tempdir, TempDir};

fn write_session(dir: &Path) {
    std::fs::write(dir.join("segment000.ts"), vec![0x47u8; 188 * 4]).unwrap();
    std::fs::write(dir.join("segment001.ts"), vec![0x47u8; 188 * 4]).unwrap();
    // Still being written: not in the manifest yet
    std::fs::write(dir.join("segment002.ts"), vec![0x47u8; 10]).unwrap();
    std::fs::write(
        dir.join("stream.m3u8"),
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXTINF:2.000000,\nsegment000.ts\n#EXTINF:2.000000,\nsegment001.ts\n",
    )
    .unwrap();
}

async fn serve() -> (TempDir, TempDir, HlsServer) {
    let parent = tempdir().unwrap();
    let session = tempfile::Builder::new()
        .prefix("session-")
        .tempdir_in(parent.path())
        .unwrap();
    write_session(session.path());
    std::fs::write(parent.path().join("secret.m3u8"), "#EXTM3U\n").unwrap();

    let server = HlsServer::bind(session.path(), SegmentLayout::default(), "127.0.0.1", 0)
        .await
        .unwrap();
    (parent, session, server)
}

#[tokio::test]
async fn manifest_and_segment_content_types() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();

    let resp = reqwest::get(format!("http://{addr}/stream.m3u8")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        resp.headers()["cache-control"],
        "no-cache, no-store, must-revalidate"
    );

    let resp = reqwest::get(format!("http://{addr}/segment001.ts")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/mp2t");
    assert_eq!(resp.bytes().await.unwrap().len(), 188 * 4);

    server.shutdown().await;
}

#[tokio::test]
async fn traversal_and_unknown_paths_are_404() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();
    let client = reqwest::Client::new();

    for path in [
        "/..%2Fsecret.m3u8",
        "/%2E%2E/secret.m3u8",
        "/sub/stream.m3u8",
        "/",
        "/missing.ts",
        "/segment999.ts",
    ] {
        let resp = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404, "{path}");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn unlisted_segment_is_not_served() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();

    let resp = reqwest::get(format!("http://{addr}/segment002.ts")).await.unwrap();
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn range_request_returns_partial_content() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/segment000.ts"))
        .header("Range", "bytes=0-187")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["content-range"], "bytes 0-187/752");
    assert_eq!(resp.bytes().await.unwrap().len(), 188);

    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_clients_are_served() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();

    let requests = (0..32).map(|i| {
        let url = if i % 2 == 0 {
            format!("http://{addr}/stream.m3u8")
        } else {
            format!("http://{addr}/segment000.ts")
        };
        tokio::spawn(async move {
            // Separate clients so each request gets its own connection
            let client = reqwest::Client::new();
            client.get(url).send().await.map(|r| r.status().as_u16())
        })
    });

    for status in futures::future::join_all(requests).await {
        assert_eq!(status.unwrap().unwrap(), 200);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_releases_port() {
    let (_parent, _session, server) = serve().await;
    let addr = server.local_addr();

    // Keep a connection open across shutdown
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/stream.m3u8"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    server.shutdown().await;

    assert!(std::net::TcpListener::bind(addr).is_ok());
    assert!(reqwest::get(format!("http://{addr}/stream.m3u8"))
        .await
        .is_err());
}
