//! Casting with paths relative to the current directory, as the CLI passes
//! them through. Changes the process cwd, so it lives in its own test binary.

#![cfg(unix)]

mod common;

use std::path::PathBuf;

use common::{CastHarness, FakeEncoder};
use hlscast::{CastOptions, CastState};

#[tokio::test]
async fn relative_source_and_work_root_reach_live() {
    let mut h = CastHarness::new(FakeEncoder::Streaming);
    std::env::set_current_dir(h.dir.path()).unwrap();
    h.config.session.work_root = Some(PathBuf::from("sessions"));
    let controller = h.controller();

    let handle = controller
        .start("sample.mp4", CastOptions::default())
        .await
        .unwrap();

    let status = controller.status();
    assert_eq!(status.state, CastState::Live);
    assert!(status.error.is_none());

    let resp = reqwest::get(handle.url()).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("segment000.ts"));

    controller.stop().await;
    assert_eq!(controller.status().state, CastState::Idle);
    assert!(h.session_dirs().is_empty());
}
