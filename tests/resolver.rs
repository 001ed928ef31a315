//! Integration tests for artifact resolution.
//!
//! Exercises the fallback chain end to end on real temp directories: direct
//! hits, misplaced-file claiming, request-id affinity, the freshness window,
//! and the DOT conversion path (with a fake converter on unix).

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use archdiagram::resolve::{resolve_artifact, ResolveContext};

struct Layout {
    _tmp: TempDir,
    canonical_dir: PathBuf,
    expected: PathBuf,
    working_root: PathBuf,
}

fn layout() -> Layout {
    let tmp = TempDir::new().unwrap();
    let canonical_dir = tmp.path().join("outputs").join("generated-diagrams");
    std::fs::create_dir_all(&canonical_dir).unwrap();
    let working_root = tmp.path().join("work");
    std::fs::create_dir_all(&working_root).unwrap();
    let expected = canonical_dir.join("20250101_120000_abc123_diagram.png");
    Layout {
        _tmp: tmp,
        canonical_dir,
        expected,
        working_root,
    }
}

fn ctx<'a>(layout: &'a Layout, window_secs: u64) -> ResolveContext<'a> {
    ResolveContext {
        expected_path: &layout.expected,
        request_id: "abc123",
        working_root: &layout.working_root,
        extra_dirs: &[],
        freshness_window: Duration::from_secs(window_secs),
        conversion_timeout: Duration::from_secs(10),
        converter: None,
    }
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(b"payload");
    bytes
}

#[tokio::test]
async fn direct_hit_wins_unchanged() {
    let l = layout();
    std::fs::write(&l.expected, png_bytes()).unwrap();

    let resolved = resolve_artifact(&ctx(&l, 60)).await;
    assert_eq!(resolved, Some(l.expected.clone()));
}

#[tokio::test]
async fn empty_directories_resolve_to_none() {
    let l = layout();
    let resolved = resolve_artifact(&ctx(&l, 60)).await;
    assert_eq!(resolved, None);
}

#[tokio::test]
async fn misplaced_id_match_is_claimed_and_canonicalized() {
    let l = layout();
    let stray = l.working_root.join("abc123_sketch.png");
    std::fs::write(&stray, png_bytes()).unwrap();

    let resolved = resolve_artifact(&ctx(&l, 60)).await;

    // Canonical path is populated and returned.
    assert_eq!(resolved, Some(l.expected.clone()));
    assert!(l.expected.is_file());
    // The stray was claimed out of the working root into the canonical dir.
    assert!(!stray.exists());
    assert!(l.canonical_dir.join("abc123_sketch.png").is_file());
}

#[tokio::test]
async fn fresh_unmatched_candidate_is_adopted() {
    let l = layout();
    // No request id in the name, but just written: inside the window.
    std::fs::write(l.working_root.join("arch_diagram.png"), png_bytes()).unwrap();

    let resolved = resolve_artifact(&ctx(&l, 60)).await;
    assert_eq!(resolved, Some(l.expected.clone()));
    assert!(l.expected.is_file());
}

#[tokio::test]
async fn stale_unmatched_candidate_is_ignored() {
    let l = layout();
    std::fs::write(l.working_root.join("arch_diagram.png"), png_bytes()).unwrap();

    // A zero-width window makes any pre-existing file stale.
    let resolved = resolve_artifact(&ctx(&l, 0)).await;
    assert_eq!(resolved, None);
    assert!(!l.expected.exists());
}

#[tokio::test]
async fn other_requests_artifact_is_not_adopted() {
    let l = layout();
    // Carries a different request id; only adoptable through the freshness
    // fallback, which the zero-width window closes.
    std::fs::write(
        l.canonical_dir.join("20250101_110000_zzz999_diagram.png"),
        png_bytes(),
    )
    .unwrap();

    let resolved = resolve_artifact(&ctx(&l, 0)).await;
    assert_eq!(resolved, None);
}

#[tokio::test]
async fn id_match_beats_newer_unmatched_candidate() {
    let l = layout();
    std::fs::write(l.working_root.join("abc123_v1.png"), png_bytes()).unwrap();
    std::fs::write(l.working_root.join("unrelated_diagram.png"), png_bytes()).unwrap();

    let resolved = resolve_artifact(&ctx(&l, 60)).await.unwrap();
    assert_eq!(resolved, l.expected);
    // The id match was the one copied into the canonical location.
    assert!(l.canonical_dir.join("abc123_v1.png").is_file());
}

#[tokio::test]
async fn dot_without_converter_falls_through() {
    let l = layout();
    std::fs::write(l.working_root.join("arch.dot"), b"digraph { a -> b }").unwrap();

    let resolved = resolve_artifact(&ctx(&l, 60)).await;
    assert_eq!(resolved, None);
}

#[cfg(unix)]
#[tokio::test]
async fn dot_conversion_uses_converter_and_expected_path() {
    use std::os::unix::fs::PermissionsExt;

    let l = layout();
    std::fs::write(l.working_root.join("arch.dot"), b"digraph { a -> b }").unwrap();

    // Fake converter: writes PNG magic to whatever follows -o.
    let converter = l.working_root.join("fake-dot");
    std::fs::write(
        &converter,
        "#!/bin/sh\n\
         out=\"\"\n\
         while [ $# -gt 0 ]; do\n\
           if [ \"$1\" = \"-o\" ]; then out=\"$2\"; shift; fi\n\
           shift\n\
         done\n\
         printf '\\211PNG\\r\\n\\032\\n' > \"$out\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&converter, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut c = ctx(&l, 60);
    c.converter = Some(converter);

    let resolved = resolve_artifact(&c).await;
    assert_eq!(resolved, Some(l.expected.clone()));
    assert!(l.expected.is_file());
}

#[tokio::test]
async fn extra_search_dirs_are_scanned() {
    let l = layout();
    let extra = l.working_root.join("elsewhere");
    std::fs::create_dir_all(&extra).unwrap();
    std::fs::write(extra.join("abc123_diagram.png"), png_bytes()).unwrap();
    let extra_dirs = vec![extra];

    let mut c = ctx(&l, 60);
    c.extra_dirs = &extra_dirs;

    let resolved = resolve_artifact(&c).await;
    assert_eq!(resolved, Some(l.expected.clone()));
}
