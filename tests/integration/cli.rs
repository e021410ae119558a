//! Binary-level checks of the command line surface

use assert_cmd::Command;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("media-relay-bot").unwrap();
    cmd.env_remove("BOT_TOKEN")
        .env_remove("METRICS_ADDR")
        .env_remove("CACHE_FILE")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_platforms_lists_supported_sites() {
    let output = bin().arg("platforms").assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    for name in ["YouTube", "Instagram", "TikTok", "SoundCloud", "Rutube"] {
        assert!(text.contains(name), "missing {name} in:\n{text}");
    }
}

#[test]
fn test_platforms_json_is_machine_readable() {
    let output = bin()
        .args(["platforms", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let list = parsed.as_array().unwrap();
    assert_eq!(list.len(), 17);
    assert!(list.iter().any(|p| p["id"] == "tiktok" && p["asks_for_kind"] == true));
}

#[test]
fn test_fetch_rejects_text_without_link() {
    bin().args(["fetch", "hello there"]).assert().failure().code(1);
}

#[test]
fn test_fetch_rejects_kind_the_platform_lacks() {
    bin()
        .args(["fetch", "https://open.spotify.com/track/abc", "--kind", "video"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_fetch_rejects_unknown_quality() {
    bin()
        .args(["fetch", "https://youtu.be/abc123", "--quality", "4k"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_serve_requires_token() {
    bin().arg("serve").assert().failure().code(2);
}

#[test]
fn test_concurrency_is_range_checked() {
    bin()
        .args(["--max-concurrent-downloads", "0", "platforms"])
        .assert()
        .failure()
        .code(2);
}
