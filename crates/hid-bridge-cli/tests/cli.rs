#![cfg(not(target_arch = "wasm32"))]

use assert_cmd::Command;
use hid_proto::{Operation, Request, Response};

fn bridge() -> Command {
    Command::cargo_bin("hid-bridge").unwrap()
}

#[test]
fn print_config_emits_defaults() {
    let out = bridge()
        .args(["--print-config", "--transport", "spi"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("\"kind\": \"spi\""), "{text}");
    assert!(text.contains("\"default_keyboard\": \"usb\""), "{text}");
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "ps2_half_period_us": 0 }"#).unwrap();
    bridge()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .assert()
        .failure();
}

#[test]
fn serial_ping_over_stdio() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = Request::new(Operation::Ping).encode().to_vec();
    input.extend_from_slice(
        &Request::new(Operation::Key {
            code: 0x04,
            pressed: true,
        })
        .encode(),
    );

    let out = bridge()
        .arg("--storage")
        .arg(dir.path().join("nv.bin"))
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(out.len(), 16, "{out:02x?}");
    for chunk in out.chunks_exact(8) {
        let mut frame = [0u8; 8];
        frame.copy_from_slice(chunk);
        let Ok(Response::Pong(pong)) = Response::decode(&frame) else {
            panic!("expected pong, got {frame:02x?}");
        };
        assert!(pong.outputs.is_dynamic());
    }
    assert!(dir.path().join("nv.bin").exists());
}
