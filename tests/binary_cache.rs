#![cfg(feature = "binary-cache")]

use reqfilter::{
    DeserializeError, FilterError, Forest, Program, Request, RequestBackend, Tree, Vm,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn gateway_program() -> Program {
    let mut api = Tree::named("api");
    api.add_and();
    api.add_child_op("startsWithPath", &["/api/"]);
    api.add_op("containsHeader", &["accept", "json"]);

    let mut throttled = Tree::named("throttled");
    throttled.add_or();
    throttled.add_child_op("greaterThanAfterHeader", &["x-rate", "used=", "100"]);
    throttled.add_op("printError", &["under limit", "gateway", "false"]);
    throttled.add_not();
    throttled.add_op("existsCookie", &["session"]);

    Program::compile(&Forest::new().with(api).with(throttled).with(Tree::named("empty")))
        .unwrap()
}

fn verdicts(program: &Program, request: &Request) -> Vec<Option<bool>> {
    let mut vm = Vm::new(RequestBackend::new(request), program);
    ["api", "throttled", "empty", "missing"]
        .iter()
        .map(|name| vm.run_named(name))
        .collect()
}

fn requests() -> Vec<Request> {
    vec![
        Request::new("GET")
            .path("/api/users")
            .header("Accept", "application/json")
            .cookie("session", "s1"),
        Request::new("GET")
            .path("/index.html")
            .header("X-Rate", "used=250"),
        Request::new("POST").path("/api/items"),
    ]
}

// ---------------------------------------------------------------------------
// Round-trip
// ---------------------------------------------------------------------------

#[test]
fn round_trip_preserves_behaviour() {
    let original = gateway_program();
    let bytes = original.to_bytes().unwrap();
    let restored = Program::from_bytes(&bytes).unwrap();

    assert_eq!(restored, original);
    for request in requests() {
        assert_eq!(verdicts(&original, &request), verdicts(&restored, &request));
    }
}

#[test]
fn encoding_determinism() {
    let a = gateway_program().to_bytes().unwrap();
    let b = gateway_program().to_bytes().unwrap();
    assert_eq!(a, b);
}

#[test]
fn disassembly_survives_round_trip() {
    let original = gateway_program();
    let restored = Program::from_bytes(&original.to_bytes().unwrap()).unwrap();
    assert_eq!(original.disassemble(), restored.disassemble());
}

// ---------------------------------------------------------------------------
// Corruption
// ---------------------------------------------------------------------------

#[test]
fn corruption_byte_flip() {
    let mut corrupted = gateway_program().to_bytes().unwrap();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;

    let err = Program::from_bytes(&corrupted).unwrap_err();
    assert!(
        matches!(err, DeserializeError::ChecksumMismatch),
        "expected ChecksumMismatch, got: {err}"
    );
}

#[test]
fn corruption_truncation() {
    let bytes = gateway_program().to_bytes().unwrap();
    let err = Program::from_bytes(&bytes[..33]).unwrap_err();
    assert!(
        matches!(err, DeserializeError::LengthMismatch { .. }),
        "expected LengthMismatch, got: {err}"
    );
}

#[test]
fn bad_magic() {
    let mut bad = gateway_program().to_bytes().unwrap();
    bad[0..4].copy_from_slice(b"BAAD");

    let err = Program::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(err, DeserializeError::BadMagic),
        "expected BadMagic, got: {err}"
    );
}

#[test]
fn version_mismatch() {
    let mut bad = gateway_program().to_bytes().unwrap();
    bad[4] = 99;
    bad[5] = 0;

    let err = Program::from_bytes(&bad).unwrap_err();
    assert!(
        matches!(
            err,
            DeserializeError::IncompatibleVersion {
                blob: 99,
                supported: 1
            }
        ),
        "expected IncompatibleVersion, got: {err}"
    );
}

#[test]
fn empty_input_rejected() {
    assert!(Program::from_bytes(&[]).is_err());
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[test]
fn file_round_trip() -> Result<(), FilterError> {
    let dir = std::env::temp_dir().join("reqfilter_test_binary_cache");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("gateway.rqfb");

    let original = gateway_program();
    original.to_binary_file(&path)?;
    let restored = Program::from_binary_file(&path)?;

    for request in requests() {
        assert_eq!(verdicts(&original, &request), verdicts(&restored, &request));
    }

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Program::from_binary_file("/nonexistent/reqfilter/program.rqfb").unwrap_err();
    assert!(matches!(err, DeserializeError::Io(_)));
}
