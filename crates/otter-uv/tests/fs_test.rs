//! File operations driven through the `uv` export table

use otter_uv::{ContextSlot, Object, PromiseState, UvConfig, Value, uv_extension};

fn setup() -> (ContextSlot, Object) {
    let slot = ContextSlot::new();
    slot.initialize(UvConfig::default()).unwrap();
    let exports = uv_extension(slot.clone()).exports();
    (slot, exports)
}

fn call(exports: &Object, name: &str, args: &[Value]) -> Result<Value, Value> {
    let function = exports.get(name).unwrap();
    function.as_function().unwrap().call(args)
}

fn run(exports: &Object) -> f64 {
    call(exports, "run", &[]).unwrap().as_number().unwrap()
}

fn fulfilled(promise: &Value) -> Value {
    match promise.as_promise().unwrap().state() {
        PromiseState::Fulfilled(value) => value,
        other => panic!("expected fulfilled promise, got {:?}", other),
    }
}

fn rejected(promise: &Value) -> Value {
    match promise.as_promise().unwrap().state() {
        PromiseState::Rejected(error) => error,
        other => panic!("expected rejected promise, got {:?}", other),
    }
}

#[test]
fn test_read_write_copy_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let copy = dir.path().join("copy.bin");
    let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &contents).unwrap();

    let (_slot, uv) = setup();

    let read = call(&uv, "fsRead", &[Value::from(source.to_str().unwrap())]).unwrap();
    assert!(read.as_promise().unwrap().is_pending());
    assert_eq!(run(&uv), 0.0);
    let buffer = fulfilled(&read);

    let write = call(&uv, "fsWrite", &[Value::from(copy.to_str().unwrap()), buffer]).unwrap();
    assert_eq!(run(&uv), 0.0);
    assert_eq!(fulfilled(&write).as_number(), Some(contents.len() as f64));

    let reread = call(&uv, "fsRead", &[Value::from(copy.to_str().unwrap())]).unwrap();
    assert_eq!(run(&uv), 0.0);
    let reread = fulfilled(&reread);
    assert_eq!(reread.as_array_buffer().unwrap().as_bytes(), contents.as_slice());
}

#[test]
fn test_missing_file_rejects_with_enoent() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let (slot, uv) = setup();
    let read = call(&uv, "fsRead", &[Value::from(missing.to_str().unwrap())]).unwrap();
    assert_eq!(run(&uv), 0.0);

    let error = rejected(&read);
    assert_eq!(
        error.get("code").and_then(|v| v.as_number()),
        Some(-(libc::ENOENT as f64))
    );
    assert_eq!(
        error.get("message").unwrap().as_str(),
        Some("ENOENT: no such file or directory")
    );
    assert_eq!(slot.lookup().unwrap().live_requests(), 0);
}

#[test]
fn test_write_then_stat_reports_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.txt");
    let path = path.to_str().unwrap();

    let (_slot, uv) = setup();
    let write = call(&uv, "fsWrite", &[Value::from(path), Value::from("hello, loop")]).unwrap();
    assert_eq!(run(&uv), 0.0);
    assert_eq!(fulfilled(&write).as_number(), Some(11.0));

    let stat = call(&uv, "fsStat", &[Value::from(path)]).unwrap();
    assert_eq!(run(&uv), 0.0);
    let stat = fulfilled(&stat);
    assert_eq!(stat.get("size").unwrap().as_number(), Some(11.0));
    assert!(stat.get("mtime").unwrap().as_number().unwrap() > 0.0);

    #[cfg(unix)]
    {
        let mode = stat.get("mode").unwrap().as_number().unwrap() as u32;
        assert_eq!(mode & 0o600, 0o600);
    }
}

#[test]
fn test_write_truncates_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shrink.txt");
    std::fs::write(&path, b"a much longer original body").unwrap();

    let (_slot, uv) = setup();
    call(&uv, "fsWrite", &[Value::from(path.to_str().unwrap()), Value::from("short")]).unwrap();
    assert_eq!(run(&uv), 0.0);
    assert_eq!(std::fs::read(&path).unwrap(), b"short");
}

#[test]
fn test_concurrent_reads_resolve_with_their_own_contents() {
    let dir = tempfile::tempdir().unwrap();
    let (slot, uv) = setup();

    let mut pending = Vec::new();
    for i in 0..16 {
        let path = dir.path().join(format!("file-{}.txt", i));
        let body = format!("contents of file {}", i).repeat(i + 1);
        std::fs::write(&path, &body).unwrap();
        let promise = call(&uv, "fsRead", &[Value::from(path.to_str().unwrap())]).unwrap();
        pending.push((promise, body));
    }
    assert_eq!(slot.lookup().unwrap().live_requests(), 16);

    assert_eq!(run(&uv), 0.0);
    for (promise, body) in pending {
        let buffer = fulfilled(&promise);
        assert_eq!(buffer.as_array_buffer().unwrap().as_bytes(), body.as_bytes());
    }
    assert_eq!(slot.lookup().unwrap().live_requests(), 0);
}

#[test]
fn test_reading_directory_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let (_slot, uv) = setup();
    let read = call(&uv, "fsRead", &[Value::from(dir.path().to_str().unwrap())]).unwrap();
    assert_eq!(run(&uv), 0.0);
    let code = rejected(&read).get("code").unwrap().as_number().unwrap();
    assert!(code < 0.0);
}

#[test]
fn test_nul_path_fails_without_a_live_record() {
    let (slot, uv) = setup();
    let read = call(&uv, "fsRead", &[Value::from("nul\0inside")]).unwrap();

    let error = rejected(&read);
    assert_eq!(
        error.get("code").and_then(|v| v.as_number()),
        Some(-(libc::EINVAL as f64))
    );
    assert!(!slot.lookup().unwrap().has_live_records());
    assert_eq!(run(&uv), 0.0);
}

#[test]
fn test_write_rejects_non_buffer_payload() {
    let (slot, uv) = setup();
    let thrown = call(&uv, "fsWrite", &[Value::from("out.txt"), Value::Bool(true)]).unwrap_err();
    assert_eq!(thrown.get("name").unwrap().as_str(), Some("TypeError"));
    assert!(!slot.lookup().unwrap().has_live_records());
}
