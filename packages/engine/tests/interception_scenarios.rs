// packages/engine/tests/interception_scenarios.rs
//! End-to-end behaviour of the interception context

use hookwire_engine::interception::{ConnectionStore, Direction, InterceptionContext};
use hookwire_engine::{HeaderMap, InterceptionConfig};
use parking_lot::Mutex;
use std::sync::Arc;

/// Context with recording observers
struct Recorder {
    context: InterceptionContext,
    observed: Arc<Mutex<Vec<HeaderMap>>>,
    raw_reads: Arc<Mutex<Vec<Vec<u8>>>>,
    raw_writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Recorder {
    fn new(config: InterceptionConfig) -> Self {
        let context = InterceptionContext::new(&config);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let raw_reads = Arc::new(Mutex::new(Vec::new()));
        let raw_writes = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&observed);
        context.callbacks().set_headers_observer(move |headers| sink.lock().push(headers));
        let sink = Arc::clone(&raw_reads);
        context
            .callbacks()
            .set_raw_read_observer(move |bytes| sink.lock().push(bytes.to_vec()));
        let sink = Arc::clone(&raw_writes);
        context
            .callbacks()
            .set_raw_write_observer(move |bytes| sink.lock().push(bytes.to_vec()));

        Self {
            context,
            observed,
            raw_reads,
            raw_writes,
        }
    }

    fn supply(&self, pairs: &'static [(&'static str, &'static str)]) {
        self.context
            .callbacks()
            .set_header_supplier(move || pairs.iter().copied().collect());
    }

    /// Write `bytes` and return what would reach the OS
    fn write(&self, fd: i64, bytes: &[u8]) -> (Vec<u8>, isize) {
        let result = self.context.on_write(fd, bytes);
        let out = result.final_buffer(bytes).to_vec();
        let reported = result.reported_count(out.len() as isize);
        (out, reported)
    }
}

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    pairs.iter().copied().collect()
}

const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

#[test]
fn test_scenario_a_whole_read() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.context.on_read(3, REQUEST);

    assert_eq!(*recorder.observed.lock(), vec![headers(&[("Host", "x")])]);
    assert_eq!(*recorder.raw_reads.lock(), vec![REQUEST.to_vec()]);
}

#[test]
fn test_scenario_b_split_read() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.context.on_read(3, &REQUEST[..10]);
    assert!(recorder.observed.lock().is_empty());
    recorder.context.on_read(3, &REQUEST[10..]);

    assert_eq!(*recorder.observed.lock(), vec![headers(&[("Host", "x")])]);
    assert_eq!(*recorder.raw_reads.lock(), vec![REQUEST.to_vec()]);
}

#[test]
fn test_scenario_c_write_injection() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-Trace", "abc")]);

    let original = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    assert_eq!(original.len(), 40);

    let (out, reported) = recorder.write(4, original);
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nX-Trace: abc\r\n\r\nok".to_vec()
    );
    assert_eq!(out.len() - original.len(), 14);
    assert_eq!(reported, 40);
    assert_eq!(*recorder.raw_writes.lock(), vec![out]);
}

#[test]
fn test_scenario_d_descriptor_reuse() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.context.on_socket_opened(5);
    recorder.context.on_read(5, b"POST /upload HTTP/1.1\r\nX-Old: 1\r\n");
    recorder.context.on_write(5, b"HTTP/1.1 100 Continue\r\n");

    recorder.context.on_close(5);
    assert!(!recorder.context.store().contains(5));

    // the OS hands out descriptor 5 again for a new connection
    recorder.context.on_socket_opened(5);
    recorder.context.on_read(5, b"Host: y\r\n\r\n");
    assert!(recorder.observed.lock().is_empty());

    recorder.context.on_read(5, b"GET / HTTP/1.1\r\nHost: y\r\n\r\n");
    assert_eq!(*recorder.observed.lock(), vec![headers(&[("Host", "y")])]);
}

#[test]
fn test_keep_alive_messages_do_not_leak() {
    let recorder = Recorder::new(InterceptionConfig::default());
    let first = b"GET /a HTTP/1.1\r\nX-First: 1\r\n\r\n";
    let second = b"GET /b HTTP/1.1\r\nX-Second: 2\r\n\r\n";

    recorder.context.on_read(6, &first[..20]);
    recorder.context.on_read(6, &first[20..]);
    recorder.context.on_read(6, &second[..7]);
    recorder.context.on_read(6, &second[7..]);

    assert_eq!(
        *recorder.observed.lock(),
        vec![headers(&[("X-First", "1")]), headers(&[("X-Second", "2")])]
    );
}

#[test]
fn test_body_fragments_after_message_pass_through() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-A", "1")]);

    recorder.write(7, b"POST /x HTTP/1.1\r\nContent-Length: 4\r\n\r\n");
    let (out, reported) = recorder.write(7, b"body");
    assert_eq!(out, b"body".to_vec());
    assert_eq!(reported, 4);
    assert_eq!(recorder.raw_writes.lock().len(), 1);
}

#[test]
fn test_idempotent_injection() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-Hookwire-Session", "s1"), ("X-Trace", "t1")]);

    let (once, _) = recorder.write(8, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    let (twice, reported) = recorder.write(9, &once);

    assert_eq!(twice, once);
    assert_eq!(reported, once.len() as isize);
    assert_eq!(
        String::from_utf8(twice).unwrap().matches("X-Hookwire-Session").count(),
        1
    );
}

#[test]
fn test_idempotent_injection_without_marker() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-Trace", "abc")]);

    let (once, _) = recorder.write(8, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    let (twice, reported) = recorder.write(9, &once);

    assert_eq!(twice, once);
    assert_eq!(reported, once.len() as isize);
    assert_eq!(String::from_utf8(twice).unwrap().matches("X-Trace").count(), 1);
}

#[test]
fn test_passthrough_purity() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-A", "1")]);

    let payloads = [
        &b"\x16\x03\x01\x00\xa5\x01\x00"[..],
        b"hello world",
        b"\r\n\r\n",
        b"get / http/1.1\r\n\r\n",
        b"P",
        b"G",
        b"HT",
    ];
    for payload in payloads {
        recorder.context.on_read(10, payload);
        let (out, reported) = recorder.write(10, payload);
        assert_eq!(out, payload.to_vec());
        assert_eq!(reported, payload.len() as isize);
    }

    assert!(!recorder.context.store().contains(10));
    assert!(recorder.observed.lock().is_empty());
    assert!(recorder.raw_writes.lock().is_empty());
}

#[test]
fn test_http2_connection_left_alone() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-A", "1")]);

    let preface = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
    let (out, _) = recorder.write(11, preface);
    assert_eq!(out, preface.to_vec());

    // HEADERS frame payload that happens to look like text stays untouched
    let frame = b"\x00\x00\x1a\x01\x04\x00\x00\x00\x01GET / HTTP/1.1\r\n\r\n";
    let (out, _) = recorder.write(11, frame);
    assert_eq!(out, frame.to_vec());
    assert!(recorder.raw_writes.lock().is_empty());
}

#[test]
fn test_internal_traffic_not_reported() {
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.supply(&[("X-A", "1")]);

    let internal = b"POST /ws HTTP/1.1\r\nx-hookwire-internal: true\r\n\r\n";
    recorder.context.on_read(12, internal);
    let (out, _) = recorder.write(12, internal);

    assert_eq!(out, internal.to_vec());
    assert!(recorder.observed.lock().is_empty());
    assert!(recorder.raw_reads.lock().is_empty());
    assert!(recorder.raw_writes.lock().is_empty());
}

#[test]
fn test_oversized_header_block_degrades() {
    let config = InterceptionConfig {
        max_header_block_size: 64,
        ..Default::default()
    };
    let recorder = Recorder::new(config);

    recorder.context.on_read(13, b"GET / HTTP/1.1\r\n");
    for _ in 0..8 {
        recorder.context.on_read(13, b"X-Filler: aaaaaaaaaaaaaaaa\r\n");
    }
    recorder.context.on_read(13, b"\r\n");

    assert!(recorder.observed.lock().is_empty());
    assert!(!recorder.context.store().has_pending(13, Direction::Read));
}

#[test]
fn test_state_migrates_between_threads() {
    let recorder = Arc::new(Recorder::new(InterceptionConfig::default()));

    let worker = Arc::clone(&recorder);
    std::thread::spawn(move || worker.context.on_read(14, &REQUEST[..12]))
        .join()
        .unwrap();
    let worker = Arc::clone(&recorder);
    std::thread::spawn(move || worker.context.on_read(14, &REQUEST[12..]))
        .join()
        .unwrap();

    assert_eq!(*recorder.observed.lock(), vec![headers(&[("Host", "x")])]);
}

#[test]
fn test_connections_are_independent() {
    let recorder = Arc::new(Recorder::new(InterceptionConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|fd| {
            let worker = Arc::clone(&recorder);
            std::thread::spawn(move || {
                for chunk in REQUEST.chunks(3) {
                    worker.context.on_read(100 + fd, chunk);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let observed = recorder.observed.lock();
    assert_eq!(observed.len(), 8);
    assert!(observed.iter().all(|headers| headers.get("host") == Some("x")));
}

#[test]
fn test_store_lazily_created() {
    let store = ConnectionStore::new();
    assert!(store.is_empty());
    let recorder = Recorder::new(InterceptionConfig::default());
    recorder.context.on_read(15, b"not http");
    assert!(recorder.context.store().is_empty());
}
