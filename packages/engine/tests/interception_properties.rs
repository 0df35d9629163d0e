// packages/engine/tests/interception_properties.rs
//! Property tests: fragmentation invariance, injection round-trip and
//! byte-count honesty

use hookwire_engine::interception::headers::{extract_headers, inject_headers};
use hookwire_engine::interception::rewrite::reported_count;
use hookwire_engine::{HeaderMap, InterceptionConfig, InterceptionContext};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

fn header_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9-]{0,15}"
}

/// Values are trimmed on extraction, so generated ones carry no edge spaces
fn header_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("GET, HEAD".to_string()),
        Just("HTTP/1.1 edge".to_string()),
        Just("PRI".to_string()),
        "[A-Za-z0-9/=.;,_-]([A-Za-z0-9/=.;, _-]{0,22}[A-Za-z0-9/=.;,_-])?",
    ]
}

fn header_set() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((header_name(), header_value()), 1..6)
}

/// Bytes after the header block; a body fragment opening with a verb would
/// start a message of its own
fn body() -> impl Strategy<Value = Vec<u8>> {
    "[a-z0-9 ]{0,32}".prop_map(String::into_bytes)
}

fn request(headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut out = VERB.to_vec();
    out.extend_from_slice(b" /items HTTP/1.1\r\n");
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Verb opening every generated message
const VERB: &[u8] = b"POST";

/// Split `bytes` at the given (unsorted, possibly repeated) cut points. The
/// first fragment always carries the whole verb: a shorter one matches no
/// marker and passes through.
fn fragments(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|cut| cut % bytes.len()).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().filter(|&cut| cut >= VERB.len()) {
        out.push(bytes[start..cut].to_vec());
        start = cut;
    }
    out.push(bytes[start..].to_vec());
    out
}

fn observe(chunks: &[Vec<u8>]) -> Vec<HeaderMap> {
    let context = InterceptionContext::new(&InterceptionConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    context.callbacks().set_headers_observer(move |headers| sink.lock().push(headers));
    for chunk in chunks {
        context.on_read(1, chunk);
    }
    let seen = seen.lock().clone();
    seen
}

proptest! {
    #[test]
    fn test_fragmentation_invariance(
        headers in header_set(),
        body in body(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let message = request(&headers, &body);
        let whole = observe(&[message.clone()]);
        let split = observe(&fragments(&message, &cuts));

        prop_assert_eq!(whole.len(), 1);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn test_injection_round_trip(
        original in header_set(),
        injected in header_set(),
        body in body(),
    ) {
        let message = request(&original, &body);
        let injected: HeaderMap = injected.into_iter().collect();
        let out = inject_headers(&message, &injected).unwrap();

        let parsed = extract_headers(&out).unwrap();
        let mut expected: HeaderMap = original.into_iter().collect();
        for (name, value) in injected.iter() {
            expected.insert(name, value);
        }
        for (name, value) in expected.iter() {
            prop_assert_eq!(parsed.get(name), Some(value));
        }
        prop_assert_eq!(parsed.len(), expected.len());
        // everything before the blank line is kept byte for byte
        let splice_at = message.len() - body.len() - 2;
        prop_assert_eq!(&out[..splice_at], &message[..splice_at]);
        prop_assert!(out.ends_with(&body));
        prop_assert!(out[..out.len() - body.len()].ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_fragmented_write_matches_whole_write(
        headers in header_set(),
        cuts in prop::collection::vec(any::<usize>(), 0..6),
    ) {
        let message = request(&headers, b"");
        let supplied: HeaderMap = [("X-Hookwire-Session", "s")].into_iter().collect();
        let expected = inject_headers(&message, &supplied).unwrap();

        let context = InterceptionContext::new(&InterceptionConfig::default());
        context.callbacks().set_header_supplier(move || supplied.clone());

        let mut sent = Vec::new();
        let mut reported = 0isize;
        let mut skipped = false;
        for chunk in fragments(&message, &cuts) {
            let result = context.on_write(2, &chunk);
            let out = result.final_buffer(&chunk);
            sent.extend_from_slice(out);
            reported += result.reported_count(out.len() as isize);
            if result.completed_message().is_some() && !result.is_rewritten() {
                skipped = true;
            }
        }

        // the caller always sees exactly its own byte count
        prop_assert_eq!(reported, message.len() as isize);
        if skipped {
            // terminator started in an earlier, already-sent fragment
            prop_assert_eq!(sent, message);
        } else {
            prop_assert_eq!(sent, expected);
        }
    }

    #[test]
    fn test_byte_count_honesty(
        original_length in 0usize..4096,
        delta in 0isize..512,
        real_return in -1isize..5000,
    ) {
        let reported = reported_count(real_return, original_length, delta);
        if real_return < 0 {
            prop_assert_eq!(reported, real_return);
        } else {
            prop_assert!(reported >= 0);
            prop_assert!(reported <= original_length as isize);
            prop_assert_eq!(reported, (real_return - delta).clamp(0, original_length as isize));
        }
    }
}
