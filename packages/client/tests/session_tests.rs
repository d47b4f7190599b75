//! End-to-end session behavior against a scripted mock server:
//! default headers, ETag revalidation, redirect handling and the
//! HTTP error taxonomy.

mod support;

use sofa_client::{Body, Credentials, Error, Headers, Method, Session};
use support::{MockServer, echo_connection, read_request, respond};

fn session() -> Session {
    Session::new().expect("session should build")
}

#[test]
fn default_headers_do_not_overwrite_callers() {
    let server = MockServer::start(|_, stream, log| {
        echo_connection(stream, log, "200 OK", &[], b"{}");
        true
    });

    let mut headers = Headers::new();
    headers.set("Accept", "text/plain");
    headers.set("X-Trace", "1");
    let credentials = Credentials::new("admin", "secret");
    session()
        .request(
            Method::Get,
            &format!("{}/db", server.url),
            Body::None,
            headers,
            Some(&credentials),
        )
        .expect("request should succeed");

    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.header("accept").as_deref(), Some("text/plain"));
    assert_eq!(request.header("accept-encoding").as_deref(), Some("utf-8"));
    assert_eq!(request.header("content-length").as_deref(), Some("0"));
    assert_eq!(
        request.header("authorization").as_deref(),
        Some("Basic YWRtaW46c2VjcmV0")
    );
    assert!(
        request
            .header("user-agent")
            .is_some_and(|ua| ua.starts_with("sofa/"))
    );
    assert_eq!(request.header("x-trace").as_deref(), Some("1"));
}

#[test]
fn second_get_is_conditional_and_served_from_cache() {
    let server = MockServer::start(|_, mut stream, log| {
        // First request: a cacheable 200. Second: 304 revalidation.
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(
                &mut stream,
                "200 OK",
                &[
                    ("ETag", "\"1-abc\""),
                    ("Content-Type", "application/json"),
                    ("Date", "Mon, 01 Jan 2024 00:00:00 GMT"),
                ],
                b"{\"ok\":true}",
            );
        }
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(&mut stream, "304 Not Modified", &[], b"");
        }
        true
    });

    let session = session();
    let url = format!("{}/db/doc1", server.url);

    let first = session
        .request(Method::Get, &url, Body::None, Headers::new(), None)
        .expect("first GET");
    assert_eq!(first.status, 200);
    assert_eq!(first.text().as_deref(), Some("{\"ok\":true}"));
    assert_eq!(session.cache().len(), 1);

    let second = session
        .request(Method::Get, &url, Body::None, Headers::new(), None)
        .expect("second GET");
    // The cached response comes back unchanged.
    assert_eq!(second.status, 200);
    assert_eq!(second.text().as_deref(), Some("{\"ok\":true}"));

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].has_header("if-none-match"));
    assert_eq!(seen[1].header("if-none-match").as_deref(), Some("\"1-abc\""));
}

#[test]
fn permanent_redirect_is_memoized() {
    let target = MockServer::start(|_, stream, log| {
        echo_connection(stream, log, "200 OK", &[], b"{\"moved\":true}");
        true
    });
    let target_url = format!("{}/new", target.url);
    let location = target_url.clone();
    let origin = MockServer::start(move |_, mut stream, log| {
        while let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(
                &mut stream,
                "301 Moved Permanently",
                &[("Location", location.as_str())],
                b"",
            );
        }
        true
    });

    let session = session();
    let original = format!("{}/old", origin.url);

    let first = session
        .request(Method::Get, &original, Body::None, Headers::new(), None)
        .expect("redirected GET");
    assert_eq!(first.status, 200);
    assert_eq!(session.redirects().len(), 1);

    let second = session
        .request(Method::Get, &original, Body::None, Headers::new(), None)
        .expect("memoized GET");
    assert_eq!(second.status, 200);

    // The original host was contacted exactly once; the second request
    // went straight to the memoized target.
    assert_eq!(origin.seen().len(), 1);
    assert_eq!(target.seen().len(), 2);
}

#[test]
fn see_other_forces_a_bodyless_get() {
    let server = MockServer::start(|_, mut stream, log| {
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(&mut stream, "303 See Other", &[("Location", "/result")], b"");
        }
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(&mut stream, "200 OK", &[], b"{\"done\":true}");
        }
        true
    });

    let response = session()
        .request(
            Method::Post,
            &format!("{}/jobs", server.url),
            Body::from("{\"task\":1}"),
            Headers::new(),
            None,
        )
        .expect("303 chain should succeed");
    assert_eq!(response.status, 200);

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].request_line().starts_with("POST /jobs"));
    assert!(seen[1].request_line().starts_with("GET /result"));
    assert_eq!(seen[1].header("content-length").as_deref(), Some("0"));
}

#[test]
fn redirect_loops_hit_the_hop_limit() {
    let server = MockServer::start(|_, mut stream, log| {
        while let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(&mut stream, "302 Found", &[("Location", "/loop")], b"");
        }
        true
    });

    let err = session()
        .request(
            Method::Get,
            &format!("{}/loop", server.url),
            Body::None,
            Headers::new(),
            None,
        )
        .expect_err("redirect loop must fail");
    assert!(matches!(err, Error::RedirectLimit { limit: 5, .. }));
    // Initial request plus one per allowed hop.
    assert_eq!(server.seen().len(), 6);
}

#[test]
fn missing_document_raises_not_found_with_reason() {
    let server = MockServer::start(|_, stream, log| {
        echo_connection(
            stream,
            log,
            "404 Object Not Found",
            &[("Content-Type", "application/json")],
            b"{\"error\":\"not_found\",\"reason\":\"missing\"}",
        );
        true
    });

    let err = session()
        .request(
            Method::Get,
            &format!("{}/db/doc1", server.url),
            Body::None,
            Headers::new(),
            None,
        )
        .expect_err("404 must surface");
    match err {
        Error::NotFound { reason } => assert_eq!(reason, "missing"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn stale_rev_raises_conflict() {
    let server = MockServer::start(|_, stream, log| {
        echo_connection(
            stream,
            log,
            "409 Conflict",
            &[("Content-Type", "application/json")],
            b"{\"error\":\"conflict\",\"reason\":\"Document update conflict.\"}",
        );
        true
    });

    let err = session()
        .request(
            Method::Put,
            &format!("{}/db/doc1", server.url),
            Body::from("{\"_id\":\"doc1\",\"_rev\":\"1-stale\"}"),
            Headers::new(),
            None,
        )
        .expect_err("409 must surface");
    match err {
        Error::Conflict { reason } => assert_eq!(reason, "Document update conflict."),
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn error_statuses_are_never_retried() {
    let server = MockServer::start(|_, stream, log| {
        echo_connection(
            stream,
            log,
            "500 Internal Server Error",
            &[("Content-Type", "application/json")],
            b"{\"error\":\"internal\",\"reason\":\"boom\"}",
        );
        true
    });

    let err = session()
        .request(
            Method::Get,
            &format!("{}/db", server.url),
            Body::None,
            Headers::new(),
            None,
        )
        .expect_err("500 must surface");
    match err {
        Error::Server {
            status,
            error,
            reason,
        } => {
            assert_eq!(status, 500);
            assert_eq!(error, "internal");
            assert_eq!(reason, "boom");
        }
        other => panic!("expected Server, got {other:?}"),
    }
    // One request on the wire: HTTP errors bypass the retry policy.
    assert_eq!(server.seen().len(), 1);
}

#[test]
fn stale_cache_entry_is_evicted_on_non_304() {
    let server = MockServer::start(|_, mut stream, log| {
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(
                &mut stream,
                "200 OK",
                &[("ETag", "\"1-a\""), ("Date", "Mon, 01 Jan 2024 00:00:00 GMT")],
                b"v1",
            );
        }
        // The document changed server-side: a fresh 200 without an
        // ETag answers the conditional GET.
        if let Some(request) = read_request(&mut stream) {
            log.lock().unwrap().push(request);
            respond(&mut stream, "200 OK", &[], b"v2");
        }
        true
    });

    let session = session();
    let url = format!("{}/db/doc1", server.url);
    session
        .request(Method::Get, &url, Body::None, Headers::new(), None)
        .expect("first GET");
    assert_eq!(session.cache().len(), 1);

    let second = session
        .request(Method::Get, &url, Body::None, Headers::new(), None)
        .expect("second GET");
    assert_eq!(second.text().as_deref(), Some("v2"));
    // The v1 entry is gone and v2 was not cacheable.
    assert_eq!(session.cache().len(), 0);
}
