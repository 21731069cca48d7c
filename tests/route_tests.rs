use brrtcontext::app::{App, Mode};
use brrtcontext::context::{handler, Context};
use brrtcontext::exceptions::HTML_CONTENT_TYPE;
use brrtcontext::server::Request;
use http::Method;

mod common;
use common::chain::{entries, log, step, wrap};

fn panicking() -> brrtcontext::HandlerFn {
    handler(|ctx: &mut Context| {
        ctx.error("before the crash", None);
        panic!("database handle poisoned <oops>");
    })
}

#[test]
fn test_panic_page_in_development() {
    let app = App::builder().mode(Mode::DEVELOPMENT).build();
    let route = app.route("boom", vec![panicking()]);

    let res = route.serve(Request::new(Method::POST, "/boom"));
    assert_eq!(res.status(), 500);
    assert_eq!(res.get_header("content-type"), Some(HTML_CONTENT_TYPE));
    let body = String::from_utf8_lossy(res.body());
    assert!(body.contains("database handle poisoned &lt;oops&gt;"));
    assert!(body.contains("before the crash"));
    assert!(body.contains("Backtrace"));
}

#[test]
fn test_status_page_in_production() {
    let app = App::builder().mode(Mode::PRODUCTION).build();
    let route = app.route("boom", vec![panicking()]);

    let res = route.serve(Request::default());
    assert_eq!(res.status(), 500);
    let body = String::from_utf8_lossy(res.body());
    assert!(body.contains("<title>500 Internal Server Error</title>"));
    assert!(!body.contains("poisoned"));
    assert!(!body.contains("before the crash"));
}

#[test]
fn test_panic_stops_chain_but_outer_handler_resumes() {
    let log = log();
    let app = App::builder().build();
    let route = app.route("boom", vec![wrap(&log, "A"), panicking(), step(&log, "C")]);

    let res = route.serve(Request::default());
    assert_eq!(res.status(), 500);
    // The unwind passes through A's frame, so A's after-code never runs.
    assert_eq!(entries(&log), vec!["A-before"]);
}

#[test]
fn test_pool_survives_panics() {
    let app = App::builder().build();
    let route = app.route(
        "flaky",
        vec![handler(|ctx: &mut Context| {
            if ctx.request.get_query_param("crash").is_some() {
                ctx.set("dirty", true);
                panic!("crash requested");
            }
            assert!(!ctx.contains("dirty"));
            ctx.response.write(b"fine");
        })],
    );

    assert_eq!(route.serve(Request::new(Method::GET, "/?crash=1")).status(), 500);
    let res = route.serve(Request::new(Method::GET, "/"));
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"fine");
    assert_eq!(route.pool().created(), 1);
}

#[test]
fn test_abort_renders_status_page() {
    let app = App::builder().mode(Mode::PRODUCTION).build();
    let route = app.route("missing", vec![handler(|ctx: &mut Context| ctx.abort(404))]);

    let res = route.serve(Request::default());
    assert_eq!(res.status(), 404);
    let body = String::from_utf8_lossy(res.body());
    assert!(body.starts_with("<!DOCTYPE HTML>\n<title>404 Not Found</title>"));
}

#[test]
fn test_development_status_page_lists_errors() {
    let app = App::builder().mode(Mode::DEVELOPMENT).build();
    let route = app.route(
        "invalid",
        vec![handler(|ctx: &mut Context| ctx.fail(400, "name is required"))],
    );
    let body = String::from_utf8_lossy(route.serve(Request::default()).body()).into_owned();
    assert!(body.contains("Bad Request"));
    assert!(body.contains("Error #01: name is required"));
}

#[test]
fn test_development_status_page_escapes_errors() {
    let app = App::builder().mode(Mode::DEVELOPMENT).build();
    let route = app.route(
        "search",
        vec![handler(|ctx: &mut Context| {
            let q = ctx.request.get_query_param("q").unwrap_or_default().to_string();
            ctx.fail(400, format!("bad value {q}"));
        })],
    );
    let req = Request::new(Method::GET, "/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E");
    let body = String::from_utf8_lossy(route.serve(req).body()).into_owned();
    assert!(!body.contains("<script>"));
    assert!(body.contains("bad value &lt;script&gt;alert(1)&lt;/script&gt;"));
}

#[test]
fn test_handler_body_is_kept() {
    let app = App::builder().build();
    let route = app.route(
        "teapot",
        vec![handler(|ctx: &mut Context| {
            ctx.status(418);
            ctx.response.write(b"short and stout");
        })],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.status(), 418);
    assert_eq!(res.body(), b"short and stout");
}

#[test]
fn test_success_has_no_page() {
    let app = App::builder().build();
    let route = app.route("empty", vec![handler(|ctx: &mut Context| ctx.status(204))]);
    let res = route.serve(Request::default());
    assert_eq!(res.status(), 204);
    assert!(res.body().is_empty());
    assert!(res.written());
}

#[test]
fn test_deferred_panic_is_contained() {
    let app = App::builder().mode(Mode::PRODUCTION).build();
    let route = app.route(
        "late",
        vec![handler(|ctx: &mut Context| {
            ctx.defer(|_ctx: &mut Context| panic!("cleanup failed"));
        })],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.status(), 500);
    assert!(String::from_utf8_lossy(res.body()).contains("500 Internal Server Error"));
}

#[test]
fn test_request_id_header_is_kept() {
    let app = App::builder().build();
    let route = app.route(
        "id",
        vec![handler(|ctx: &mut Context| {
            let id = ctx.request.request_id.to_string();
            ctx.response.write(id.as_bytes());
        })],
    );
    let id = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    let res = route.serve(Request::default().with_header("x-request-id", id));
    assert_eq!(res.body(), id.as_bytes());
}
