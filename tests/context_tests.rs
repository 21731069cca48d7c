use brrtcontext::app::App;
use brrtcontext::context::{handler, Context, ErrorType, ABORT_INDEX};
use brrtcontext::error::ContextError;
use brrtcontext::server::Request;
use serde_json::json;

mod common;
use common::chain::{entries, log, step, wrap};

#[test]
fn test_middleware_ordering() {
    let log = log();
    let app = App::builder().build();
    let route = app.route("order", vec![wrap(&log, "A"), step(&log, "B"), step(&log, "C")]);

    route.serve(Request::default());
    assert_eq!(entries(&log), vec!["A-before", "B", "C", "A-after"]);
}

#[test]
fn test_nested_wrappers_unwind_in_reverse() {
    let log = log();
    let app = App::builder().build();
    let route = app.route("nested", vec![wrap(&log, "A"), wrap(&log, "B"), step(&log, "C")]);

    route.serve(Request::default());
    assert_eq!(
        entries(&log),
        vec!["A-before", "B-before", "C", "B-after", "A-after"]
    );
}

#[test]
fn test_abort_short_circuits() {
    let log = log();
    let app = App::builder().build();
    let abort = {
        let log = log.clone();
        handler(move |ctx: &mut Context| {
            log.lock().unwrap().push("B".into());
            ctx.abort(401);
        })
    };
    let route = app.route("abort", vec![wrap(&log, "A"), abort, step(&log, "C")]);

    let res = route.serve(Request::default());
    assert_eq!(entries(&log), vec!["A-before", "B", "A-after"]);
    assert_eq!(res.status(), 401);
}

#[test]
fn test_wrapper_sees_abort_after_next() {
    let app = App::builder().build();
    let route = app.route(
        "observe",
        vec![
            handler(|ctx: &mut Context| {
                ctx.next();
                let aborted = ctx.is_aborted();
                ctx.response.set_header("x-aborted", aborted.to_string());
            }),
            handler(|ctx: &mut Context| ctx.abort(403)),
        ],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.get_header("x-aborted"), Some("true"));
}

#[test]
fn test_pushed_handler_runs_in_same_request() {
    let log = log();
    let app = App::builder().build();
    let pusher = {
        let log = log.clone();
        handler(move |ctx: &mut Context| {
            log.lock().unwrap().push("A".into());
            ctx.push_handler(step(&log, "late"));
        })
    };
    let route = app.route("push", vec![pusher, step(&log, "B")]);

    route.serve(Request::default());
    assert_eq!(entries(&log), vec!["A", "B", "late"]);

    // The pushed handler belongs to that request only.
    log.lock().unwrap().clear();
    route.serve(Request::default());
    assert_eq!(entries(&log), vec!["A", "B", "late"]);
}

#[test]
fn test_index_after_abort() {
    let mut ctx = Context::new(App::builder().build());
    assert_eq!(ctx.index(), -1);
    ctx.abort(0);
    assert_eq!(ctx.index(), ABORT_INDEX);
    assert_eq!(ctx.response.status(), 200);
}

#[test]
fn test_set_get() {
    let mut ctx = Context::new(App::builder().build());
    assert_eq!(
        ctx.get("user").err(),
        Some(ContextError::KeyNotFound("user".into()))
    );

    ctx.set("user", "ada".to_string());
    let user = ctx.get("user").unwrap();
    assert_eq!(user.downcast_ref::<String>().map(String::as_str), Some("ada"));
    assert_eq!(ctx.get_as::<String>("user").unwrap(), "ada");

    ctx.set("user", 7i64);
    assert_eq!(ctx.get_as::<i64>("user"), Ok(&7));
    assert_eq!(ctx.keys(), vec!["user"]);
}

#[test]
fn test_copy_is_detached() {
    let mut ctx = Context::new(App::builder().build());
    ctx.set("k", 1u8);
    ctx.push_handler(handler(|_ctx: &mut Context| {}));
    ctx.defer(|_ctx: &mut Context| {});

    let mut copy = ctx.copy();
    assert_eq!(copy.get_as::<u8>("k"), Ok(&1));
    assert_eq!(copy.handler_count(), 0);
    assert!(copy.session_released());

    copy.set("only-in-copy", true);
    assert!(!ctx.contains("only-in-copy"));
}

#[test]
fn test_errors_accumulate() {
    let mut ctx = Context::new(App::builder().build());
    ctx.error("bad input", None);
    ctx.error_typed("db down", ErrorType::INTERNAL, Some(json!({"retry": true})));
    ctx.fail(422, "validation failed");

    assert!(ctx.is_aborted());
    assert_eq!(ctx.response.status(), 422);
    assert_eq!(ctx.errors().len(), 3);
    assert_eq!(ctx.last_error(), Some("validation failed"));
    assert_eq!(ctx.errors().by_type(ErrorType::EXTERNAL).len(), 2);
    assert_eq!(
        ctx.errors().last().unwrap().meta,
        Some(json!("Operation aborted"))
    );
    assert_eq!(
        ctx.errors().messages(),
        vec!["bad input", "db down", "validation failed"]
    );
}

#[test]
fn test_deferred_run_after_chain() {
    let log = log();
    let app = App::builder().build();
    let deferring = {
        let log = log.clone();
        handler(move |ctx: &mut Context| {
            let first = log.clone();
            let second = log.clone();
            ctx.defer(move |_ctx: &mut Context| first.lock().unwrap().push("defer-1".into()));
            ctx.defer(move |_ctx: &mut Context| second.lock().unwrap().push("defer-2".into()));
            log.lock().unwrap().push("A".into());
        })
    };
    let route = app.route("defer", vec![deferring, step(&log, "B")]);

    route.serve(Request::default());
    assert_eq!(entries(&log), vec!["A", "B", "defer-1", "defer-2"]);
}

#[test]
fn test_status_and_write_header() {
    let mut ctx = Context::new(App::builder().build());
    ctx.status(201);
    assert!(!ctx.is_aborted());
    ctx.write_header(202, &[("x-trace", "1")]);
    assert!(ctx.response.written());
    assert_eq!(ctx.response.status(), 202);
    assert_eq!(ctx.response.get_header("x-trace"), Some("1"));
}
