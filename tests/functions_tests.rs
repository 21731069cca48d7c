use brrtcontext::app::App;
use brrtcontext::context::{handler, Context};
use brrtcontext::error::RegistryError;
use brrtcontext::functions::{
    arg, CallOutput, ExtensionFn, FunctionRegistry, ReturnSpec, Signature, FLASHES_KEY,
};
use brrtcontext::runtime_config::RuntimeConfig;
use brrtcontext::server::{Cookie, Request};

mod common;
use common::sessions::{cookie_manager, follow_up};

fn ctx() -> Context {
    Context::new(App::builder().build())
}

#[test]
fn test_two_value_signature_is_rejected() {
    let mut registry = FunctionRegistry::new();
    let pair = ExtensionFn::new(
        Signature {
            returns: vec![ReturnSpec::value::<i64>(), ReturnSpec::value::<i64>()],
            ..Signature::default()
        },
        |_ctx, _args| CallOutput::value((1i64, 2i64)),
    );
    assert_eq!(
        registry.register("pair", pair),
        Err(RegistryError::InvalidSignature {
            name: "pair".into()
        })
    );
    assert!(!registry.contains("pair"));
}

#[test]
fn test_typed_function_checks_argument_types() {
    let mut registry = FunctionRegistry::new();
    registry
        .register(
            "describe",
            ExtensionFn::try_fn1(|_ctx: &mut Context, n: i64| {
                anyhow::Ok(format!("n={n}"))
            }),
        )
        .unwrap();

    let mut c = ctx();
    let out = registry.call(&mut c, "describe", vec![arg(5i64)]).unwrap();
    assert_eq!(out.into_result::<String>().unwrap(), "n=5");

    let err = registry
        .call(&mut c, "describe", vec![arg("five")])
        .unwrap_err();
    assert!(matches!(err, RegistryError::TypeMismatch { index: 0, .. }));
}

#[test]
fn test_arity_and_unknown() {
    let mut registry = FunctionRegistry::new();
    registry
        .register("add", ExtensionFn::fn2(|_ctx, a: i64, b: i64| a + b))
        .unwrap();
    let mut c = ctx();

    assert_eq!(
        registry
            .call(&mut c, "add", vec![arg(1i64)])
            .unwrap_err(),
        RegistryError::ArityMismatch {
            name: "add".into(),
            expected: "2".into(),
            got: 1
        }
    );
    assert_eq!(
        registry.call(&mut c, "nope", Vec::new()).unwrap_err(),
        RegistryError::UnknownFunction("nope".into())
    );
    let out = registry
        .call(&mut c, "add", vec![arg(2i64), arg(3i64)])
        .unwrap();
    assert_eq!(out.value_as::<i64>(), Some(&5));
}

#[test]
fn test_duplicate_registration() {
    let mut registry = FunctionRegistry::with_builtins();
    let err = registry
        .register("redirect", ExtensionFn::fn0(|_ctx| ()))
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateFunction("redirect".into()));
}

#[test]
fn test_variadic() {
    let mut registry = FunctionRegistry::new();
    registry
        .register(
            "join",
            ExtensionFn::variadic(|_ctx, parts: Vec<String>| anyhow::Ok(parts.join("/"))),
        )
        .unwrap();
    let mut c = ctx();

    let out = registry.call(&mut c, "join", Vec::new()).unwrap();
    assert_eq!(out.into_result::<String>().unwrap(), "");

    let out = registry
        .call(&mut c, "join", vec![arg("a".to_string()), arg("b".to_string())])
        .unwrap();
    assert_eq!(out.into_result::<String>().unwrap(), "a/b");

    let err = registry
        .call(&mut c, "join", vec![arg("a".to_string()), arg(1u8)])
        .unwrap_err();
    assert!(matches!(err, RegistryError::TypeMismatch { index: 1, .. }));
}

#[test]
fn test_error_value_is_returned() {
    let mut registry = FunctionRegistry::new();
    registry
        .register(
            "parse",
            ExtensionFn::try_fn1(|_ctx, s: String| s.parse::<u32>()),
        )
        .unwrap();
    let mut c = ctx();
    let out = registry
        .call(&mut c, "parse", vec![arg("x".to_string())])
        .unwrap();
    assert!(!out.is_ok());
    assert!(out.into_result::<u32>().is_err());
}

#[test]
fn test_custom_functions_reach_context() {
    let mut registry = FunctionRegistry::with_builtins();
    registry
        .register(
            "tag",
            ExtensionFn::fn1(|ctx: &mut Context, value: String| {
                ctx.response.set_header("x-tag", value)
            }),
        )
        .unwrap();
    let app = App::builder().functions(registry).build();
    let route = app.route(
        "tagged",
        vec![handler(|ctx: &mut Context| {
            let out = ctx.call("tag", vec![arg("blue".to_string())]).unwrap();
            assert_eq!(out.value_as::<bool>(), Some(&true));
        })],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.get_header("x-tag"), Some("blue"));
}

#[test]
fn test_redirect_builtin() {
    let app = App::builder().build();
    let route = app.route(
        "go",
        vec![handler(|ctx: &mut Context| {
            let out = ctx
                .call("redirect", vec![arg(302u16), arg("/login".to_string())])
                .unwrap();
            assert!(out.is_ok());
        })],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.status(), 302);
    assert_eq!(res.get_header("location"), Some("/login"));
    assert!(res.written());
}

#[test]
fn test_redirect_rejects_non_3xx() {
    let mut c = ctx();
    assert!(c.redirect(200, "/").is_err());
    assert!(c.redirect(309, "/").is_err());
    assert!(!c.response.written());
}

#[test]
fn test_redirect_releases_session_first() {
    let app = App::builder()
        .config(RuntimeConfig {
            session_gc: false,
            ..RuntimeConfig::default()
        })
        .sessions(cookie_manager())
        .build();
    let route = app.route(
        "login",
        vec![handler(|ctx: &mut Context| {
            ctx.session()
                .unwrap()
                .set("user", brrtcontext::SessionValue::from("ada"));
            ctx.redirect(303, "/home").unwrap();
            assert!(ctx.session_released());
        })],
    );
    let res = route.serve(Request::default());
    assert_eq!(res.status(), 303);
    let cookie = res.cookie(common::sessions::COOKIE).unwrap();
    assert!(cookie.value.len() > 40, "cookie carries the encoded session");
}

#[test]
fn test_serve_data_builtin() {
    let mut c = ctx();
    c.serve_data(201, b"plain body").unwrap();
    assert_eq!(c.response.status(), 201);
    assert_eq!(c.response.get_header("content-type"), Some("text/plain"));
    assert_eq!(c.response.body(), b"plain body");
}

#[test]
fn test_flash_needs_session() {
    let mut c = ctx();
    assert!(c.flash("info", "hello").is_err());
}

#[test]
fn test_flash_messages_across_requests() {
    let app = App::builder()
        .config(RuntimeConfig {
            session_gc: false,
            ..RuntimeConfig::default()
        })
        .sessions(cookie_manager())
        .build();
    let post = app.route(
        "post",
        vec![handler(|ctx: &mut Context| {
            ctx.flash("info", "saved").unwrap();
            ctx.flash("warn", "quota low").unwrap();
            ctx.flash("info", "mailed").unwrap();
        })],
    );
    let show = app.route(
        "show",
        vec![handler(|ctx: &mut Context| {
            let info = ctx.flash_messages(&["info".to_string()]).unwrap();
            ctx.response.set_header("x-info", info.join("|"));
            let rest = ctx.all_flash_messages().unwrap();
            let warn = rest.get("warn").cloned().unwrap_or_default();
            ctx.response.set_header("x-warn", warn.join("|"));
            assert!(ctx.session().unwrap().get(FLASHES_KEY).is_none());
        })],
    );
    let again = app.route(
        "again",
        vec![handler(|ctx: &mut Context| {
            let all = ctx.all_flash_messages().unwrap();
            ctx.response.set_header("x-count", all.len().to_string());
        })],
    );

    let first = post.serve(Request::default());
    let second = show.serve(follow_up(&first));
    assert_eq!(second.get_header("x-info"), Some("saved|mailed"));
    assert_eq!(second.get_header("x-warn"), Some("quota low"));

    let third = again.serve(follow_up(&second));
    assert_eq!(third.get_header("x-count"), Some("0"));
}

#[test]
fn test_cookie_builtins_registered() {
    let registry = FunctionRegistry::with_builtins();
    for name in ["cookie", "cookies", "read_cookies"] {
        assert!(registry.contains(name), "{name} missing");
    }
}

#[test]
fn test_cookie_builtin_sanitizes_and_sets_attributes() {
    let app = App::builder().build();
    let route = app.route(
        "prefs",
        vec![handler(|ctx: &mut Context| {
            let cookie = Cookie {
                path: Some("/".into()),
                max_age: Some(60),
                http_only: true,
                ..Cookie::new("the\nme", "dark;\nmode")
            };
            let out = ctx.call("cookie", vec![arg(false), arg(cookie)]).unwrap();
            assert!(out.is_ok());
        })],
    );
    let res = route.serve(Request::default());
    let cookie = res.cookie("the-me").unwrap();
    assert_eq!(cookie.value, "dark  mode");
    assert_eq!(cookie.max_age, Some(60));
    assert_eq!(cookie.path.as_deref(), Some("/"));
    assert!(cookie.http_only);
}

#[test]
fn test_secure_cookie_round_trip() {
    let app = App::builder().secret_key("cookie-secret").build();
    let login = app.route(
        "login",
        vec![handler(|ctx: &mut Context| {
            ctx.secure_cookie(Cookie::new("user", "ada")).unwrap();
        })],
    );
    let whoami = app.route(
        "whoami",
        vec![handler(|ctx: &mut Context| {
            let raw = ctx.cookies();
            let read = ctx.read_cookies();
            assert_ne!(raw["user"], "ada");
            assert_eq!(read["user"], "ada");
            assert_eq!(read["theme"], "dark");
            assert_eq!(read["forged"], "");
            ctx.status(204);
        })],
    );

    let signed = login.serve(Request::default()).cookie("user").unwrap().value;
    assert_eq!(signed.split('|').count(), 3);

    let header = format!("user={signed}; theme=dark; forged=YWRh|1700000000|00ff");
    let res = whoami.serve(Request::default().with_header("cookie", header));
    assert_eq!(res.status(), 204);
}

#[test]
fn test_cookie_is_not_trusted_under_another_secret() {
    let signer = App::builder().secret_key("first").build();
    let route = signer.route(
        "sign",
        vec![handler(|ctx: &mut Context| {
            ctx.secure_cookie(Cookie::new("user", "ada")).unwrap();
        })],
    );
    let signed = route.serve(Request::default()).cookie("user").unwrap().value;

    let mut c = Context::new(App::builder().secret_key("second").build());
    c.request = Request::default().with_header("cookie", format!("user={signed}"));
    assert_eq!(c.read_cookies()["user"], "");
}

#[test]
fn test_cookie_errors() {
    let mut c = ctx();
    assert!(c.secure_cookie(Cookie::new("user", "ada")).is_err());
    assert!(c.response.cookie("user").is_none());

    c.response.write(b"body");
    assert!(c.cookie(Cookie::new("late", "1")).is_err());
}
