mod support;

use std::sync::Arc;
use std::time::Duration;

use kvlink_client::{
    build, establish, CommandError, HandleState, LifecycleManager, SetupError, TopologyKind,
};

use support::{
    args_eq, bind, dead_address, serve_connections, settings, spawn_server, write_bulk,
    write_error, write_integer, write_null, write_simple,
};

#[tokio::test]
async fn standalone_set_get_roundtrip() {
    let addr = spawn_server(2, |idx, args, stream| match idx {
        0 => {
            assert!(args_eq(&args, &["SET", "alpha", "one"]));
            write_simple(stream, "OK");
        }
        1 => {
            assert!(args_eq(&args, &["GET", "alpha"]));
            write_bulk(stream, b"one");
        }
        _ => unreachable!(),
    });

    let established = establish(&settings(addr.as_str())).await.expect("establish");
    assert_eq!(established.commands.kind(), TopologyKind::Standalone);

    established.commands.set("alpha", "one").await.expect("set");
    assert_eq!(established.commands.get("alpha").await.expect("get"), "one");

    assert_eq!(established.lifecycle.teardown().await, Some(HandleState::Closed));
}

#[tokio::test]
async fn missing_key_is_not_found() {
    let addr = spawn_server(1, |_, args, stream| {
        assert!(args_eq(&args, &["GET", "nope"]));
        write_null(stream);
    });

    let established = establish(&settings(addr.as_str())).await.expect("establish");
    let err = established.commands.get("nope").await.unwrap_err();
    assert!(matches!(err, CommandError::NotFound));
    established.lifecycle.teardown().await;
}

#[tokio::test]
async fn auth_is_sent_before_first_command() {
    let addr = spawn_server(2, |idx, args, stream| match idx {
        0 => {
            assert!(args_eq(&args, &["AUTH", "s3cret"]));
            write_simple(stream, "OK");
        }
        1 => {
            assert!(args_eq(&args, &["PING"]));
            write_simple(stream, "PONG");
        }
        _ => unreachable!(),
    });

    let config = settings(addr.as_str()).with_password("s3cret");
    let established = establish(&config).await.expect("establish");
    assert_eq!(established.commands.ping().await.expect("ping"), "PONG");
    established.lifecycle.teardown().await;
}

#[tokio::test]
async fn rejected_auth_fails_startup() {
    let addr = spawn_server(1, |_, args, stream| {
        assert_eq!(args[0], b"AUTH");
        write_error(stream, "WRONGPASS invalid username-password pair");
    });

    let config = settings(addr.as_str()).with_password("wrong");
    let err = establish(&config).await.err().expect("auth should fail");
    match err {
        SetupError::Connection { target, source } => {
            assert_eq!(target, addr);
            assert!(source.is_server_reply());
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_backend_fails_startup() {
    let addr = dead_address();
    let err = establish(&settings(addr.as_str())).await.err().expect("connect should fail");
    assert!(matches!(err, SetupError::Connection { .. }));
}

#[tokio::test]
async fn invalid_settings_fail_before_dialing() {
    let err = establish(&settings("127.0.0.1:notaport")).await.err().unwrap();
    assert!(matches!(err, SetupError::InvalidPort { .. }));

    let err = establish(&settings("127.0.0.1:1,127.0.0.1:2")).await.err().unwrap();
    assert!(matches!(err, SetupError::Configuration { .. }));

    let err = establish(&settings("")).await.err().unwrap();
    assert!(matches!(err, SetupError::InvalidEndpoint { .. }));
}

#[tokio::test]
async fn expiring_set_and_delete() {
    let addr = spawn_server(3, |idx, args, stream| match idx {
        0 => {
            assert!(args_eq(&args, &["SET", "session", "abc", "EX", "30"]));
            write_simple(stream, "OK");
        }
        1 => {
            assert!(args_eq(&args, &["SET", "session", "abc", "PX", "1500"]));
            write_simple(stream, "OK");
        }
        2 => {
            assert!(args_eq(&args, &["DEL", "session"]));
            write_integer(stream, 1);
        }
        _ => unreachable!(),
    });

    let established = establish(&settings(addr.as_str())).await.expect("establish");
    let commands = &established.commands;
    commands
        .set_ex("session", "abc", Duration::from_secs(30))
        .await
        .expect("set ex");
    commands
        .set_ex("session", "abc", Duration::from_millis(1500))
        .await
        .expect("set px");
    assert!(commands.delete("session").await.expect("del"));
    established.lifecycle.teardown().await;
}

#[tokio::test]
async fn server_error_reply_is_surfaced() {
    let addr = spawn_server(1, |_, _, stream| {
        write_error(stream, "WRONGTYPE Operation against a key holding the wrong kind of value");
    });

    let established = establish(&settings(addr.as_str())).await.expect("establish");
    match established.commands.get("list").await {
        Err(CommandError::Server { message }) => assert!(message.starts_with("WRONGTYPE")),
        other => panic!("unexpected reply {:?}", other),
    }
    established.lifecycle.teardown().await;
}

#[tokio::test]
async fn teardown_is_idempotent_and_closes_commands() {
    let addr = spawn_server(1, |_, _, stream| write_simple(stream, "OK"));

    let established = establish(&settings(addr.as_str())).await.expect("establish");
    established.commands.set("k", "v").await.expect("set");

    assert_eq!(established.lifecycle.state(), Some(HandleState::Open));
    assert_eq!(established.lifecycle.teardown().await, Some(HandleState::Closed));
    assert_eq!(established.lifecycle.teardown().await, Some(HandleState::Closed));

    let err = established.commands.get("k").await.unwrap_err();
    assert!(matches!(err, CommandError::Closed));
}

#[tokio::test]
async fn lifecycle_registers_exactly_one_handle() {
    let lifecycle = LifecycleManager::new();
    assert_eq!(lifecycle.state(), None);
    assert_eq!(lifecycle.teardown().await, None);

    let first_addr = spawn_server(0, |_, _, _| {});
    let second_addr = spawn_server(0, |_, _, _| {});
    let first = build(&settings(first_addr.as_str()).resolve().unwrap())
        .await
        .expect("first build");
    let second = build(&settings(second_addr.as_str()).resolve().unwrap())
        .await
        .expect("second build");

    lifecycle.register(Arc::new(first)).expect("first registration");
    let second = Arc::new(second);
    let err = lifecycle.register(second.clone()).unwrap_err();
    assert!(matches!(err, SetupError::Configuration { .. }));

    assert_eq!(lifecycle.teardown().await, Some(HandleState::Closed));
    assert_eq!(second.state(), HandleState::Open);
    assert_eq!(second.teardown().await, HandleState::Closed);
}

#[tokio::test]
async fn dropped_socket_is_redialed_on_next_command() {
    let (listener, addr) = bind();
    // First connection hangs up without answering; the second one serves.
    serve_connections(listener, vec![1, 1], |conn_idx, _, args, stream| {
        assert!(args_eq(&args, &["GET", "k"]));
        if conn_idx == 1 {
            write_bulk(stream, b"v");
        }
    });

    let established = establish(&settings(addr.as_str())).await.expect("establish");

    let err = established.commands.get("k").await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {:?}", err);
    assert_eq!(established.commands.get("k").await.expect("redialed get"), "v");
    established.lifecycle.teardown().await;
}
