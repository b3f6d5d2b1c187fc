//! Refresh-and-replay behaviour of `SessionClient` against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use session::testing::{FakeBackend, RecordingNavigator};
use session::{
    ApiResponse, Attempt, Error, LoginRedirect, RefreshState, RequestSpec, SessionClient,
    UserProfile, endpoints,
};
use tokio::task::{JoinHandle, JoinSet};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn customer() -> UserProfile {
    serde_json::from_value(json!({
        "id": 42,
        "fullName": "Pham Thi D",
        "email": "d@example.com",
        "roles": ["CUSTOMER"],
        "verified": true
    }))
    .unwrap()
}

struct Harness {
    backend: Arc<FakeBackend>,
    navigator: Arc<RecordingNavigator>,
    client: Arc<SessionClient>,
}

fn harness() -> Harness {
    init_tracing();
    let backend = Arc::new(FakeBackend::new());
    let navigator = Arc::new(RecordingNavigator::new());
    let client = Arc::new(SessionClient::with_transport(
        backend.clone(),
        navigator.clone(),
        endpoints::LOGIN_ROUTE,
    ));
    Harness {
        backend,
        navigator,
        client,
    }
}

/// Harness whose client has already restored a signed-in session.
async fn signed_in() -> Harness {
    let h = harness();
    h.backend.sign_in(customer());
    let restored = h.client.restore_session().await.unwrap();
    assert_eq!(restored, Some(customer()));
    h
}

#[tokio::test]
async fn concurrent_expired_requests_share_one_refresh() -> anyhow::Result<()> {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.set_refresh_delay(Duration::from_millis(20));

    let orders = RequestSpec::get("/orders");
    let me = RequestSpec::get(endpoints::CURRENT_USER);
    let product = RequestSpec::get("/products/5");
    let (orders, me, product) = tokio::join!(
        h.client.request(&orders),
        h.client.request(&me),
        h.client.request(&product),
    );

    assert_eq!(orders?.body["path"], "/orders");
    assert_eq!(me?.body["email"], "d@example.com");
    assert_eq!(product?.body["path"], "/products/5");
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);

    let refreshed = h.backend.current_access();
    for path in ["/orders", "/products/5"] {
        let sent: Vec<_> = h.backend.sent().into_iter().filter(|r| r.path == path).collect();
        assert_eq!(sent.len(), 2, "{path} should be sent once and replayed once");
        assert_ne!(sent[0].access, Some(refreshed));
        assert_eq!(sent[1].access, Some(refreshed));
    }

    assert_eq!(h.client.refresh_state(), RefreshState::Idle);
    assert_eq!(h.navigator.count(), 0);
    assert_eq!(h.client.session().current_user, Some(customer()));
    Ok(())
}

#[tokio::test]
async fn large_burst_makes_exactly_one_refresh() {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.set_refresh_delay(Duration::from_millis(10));

    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let client = Arc::clone(&h.client);
        tasks.spawn(async move { client.request(&RequestSpec::get(format!("/products/{i}"))).await });
    }

    while let Some(result) = tasks.join_next().await {
        let response = result.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn replay_attempt_never_enters_refresh() {
    let h = signed_in().await;
    h.backend.expire_access();

    let err = h
        .client
        .request_with_attempt(&RequestSpec::get("/orders"), Attempt::Replay)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(h.backend.calls("/orders"), 1);
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 0);
    assert_eq!(h.client.session().current_user, Some(customer()));
}

#[tokio::test]
async fn second_401_after_replay_is_returned_as_is() {
    let h = signed_in().await;
    h.backend.expire_access();
    // Authorised requests to this path still get a 401 (e.g. a revoked role).
    h.backend.respond("/admin/reports", 401, json!({"message": "Forbidden area"}));

    let err = h
        .client
        .request(&RequestSpec::get("/admin/reports"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Resource {
            status: 401,
            message: "Forbidden area".into()
        }
    );
    assert_eq!(h.backend.calls("/admin/reports"), 2);
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn refresh_endpoint_request_does_not_recurse() {
    let h = signed_in().await;
    h.backend.revoke_refresh();

    let err = h
        .client
        .request(&RequestSpec::post(endpoints::REFRESH_TOKEN))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.navigator.count(), 0);
    assert!(h.client.session().is_authenticated());
}

#[tokio::test]
async fn refresh_rejection_tears_down_session_once() {
    let h = signed_in().await;
    h.client.set_location("/orders");
    h.backend.expire_access();
    h.backend.revoke_refresh();
    h.backend.set_refresh_delay(Duration::from_millis(10));

    let orders = RequestSpec::get("/orders");
    let me = RequestSpec::get(endpoints::CURRENT_USER);
    let product = RequestSpec::get("/products/5");
    let (a, b, c) = tokio::join!(
        h.client.request(&orders),
        h.client.request(&me),
        h.client.request(&product),
    );

    let a = a.unwrap_err();
    assert!(a.is_auth_expired(), "unexpected error: {a:?}");
    assert_eq!(b.unwrap_err(), a);
    assert_eq!(c.unwrap_err(), a);
    assert_eq!(a.user_message(), "Refresh token is invalid or expired");

    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.backend.calls("/orders"), 1, "failed requests are not replayed");
    assert_eq!(h.client.session().current_user, None);
    assert_eq!(
        h.navigator.redirects(),
        vec![LoginRedirect {
            to: "/auth/login".into(),
            from: Some("/orders".into()),
        }]
    );
}

#[tokio::test]
async fn dropped_leader_hands_refresh_to_parked_request() {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.set_refresh_delay(Duration::from_millis(100));

    let leader = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move {
            let orders = RequestSpec::get("/orders");
            tokio::time::timeout(Duration::from_millis(20), client.request(&orders)).await
        })
    };
    while h.client.refresh_state() != RefreshState::Refreshing {
        tokio::task::yield_now().await;
    }
    let waiter = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.request(&RequestSpec::get("/products/5")).await })
    };

    assert!(leader.await.unwrap().is_err(), "leader should time out mid-refresh");
    let response = waiter.await.unwrap().unwrap();

    assert_eq!(response.body["path"], "/products/5");
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 2);
    assert_eq!(h.navigator.count(), 0);
    assert!(h.client.session().is_authenticated());
    assert!(!h.client.session().auth_loading);
    assert_eq!(h.client.refresh_state(), RefreshState::Idle);

    // Nothing was recorded as failed: later requests go straight through.
    let next = h.client.request(&RequestSpec::get("/orders")).await.unwrap();
    assert_eq!(next.status, 200);
}

/// Sends a request to `path` that reaches the backend now but whose 401 is
/// only delivered once the backend releases it.
async fn send_held(
    h: &Harness,
    path: &'static str,
) -> JoinHandle<session::Result<ApiResponse>> {
    h.backend.hold(path);
    let client = Arc::clone(&h.client);
    let handle = tokio::spawn(async move { client.request(&RequestSpec::get(path)).await });
    while h.backend.calls(path) == 0 {
        tokio::task::yield_now().await;
    }
    handle
}

#[tokio::test]
async fn late_401_replays_after_settled_refresh() -> anyhow::Result<()> {
    let h = signed_in().await;
    h.backend.expire_access();
    let late = send_held(&h, "/orders/7").await;

    let first = h.client.request(&RequestSpec::get("/orders")).await?;
    assert_eq!(first.status, 200);
    assert_eq!(h.client.refresh_state(), RefreshState::Idle);

    h.backend.release("/orders/7");
    let response = late.await??;

    assert_eq!(response.body["path"], "/orders/7");
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    let sent: Vec<_> = h
        .backend
        .sent()
        .into_iter()
        .filter(|r| r.path == "/orders/7")
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].access, Some(h.backend.current_access()));
    Ok(())
}

#[tokio::test]
async fn late_401_replays_once_even_if_access_expired_again() {
    let h = signed_in().await;
    h.backend.expire_access();
    let late = send_held(&h, "/orders/7").await;

    h.client.request(&RequestSpec::get("/orders")).await.unwrap();
    h.backend.expire_access();
    h.backend.release("/orders/7");
    let err = late.await.unwrap().unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.backend.calls("/orders/7"), 2);
    assert!(h.client.session().is_authenticated());

    // A request sent under the new generation refreshes normally.
    h.client.request(&RequestSpec::get("/orders")).await.unwrap();
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 2);
}

#[tokio::test]
async fn late_401_after_failed_refresh_shares_the_failure() {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.revoke_refresh();
    let late = send_held(&h, "/orders/7").await;

    let err = h
        .client
        .request(&RequestSpec::get("/orders"))
        .await
        .unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(h.navigator.count(), 1);

    h.backend.release("/orders/7");
    let late_err = late.await.unwrap().unwrap_err();

    assert_eq!(late_err, err);
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 1);
    assert_eq!(h.backend.calls("/orders/7"), 1);
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn network_failure_during_refresh_counts_as_refresh_failure() {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.fail_refresh_with_network_error();

    let err = h
        .client
        .request(&RequestSpec::get("/orders"))
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::AuthExpired(m) if m.contains("unreachable")));
    assert_eq!(h.client.session().current_user, None);
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn direct_refresh_reports_failure_kind() {
    let h = signed_in().await;

    h.client.refresh().await.unwrap();

    h.backend.revoke_refresh();
    assert!(h.client.refresh().await.unwrap_err().is_auth_expired());

    h.backend.fail_refresh_with_network_error();
    assert!(h.client.refresh().await.unwrap_err().is_network());

    // The raw call never tears the session down.
    assert_eq!(h.navigator.count(), 0);
    assert!(h.client.session().is_authenticated());
}

#[tokio::test]
async fn resource_errors_pass_through_without_refresh() {
    let h = signed_in().await;
    h.backend
        .respond("/products/99", 404, json!({"message": "Sản phẩm không tồn tại"}));

    let err = h
        .client
        .request(&RequestSpec::get("/products/99"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Resource {
            status: 404,
            message: "Sản phẩm không tồn tại".into()
        }
    );
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 0);
    assert!(h.client.session().is_authenticated());
}

#[tokio::test]
async fn transport_errors_do_not_tear_down() {
    let h = signed_in().await;
    h.backend.fail_network("/orders");

    let err = h
        .client
        .request(&RequestSpec::get("/orders"))
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(h.backend.calls(endpoints::REFRESH_TOKEN), 0);
    assert_eq!(h.navigator.count(), 0);
    assert!(h.client.session().is_authenticated());
}

#[tokio::test]
async fn auth_loading_is_set_while_refresh_is_in_flight() {
    let h = signed_in().await;
    h.backend.expire_access();
    h.backend.set_refresh_delay(Duration::from_millis(50));
    let mut rx = h.client.subscribe();
    assert!(!rx.borrow().auth_loading);

    let client = Arc::clone(&h.client);
    let task = tokio::spawn(async move { client.request(&RequestSpec::get("/orders")).await });

    rx.wait_for(|s| s.auth_loading).await.unwrap();
    assert_eq!(h.client.refresh_state(), RefreshState::Refreshing);

    task.await.unwrap().unwrap();
    assert!(!h.client.session().auth_loading);
    assert_eq!(h.client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn typed_json_helpers_decode_bodies() {
    let h = signed_in().await;
    h.backend.respond(
        "/categories",
        200,
        json!([{"id": 1, "name": "iPhone"}, {"id": 2, "name": "Samsung"}]),
    );

    #[derive(Debug, serde::Deserialize)]
    struct Category {
        id: u32,
        name: String,
    }

    let categories: Vec<Category> = h.client.get_json("/categories").await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].id, 2);
    assert_eq!(categories[1].name, "Samsung");

    let err = h.client.get_json::<Vec<Category>>("/orders").await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}
