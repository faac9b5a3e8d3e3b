//! End-to-end scenarios against a live Postgres, exercising the engines the
//! way the HTTP gateway drives them: modify -> (check write-back) -> resolve
//! -> commit -> order transition.

mod support;

use chrono::Utc;
use omniman::engines::{commit, modify::modify_session, resolve, write_back};
use omniman::models::session::{Issue, IssueAction, IssueContext};
use omniman::ops::Op;

fn add_coffee(qty: i64, unit_price_q: i64) -> Op {
    Op::AddLine {
        sku: "COFFEE".to_string(),
        qty: serde_json::json!(qty),
        unit_price_q: Some(unit_price_q),
        meta: None,
        name: None,
    }
}

/// S1: open a session, add a line, commit with no required checks, and land
/// on a sealed order with the expected total.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s1_happy_path_from_open_session_to_sealed_order() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s1");
    support::ensure_channel(&pool, &channel, "internal", "open", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    let session = modify_session(&ctx, &channel, &session_key, &[add_coffee(3, 500)])
        .await
        .expect("modify");
    assert_eq!(session.pricing.total_q, 1500);
    assert_eq!(session.rev, 1);

    let idem_key = omniman::ids::generate_idempotency_key();
    let body = commit::commit(&ctx, &channel, &session_key, &idem_key).await.expect("commit");
    let order_ref = body["order_ref"].as_str().expect("order_ref").to_string();

    let order_repo = omniman::repo::OrderRepo::new(pool.clone());
    let order = order_repo.find_by_ref(&order_ref).await.expect("find").expect("order exists");
    assert_eq!(order.total_q, 1500);
    assert_eq!(order.status(), omniman::models::order::OrderStatus::New);

    // Committing again with the same idempotency key must return the same
    // order rather than erroring or creating a second one.
    let replay = commit::commit(&ctx, &channel, &session_key, &idem_key).await.expect("replay commit");
    assert_eq!(replay["order_ref"], body["order_ref"]);
}

/// S2: a stock check raises a blocking issue; committing is refused until the
/// issue is resolved by swapping in the substitute SKU its action carries.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s2_stock_issue_blocks_commit_until_resolved() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s2");
    support::ensure_channel(&pool, &channel, "internal", "open", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    let session = modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.expect("modify");
    let line_id = session.items[0].line_id.clone();

    let action = IssueAction {
        id: "ACT-SUBSTITUT".to_string(),
        label: "Substitute with decaf".to_string(),
        rev: session.rev,
        ops: vec![serde_json::json!({
            "op": "replace_sku",
            "line_id": line_id,
            "sku": "DECAF",
            "unit_price_q": 500,
        })],
    };
    let issue = Issue {
        id: "ISS-OUTOFSTOCK".to_string(),
        source: "stock".to_string(),
        code: "out_of_stock".to_string(),
        blocking: true,
        message: "COFFEE is out of stock".to_string(),
        context: IssueContext {
            line_id: Some(line_id.clone()),
            sku: Some("COFFEE".to_string()),
            actions: vec![action],
            extra: Default::default(),
        },
    };

    let applied = write_back::apply_check_result(
        &ctx,
        &channel,
        &session_key,
        session.rev,
        "stock",
        serde_json::json!({ "available": false }),
        vec![issue],
    )
    .await
    .expect("apply_check_result");
    assert!(applied);

    let idem_key = omniman::ids::generate_idempotency_key();
    let blocked = commit::commit(&ctx, &channel, &session_key, &idem_key).await;
    assert!(matches!(blocked, Err(e) if e.code() == "blocking_issues"));

    let resolved = resolve::resolve(&ctx, &channel, &session_key, "ISS-OUTOFSTOCK", "ACT-SUBSTITUT", serde_json::Value::Null)
        .await
        .expect("resolve");
    assert_eq!(resolved.items[0].sku, "DECAF");
    assert!(resolved.data.issues.is_empty(), "resolving must clear the issue it acted on");

    let idem_key2 = omniman::ids::generate_idempotency_key();
    commit::commit(&ctx, &channel, &session_key, &idem_key2).await.expect("commit after resolve");
}

/// S3: a required check computed against an earlier rev is stale once the
/// session has been modified again, and commit must reject it.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s3_stale_check_rejects_commit() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s3");
    support::ensure_channel(
        &pool,
        &channel,
        "internal",
        "open",
        serde_json::json!({ "required_checks_on_commit": ["stock"] }),
    )
    .await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    let session = modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.expect("modify");

    write_back::apply_check_result(
        &ctx,
        &channel,
        &session_key,
        session.rev,
        "stock",
        serde_json::json!({ "available": true }),
        vec![],
    )
    .await
    .expect("apply_check_result");

    // A second modify bumps rev again; the stock check above is now stale.
    modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.expect("second modify");

    let idem_key = omniman::ids::generate_idempotency_key();
    let err = commit::commit(&ctx, &channel, &session_key, &idem_key).await.unwrap_err();
    assert_eq!(err.code(), "missing_check", "modify clears stale checks entirely, so commit sees it as missing");
}

/// S4: a stock hold whose `hold_expires_at` has already passed must block
/// commit even though the check itself is fresh.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s4_expired_hold_blocks_commit() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s4");
    support::ensure_channel(
        &pool,
        &channel,
        "internal",
        "open",
        serde_json::json!({ "required_checks_on_commit": ["stock"] }),
    )
    .await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    let session = modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.expect("modify");

    write_back::apply_check_result(
        &ctx,
        &channel,
        &session_key,
        session.rev,
        "stock",
        serde_json::json!({ "hold_expires_at": "2020-01-01T00:00:00Z" }),
        vec![],
    )
    .await
    .expect("apply_check_result");

    let idem_key = omniman::ids::generate_idempotency_key();
    let err = commit::commit(&ctx, &channel, &session_key, &idem_key).await.unwrap_err();
    assert_eq!(err.code(), "hold_expired");
}

/// S5: a locked channel (contents managed by an external platform) refuses
/// every modify, regardless of the op.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s5_locked_channel_rejects_modify() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s5");
    support::ensure_channel(&pool, &channel, "internal", "locked", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "locked").await;

    let err = modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.unwrap_err();
    assert_eq!(err.code(), "locked");
}

/// S6: a channel with a custom order-flow graph enforces its own transitions
/// (and terminal set) rather than the kernel defaults, end to end through
/// the repository layer.
#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn s6_channel_order_flow_override_is_enforced_through_commit() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("s6");
    support::ensure_channel(
        &pool,
        &channel,
        "internal",
        "open",
        serde_json::json!({
            "order_flow": {
                "transitions": { "new": ["processing"], "processing": ["completed"] },
                "terminal_statuses": ["completed"],
            }
        }),
    )
    .await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    modify_session(&ctx, &channel, &session_key, &[add_coffee(1, 500)]).await.expect("modify");
    let idem_key = omniman::ids::generate_idempotency_key();
    let body = commit::commit(&ctx, &channel, &session_key, &idem_key).await.expect("commit");
    let order_ref = body["order_ref"].as_str().unwrap().to_string();

    let order_repo = omniman::repo::OrderRepo::new(pool.clone());
    let channel_repo = omniman::repo::ChannelRepo::new(pool.clone());
    let mut order = order_repo.find_by_ref(&order_ref).await.expect("find").expect("order exists");
    let channel_row = channel_repo.find_by_code(&channel).await.expect("find channel").expect("channel exists");
    let flow = omniman::order_state::OrderFlow::for_channel(&channel_row.config);

    // The kernel default graph allows new -> confirmed, but this channel's
    // override does not.
    let err =
        omniman::order_state::transition_status(&flow, &mut order, omniman::models::order::OrderStatus::Confirmed, Utc::now())
            .unwrap_err();
    assert_eq!(err.code(), "invalid_transition");

    omniman::order_state::transition_status(&flow, &mut order, omniman::models::order::OrderStatus::Processing, Utc::now())
        .expect("new -> processing allowed by override");
    omniman::order_state::transition_status(&flow, &mut order, omniman::models::order::OrderStatus::Completed, Utc::now())
        .expect("processing -> completed allowed by override");
}
