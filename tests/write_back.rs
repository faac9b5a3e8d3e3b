//! Stale-rev and closed-session cases for the check write-back engine
//! (`omniman::engines::write_back::apply_check_result`), referenced from
//! `src/engines/write_back.rs`.

mod support;

use omniman::engines::write_back::apply_check_result;
use omniman::models::session::Issue;

#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn writes_back_a_check_result_on_a_matching_rev() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("wb_ok");
    support::ensure_channel(&pool, &channel, "internal", "open", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    let applied = apply_check_result(
        &ctx,
        &channel,
        &session_key,
        0,
        "stock",
        serde_json::json!({ "available": true }),
        vec![],
    )
    .await
    .expect("apply_check_result");

    assert!(applied);

    let repo = omniman::repo::SessionRepo::new(pool);
    let session = repo.find(&channel, &session_key).await.expect("find").expect("session exists");
    assert!(session.data.checks.contains_key("stock"));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn rejects_a_check_result_computed_against_a_stale_rev() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("wb_stale");
    support::ensure_channel(&pool, &channel, "internal", "open", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    // The session is at rev 0; a check computed against rev 5 is stale and
    // must be silently dropped rather than applied.
    let applied = apply_check_result(
        &ctx,
        &channel,
        &session_key,
        5,
        "stock",
        serde_json::json!({ "available": true }),
        vec![],
    )
    .await
    .expect("apply_check_result");

    assert!(!applied);

    let repo = omniman::repo::SessionRepo::new(pool);
    let session = repo.find(&channel, &session_key).await.expect("find").expect("session exists");
    assert!(!session.data.checks.contains_key("stock"));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL running"]
async fn rejects_a_check_result_against_a_committed_session() {
    let ctx = support::test_ctx().await;
    let pool = ctx.db.pool().clone();
    let channel = support::unique_code("wb_closed");
    support::ensure_channel(&pool, &channel, "internal", "open", serde_json::json!({})).await;
    let session_key = support::open_session(&pool, &channel, "internal", "open").await;

    omniman::engines::modify::modify_session(
        &ctx,
        &channel,
        &session_key,
        &[omniman::ops::Op::AddLine {
            sku: "COFFEE".to_string(),
            qty: serde_json::json!(1),
            unit_price_q: Some(500),
            meta: None,
            name: None,
        }],
    )
    .await
    .expect("add line");

    let idem_key = omniman::ids::generate_idempotency_key();
    omniman::engines::commit::commit(&ctx, &channel, &session_key, &idem_key)
        .await
        .expect("commit");

    let applied = apply_check_result(
        &ctx,
        &channel,
        &session_key,
        1,
        "stock",
        serde_json::json!({ "available": true }),
        vec![Issue {
            id: "ISS-IGNOREDIGN".to_string(),
            source: "stock".to_string(),
            code: "out_of_stock".to_string(),
            blocking: true,
            message: "too late, already committed".to_string(),
            context: Default::default(),
        }],
    )
    .await
    .expect("apply_check_result");

    assert!(!applied, "a committed session must reject late check write-backs");
}
