//! Check write-back engine (component F): the narrow, rev-gated channel
//! through which asynchronous workers post check results back onto a
//! session. Returning `false` here is not an error — it's the expected
//! outcome when a worker finishes against a session that has since moved
//! on, and the caller decides how to react.

use crate::ctx::EngineCtx;
use crate::models::session::{CheckEntry, Issue, SessionState};
use chrono::Utc;

pub async fn apply_check_result(
    ctx: &EngineCtx,
    channel_code: &str,
    session_key: &str,
    expected_rev: i64,
    check_code: &str,
    check_payload: serde_json::Value,
    issues: Vec<Issue>,
) -> Result<bool, crate::error::EngineError> {
    let session_repo = crate::repo::SessionRepo::new(ctx.db.pool().clone());

    let mut tx = ctx.db.pool().begin().await?;
    let Some(mut session) = session_repo.find_for_update(&mut tx, channel_code, session_key).await? else {
        return Ok(false);
    };

    if session.rev != expected_rev {
        return Ok(false);
    }
    if session.state != SessionState::Open {
        return Ok(false);
    }

    session.data.checks.insert(
        check_code.to_string(),
        CheckEntry {
            rev: session.rev,
            at: Utc::now(),
            result: check_payload,
        },
    );
    session.data.issues.retain(|i| i.source != check_code);
    session.data.issues.extend(issues);
    session.updated_at = Utc::now();

    session_repo.save(&mut tx, &session).await?;
    tx.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    // Exercised against a live database in integration tests; see
    // `tests/write_back.rs` for the stale-rev and closed-session cases.
}
