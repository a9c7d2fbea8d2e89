use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use sanctions::data::Data;
use sanctions::index::ActiveSanction;
use sanctions::target::{SanctionEvent, TargetError};
use sanctions::types::{SanctionKind, SubjectId};

/// Cap on reversals in flight within one pass
const MAX_CONCURRENT_REVERSALS: usize = 7;

/// The system-attributed reason recorded on automatic reversals
const EXPIRED_REASON: &str = "expired";

/// One reconciliation pass: drain every due index entry, reversing the
/// expired sanction through the platform target
///
/// A failed entry stays in the index and is retried next tick; nothing in
/// here stops the loop. Entries fan out across distinct (subject, kind)
/// keys, so concurrent reversals never touch the same sanction.
pub async fn reconcile_expired(
    data: &Arc<Data>,
    shutdown: &watch::Receiver<bool>,
) -> Result<(), sanctions::Error> {
    let due = {
        let state = data.state.lock().await;
        state.index.due_entries(Utc::now())
    };

    if due.is_empty() {
        return Ok(());
    }

    log::info!("Reconciling {} expired sanction(s)", due.len());

    let mut set = JoinSet::new();

    for (subject, kind, active) in due {
        // The stop signal is honored between entries; whatever is already
        // in flight drains below
        if *shutdown.borrow() {
            break;
        }

        // If over MAX_CONCURRENT_REVERSALS reversals ongoing, wait for one
        // to finish
        if set.len() >= MAX_CONCURRENT_REVERSALS {
            if let Some(res) = set.join_next().await {
                log_reversal_result(res);
            }
        }

        let data = data.clone();
        set.spawn(async move { reverse_one(data, subject, kind, active).await });
    }

    // Wait for all reversals to finish
    while let Some(res) = set.join_next().await {
        log_reversal_result(res);
    }

    Ok(())
}

fn log_reversal_result(res: Result<Result<(), TargetError>, tokio::task::JoinError>) {
    match res {
        Err(e) => log::error!("Error while running reversal [join]: {}", e),
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Error while running reversal [target]: {}", e),
    }
}

async fn reverse_one(
    data: Arc<Data>,
    subject: SubjectId,
    kind: SanctionKind,
    active: ActiveSanction,
) -> Result<(), TargetError> {
    let Some(reversal_action) = kind.reversal_action() else {
        // Only enforced kinds are ever indexed; drop anything else
        data.state.lock().await.index.remove(&subject, kind);
        return Ok(());
    };

    // Someone may have lifted the sanction out-of-band; query before acting
    let in_effect = match kind {
        SanctionKind::Ban => data.target.ban_in_effect(&subject, &active.scope).await,
        SanctionKind::Mute => data.target.mute_in_effect(&subject, &active.scope).await,
        SanctionKind::Warning | SanctionKind::Kick => Ok(false),
    };

    let in_effect = match in_effect {
        Ok(in_effect) => in_effect,
        // The subject is unknown to the platform, so nothing is in effect
        Err(TargetError::NotFound) => false,
        // Retried next tick
        Err(e) => return Err(e),
    };

    if in_effect {
        let result = match kind {
            SanctionKind::Ban => {
                data.target
                    .remove_ban(&subject, &active.scope, EXPIRED_REASON)
                    .await
            }
            SanctionKind::Mute => {
                data.target
                    .remove_mute(&subject, &active.scope, EXPIRED_REASON)
                    .await
            }
            SanctionKind::Warning | SanctionKind::Kick => Ok(()),
        };

        match result {
            Ok(()) => {}
            // Already gone
            Err(TargetError::NotFound) => {}
            // The entry stays in the index and is retried next tick
            Err(e) => return Err(e),
        }
    }

    let when = Utc::now();

    {
        let mut state = data.state.lock().await;

        // Claim the entry; a manual reversal or a re-applied sanction under
        // the same key while we were talking to the platform wins instead
        if !state
            .index
            .remove_expiring(&subject, kind, active.expires_at)
        {
            return Ok(());
        }

        match state.store.mark_reversed_expiring(
            &subject,
            kind,
            &active.scope,
            active.expires_at,
            when,
            EXPIRED_REASON,
        ) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "No record matched the scheduled expiry for {} [{}]",
                subject,
                kind
            ),
            Err(e) => log::error!(
                "Error while persisting reversal for {} [{}]: {}",
                subject,
                kind,
                e
            ),
        }
    }

    data.notify(SanctionEvent {
        action: reversal_action,
        subject,
        scope: active.scope,
        reason: Some(EXPIRED_REASON.to_string()),
        timestamp: when,
        automatic: true,
    })
    .await;

    Ok(())
}
