//! Create a session and wait for it to leave its startup states.

use crate::config::PollPolicy;
use crate::error::{ConnectError, GatewayTimeout};
use crate::gateway::{BestEffort, GatewaySession, SessionGateway, SessionStatus};

/// Create `name` and poll until it reaches a ready state.
///
/// Returns the created session with its status replaced by the last observed
/// one.
pub async fn create_and_wait(
    gateway: &dyn SessionGateway,
    name: &str,
    policy: PollPolicy,
) -> Result<GatewaySession, ConnectError> {
    let mut session = gateway.create_session(name).await?;
    tracing::info!(session = name, status = %session.status, "Gateway session created");

    session.status = wait_until_ready(gateway, name, session.status.clone(), policy).await?;
    Ok(session)
}

/// Poll `get_session` every `policy.interval`, at most `policy.max_attempts`
/// times. `initial` is the status already observed before polling.
pub async fn wait_until_ready(
    gateway: &dyn SessionGateway,
    name: &str,
    initial: SessionStatus,
    policy: PollPolicy,
) -> Result<SessionStatus, GatewayTimeout> {
    if initial.is_ready() {
        return Ok(initial);
    }

    let mut last = initial;
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let observed = BestEffort::from(gateway.get_session(name).await)
            .log_discarded("readiness poll", name);
        match observed {
            Some(Some(session)) => {
                last = session.status;
                if last.is_ready() {
                    tracing::info!(session = name, attempt, status = %last, "Session ready");
                    return Ok(last);
                }
                tracing::debug!(
                    session = name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    status = %last,
                    "Session not ready yet"
                );
            }
            Some(None) => {
                tracing::debug!(session = name, attempt, "Session not visible on gateway yet");
            }
            None => {}
        }
    }

    tracing::warn!(
        session = name,
        max_attempts = policy.max_attempts,
        status = %last,
        "Session did not become ready"
    );
    Err(GatewayTimeout::Readiness {
        last_status: last.to_string(),
        attempts: policy.max_attempts,
        interval: policy.interval,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PollingConfig;
    use crate::gateway::fake::{Call, Lookup, ScriptedGateway};

    const FAST: PollPolicy = PollPolicy::new(Duration::ZERO, 30);

    #[tokio::test]
    async fn exits_on_first_ready_status() {
        let gw = ScriptedGateway::new().with_lookups([
            Lookup::Status("STARTING"),
            Lookup::Fail,
            Lookup::Absent,
            Lookup::Status("SCAN_QR_CODE"),
        ]);
        let status = wait_until_ready(&gw, "t", SessionStatus::Starting, FAST)
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::ScanQrCode);
        assert_eq!(gw.count(|c| matches!(c, Call::Get(_))), 4);
    }

    #[tokio::test]
    async fn ready_creation_status_skips_polling() {
        let gw = ScriptedGateway::new().with_create(Some("STARTED"));
        let session = create_and_wait(&gw, "t", FAST).await.unwrap();
        assert_eq!(session.status, SessionStatus::Started);
        assert_eq!(gw.calls(), vec![Call::Create("t".to_string())]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_with_last_status() {
        let gw = ScriptedGateway::new().with_lookups([Lookup::Status("STARTING")]);
        let err = wait_until_ready(&gw, "t", SessionStatus::Starting, FAST)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Session failed to start. Final status: STARTING"
        );
        assert_eq!(gw.count(|c| matches!(c, Call::Get(_))), 30);
    }

    #[tokio::test]
    async fn creation_failure_is_fatal() {
        let gw = ScriptedGateway::new().with_create(None);
        let err = create_and_wait(&gw, "t", FAST).await.unwrap_err();
        assert!(matches!(err, ConnectError::GatewayRequest(_)));
        assert_eq!(gw.count(|c| matches!(c, Call::Get(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_sleeps_one_second_before_each_poll() {
        let policy = PollingConfig::default().readiness;
        let gw = ScriptedGateway::new().with_lookups([Lookup::Status("STARTING")]);
        let started = tokio::time::Instant::now();

        let err = wait_until_ready(&gw, "t", SessionStatus::Starting, policy)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayTimeout::Readiness { attempts: 30, .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_one_interval() {
        let policy = PollingConfig::default().readiness;
        let gw = ScriptedGateway::new().with_lookups([Lookup::Status("WORKING")]);
        let started = tokio::time::Instant::now();

        wait_until_ready(&gw, "t", SessionStatus::Starting, policy)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
