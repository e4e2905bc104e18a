//! State machine, policy and status table tests.

use std::time::Duration;

use rstest::rstest;

use crate::lifecycle::{
    LifecycleState, PolicyError, PollPolicy, ResourceStatus, StatusClass, StatusTable,
    TransitionError,
};

#[rstest]
#[case(StatusClass::InProgress, LifecycleState::Creating)]
#[case(StatusClass::Succeeded, LifecycleState::Active)]
#[case(StatusClass::Failed, LifecycleState::Failed)]
fn creating_accepts_every_class(#[case] class: StatusClass, #[case] expected: LifecycleState) {
    let next = LifecycleState::Unprovisioned
        .begin()
        .observe(class)
        .expect("transition should be valid");
    assert_eq!(next, expected);
}

#[rstest]
#[case(LifecycleState::Active)]
#[case(LifecycleState::Failed)]
#[case(LifecycleState::TimedOut)]
fn terminal_states_reject_further_observations(#[case] from: LifecycleState) {
    assert!(from.is_terminal());
    let err = from
        .observe(StatusClass::InProgress)
        .expect_err("terminal state must not revert");
    assert_eq!(
        err,
        TransitionError {
            from,
            observed: StatusClass::InProgress
        }
    );
}

#[rstest]
fn unprovisioned_cannot_observe_status() {
    assert!(LifecycleState::Unprovisioned
        .observe(StatusClass::Succeeded)
        .is_err());
}

#[rstest]
fn only_creating_can_time_out() {
    assert_eq!(
        LifecycleState::Creating.time_out(),
        Ok(LifecycleState::TimedOut)
    );
    assert!(LifecycleState::Active.time_out().is_err());
    assert!(LifecycleState::Unprovisioned.time_out().is_err());
}

#[rstest]
fn begin_keeps_terminal_states() {
    assert_eq!(LifecycleState::Failed.begin(), LifecycleState::Failed);
}

#[rstest]
#[case(Duration::ZERO, Duration::from_secs(10), PolicyError::ZeroInterval)]
#[case(Duration::from_secs(1), Duration::ZERO, PolicyError::ZeroTimeout)]
#[case(
    Duration::from_secs(10),
    Duration::from_secs(5),
    PolicyError::TimeoutShorterThanInterval {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(5),
    }
)]
fn policy_rejects_inconsistent_durations(
    #[case] interval: Duration,
    #[case] timeout: Duration,
    #[case] expected: PolicyError,
) {
    assert_eq!(PollPolicy::new(interval, timeout), Err(expected));
}

#[rstest]
fn policy_accepts_equal_interval_and_timeout() {
    let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(5))
        .expect("equal durations are valid");
    assert_eq!(policy.interval(), policy.timeout());
}

#[rstest]
fn default_policy_matches_documented_values() {
    let policy = PollPolicy::default();
    assert_eq!(policy.interval(), Duration::from_secs(5));
    assert_eq!(policy.timeout(), Duration::from_secs(300));
}

#[rstest]
#[case(StatusTable::knowledge_base(), "CREATING", Some(StatusClass::InProgress))]
#[case(StatusTable::knowledge_base(), "ACTIVE", Some(StatusClass::Succeeded))]
#[case(StatusTable::knowledge_base(), "DELETE_UNSUCCESSFUL", Some(StatusClass::Failed))]
#[case(StatusTable::knowledge_base(), " ACTIVE\n", Some(StatusClass::Succeeded))]
#[case(StatusTable::knowledge_base(), "active", None)]
#[case(StatusTable::data_source(), "DELETING", Some(StatusClass::Failed))]
#[case(StatusTable::data_source(), "AVAILABLE", Some(StatusClass::Succeeded))]
#[case(StatusTable::ingestion_job(), "STOPPED", Some(StatusClass::Failed))]
#[case(StatusTable::ingestion_job(), "COMPLETE", Some(StatusClass::Succeeded))]
#[case(StatusTable::vector_store(), "MISSING", Some(StatusClass::Failed))]
#[case(StatusTable::guardrail(), "VERSIONING", Some(StatusClass::InProgress))]
#[case(StatusTable::guardrail(), "READY", Some(StatusClass::Succeeded))]
fn status_tables_classify_provider_statuses(
    #[case] table: StatusTable,
    #[case] raw: &str,
    #[case] expected: Option<StatusClass>,
) {
    assert_eq!(table.classify(&ResourceStatus::new(raw)), expected);
}

#[rstest]
fn custom_tables_classify_registered_statuses() {
    let table = StatusTable::new("widget")
        .in_progress(&["PENDING"])
        .succeeded(&["DONE"]);
    assert_eq!(table.kind(), "widget");
    assert_eq!(
        table.classify(&ResourceStatus::new("PENDING")),
        Some(StatusClass::InProgress)
    );
    assert!(StatusClass::Succeeded.is_terminal());
    assert!(!StatusClass::InProgress.is_terminal());
}
