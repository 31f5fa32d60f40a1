//! FSM unit tests

use rollguard::deploy::fsm::{RunEvent, RunFsm, RunState};

#[test]
fn test_fsm_initial_state() {
    let fsm = RunFsm::new();
    assert_eq!(fsm.state(), RunState::Pending);
    assert_eq!(fsm.history(), &[RunState::Pending]);
}

#[test]
fn test_fsm_ci_failure_goes_straight_to_recovery() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Publish).unwrap();
    fsm.process(RunEvent::PublishAcked).unwrap();

    // No health check after a CI failure
    assert_eq!(fsm.process(RunEvent::CiFailed).unwrap(), RunState::Recovering);
    assert!(fsm.process(RunEvent::Healthy).is_err());
}

#[test]
fn test_fsm_rollback_flow() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Publish).unwrap();
    fsm.process(RunEvent::PublishAcked).unwrap();
    fsm.process(RunEvent::CiSucceeded).unwrap();
    fsm.process(RunEvent::Unhealthy).unwrap();
    fsm.process(RunEvent::SelfHealFailed).unwrap();
    fsm.process(RunEvent::RollbackSucceeded).unwrap();

    assert_eq!(
        fsm.history(),
        &[
            RunState::Pending,
            RunState::Publishing,
            RunState::Monitoring,
            RunState::HealthChecking,
            RunState::Recovering,
            RunState::RollingBack,
            RunState::Succeeded,
        ]
    );
}

#[test]
fn test_fsm_rollback_never_before_self_heal_decision() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Publish).unwrap();
    fsm.process(RunEvent::PublishAcked).unwrap();
    fsm.process(RunEvent::CiFailed).unwrap();
    assert!(fsm.process(RunEvent::RollbackSucceeded).is_err());
    assert_eq!(fsm.state(), RunState::Recovering);
}

#[test]
fn test_fsm_exhausted_recovery_fails() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Publish).unwrap();
    fsm.process(RunEvent::PublishAcked).unwrap();
    fsm.process(RunEvent::CiFailed).unwrap();
    fsm.process(RunEvent::SelfHealFailed).unwrap();
    assert_eq!(fsm.process(RunEvent::RecoveryExhausted).unwrap(), RunState::Failed);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_no_republish() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Publish).unwrap();
    assert!(fsm.process(RunEvent::Publish).is_err());
}
