use avatar_viewer::channel::{ConnectionMachine, ConnectionState, ReconnectPolicy};
use instant::Duration;

#[test]
fn should_back_off_exponentially_up_to_the_cap() {
    let policy = ReconnectPolicy::default();
    let delays: Vec<u64> = (1..=8)
        .map(|attempt| policy.delay(attempt).expect("no attempt limit").as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    assert_eq!(policy.delay(1_000), Some(Duration::from_secs(30)));
}

#[test]
fn should_give_up_after_max_attempts() {
    let policy = ReconnectPolicy {
        max_attempts: Some(2),
        ..Default::default()
    };
    assert!(policy.delay(2).is_some());
    assert_eq!(policy.delay(3), None);
}

#[test]
fn should_never_retry_when_disabled() {
    let mut machine = ConnectionMachine::new(ReconnectPolicy::disabled());
    machine.on_open();
    machine.on_close();
    assert_eq!(machine.next_retry(), None);
    assert_eq!(machine.state(), ConnectionState::Closed);
}

#[test]
fn should_walk_through_the_lifecycle() {
    let mut machine = ConnectionMachine::new(ReconnectPolicy::default());
    assert_eq!(machine.state(), ConnectionState::Connecting);
    // Nothing to retry while connecting or connected.
    assert_eq!(machine.next_retry(), None);

    machine.on_open();
    assert_eq!(machine.state(), ConnectionState::Open);
    assert_eq!(machine.next_retry(), None);

    machine.on_close();
    assert_eq!(machine.state(), ConnectionState::Closed);
    let delay = machine.next_retry().expect("reconnects by default");
    assert_eq!(delay, Duration::from_millis(500));
    assert_eq!(
        machine.state(),
        ConnectionState::WaitingToReconnect { attempt: 1, delay }
    );
    // Asking again while waiting does not count as another attempt.
    assert_eq!(machine.next_retry(), Some(delay));
    assert_eq!(machine.attempt(), 1);

    machine.on_retry();
    assert_eq!(machine.state(), ConnectionState::Connecting);
}

#[test]
fn should_grow_the_delay_until_a_connection_succeeds() {
    let mut machine = ConnectionMachine::new(ReconnectPolicy::default());
    for expected in [500, 1_000, 2_000] {
        machine.on_error();
        assert_eq!(machine.next_retry(), Some(Duration::from_millis(expected)));
        machine.on_retry();
    }
    assert_eq!(machine.attempt(), 3);

    machine.on_open();
    assert_eq!(machine.attempt(), 0);
    machine.on_close();
    assert_eq!(machine.next_retry(), Some(Duration::from_millis(500)));
}

#[test]
fn should_stay_errored_when_a_close_follows_an_error() {
    let mut machine = ConnectionMachine::new(ReconnectPolicy::default());
    machine.on_open();
    machine.on_error();
    machine.on_close();
    assert_eq!(machine.state(), ConnectionState::Errored);
    assert!(machine.next_retry().is_some());
}

#[test]
fn should_read_the_policy_from_json() {
    let policy: ReconnectPolicy =
        serde_json::from_str(r#"{"initial_delay_ms": 250, "max_attempts": 5}"#).expect("valid json");
    assert_eq!(policy.initial_delay_ms, 250);
    assert_eq!(policy.max_attempts, Some(5));
    assert_eq!(policy.max_delay_ms, 30_000);
    assert!(policy.enabled);
}
