use super::*;

fn open_account(threshold: usize) -> FlowControlAccount {
    let mut account = FlowControlAccount::new();
    account.set_threshold(threshold);
    account.activate();
    account
}

#[test]
fn test_flow_control_add_never_crosses() {
    let mut account = open_account(1500);
    account.add(1000);
    account.add(1000);
    assert_eq!(account.amount(), 2000);
}

#[test]
fn test_flow_control_crossing_fires_once() {
    let mut account = open_account(1500);
    for _ in 0..10 {
        account.add(1000);
    }

    let crossings: Vec<bool> = (0..10).map(|_| account.subtract(1000)).collect();

    // 10000 -> 9000 ... -> 2000 -> 1000 (crossing) -> 0
    let expected: Vec<bool> = (0..10).map(|i| i == 8).collect();
    assert_eq!(crossings, expected);
    assert_eq!(account.amount(), 0);
}

#[test]
fn test_flow_control_no_crossing_below_threshold() {
    let mut account = open_account(1500);
    account.add(1000);
    assert!(!account.subtract(1000), "never exceeded the threshold");
    assert!(!account.subtract(1000), "already at or below the threshold");
}

#[test]
fn test_flow_control_landing_on_threshold_crosses() {
    let mut account = open_account(1000);
    account.add(1001);
    assert!(account.subtract(1));
    assert_eq!(account.amount(), 1000);
}

#[test]
fn test_flow_control_clamps_at_zero() {
    let mut account = open_account(0);
    account.add(10);
    assert!(account.subtract(25));
    assert_eq!(account.amount(), 0);
    assert!(!account.subtract(25));
    assert_eq!(account.amount(), 0);
}

#[test]
fn test_flow_control_inactive_never_crosses() {
    let mut account = FlowControlAccount::new();
    account.set_threshold(10);
    account.add(100);
    assert!(!account.subtract(100));

    account.activate();
    account.add(100);
    assert!(account.subtract(100));
}

#[test]
fn test_flow_control_rollback_never_crosses() {
    let mut account = open_account(100);
    account.add(1000);
    account.rollback(1000);
    assert_eq!(account.amount(), 0);
}

#[test]
fn test_flow_control_handler_kept_before_activation() {
    let mut account = FlowControlAccount::new();
    assert!(account.on_low().is_none());

    let (tx, rx) = std::sync::mpsc::channel();
    account.set_on_low(Box::new(move || {
        let _ = tx.send(());
    }));
    account.set_threshold(5);
    account.activate();

    account.add(10);
    assert!(account.subtract(10));
    if let Some(handler) = account.on_low() {
        let mut f = handler.lock().unwrap();
        f();
    }
    assert!(rx.try_recv().is_ok());
}
