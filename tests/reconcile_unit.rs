use barberflow::api::evolution::{InstanceState, phone_from_jid};
use barberflow::reconcile::{ReconcileAction, plan_reconciliation};

fn remote(state: Option<&str>, owner: Option<&str>) -> InstanceState {
    InstanceState {
        instance_name: "shop_1_test".to_string(),
        state: state.map(|s| s.to_string()),
        owner: owner.map(|s| s.to_string()),
    }
}

#[test]
fn ghost_session_is_logged_out_before_new_qr() {
    let remote = remote(Some("open"), None);
    let actions = plan_reconciliation("connected", Some("5511999990000"), Some(&remote));

    assert_eq!(actions[0], ReconcileAction::MarkDisconnected);
    let logout_pos = actions
        .iter()
        .position(|a| *a == ReconcileAction::ForceLogout)
        .expect("ghost plan forces logout");
    let qr_pos = actions
        .iter()
        .position(|a| *a == ReconcileAction::RegenerateQr)
        .expect("ghost plan regenerates qr");
    assert!(logout_pos < qr_pos);
    assert!(actions.contains(&ReconcileAction::RegisterWebhook));
}

#[test]
fn open_session_with_device_marks_connected() {
    let remote = remote(Some("open"), Some("5511999990000@s.whatsapp.net"));
    let actions = plan_reconciliation("disconnected", None, Some(&remote));

    assert_eq!(
        actions,
        vec![ReconcileAction::MarkConnected {
            phone_number: "5511999990000".to_string()
        }]
    );
}

#[test]
fn phone_mismatch_is_corrected() {
    let remote = remote(Some("open"), Some("5511999990000@s.whatsapp.net"));
    let actions = plan_reconciliation("connected", Some("5511000000000"), Some(&remote));

    assert_eq!(
        actions,
        vec![ReconcileAction::MarkConnected {
            phone_number: "5511999990000".to_string()
        }]
    );
}

#[test]
fn converged_state_needs_no_actions() {
    let remote = remote(Some("open"), Some("5511999990000@s.whatsapp.net"));
    let actions = plan_reconciliation("connected", Some("5511999990000"), Some(&remote));
    assert!(actions.is_empty());

    let closed = remote_closed();
    let actions = plan_reconciliation("disconnected", None, Some(&closed));
    assert!(actions.is_empty());
}

fn remote_closed() -> InstanceState {
    remote(Some("close"), None)
}

#[test]
fn closed_session_with_local_connected_regenerates_qr() {
    let remote = remote_closed();
    let actions = plan_reconciliation("connected", Some("5511999990000"), Some(&remote));

    assert_eq!(
        actions,
        vec![
            ReconcileAction::MarkDisconnected,
            ReconcileAction::RegenerateQr,
            ReconcileAction::RegisterWebhook,
        ]
    );
}

#[test]
fn missing_instance_is_recreated() {
    let actions = plan_reconciliation("connected", Some("5511999990000"), None);

    assert_eq!(
        actions,
        vec![
            ReconcileAction::MarkDisconnected,
            ReconcileAction::RecreateInstance,
        ]
    );
}

#[test]
fn jid_strips_server_suffix() {
    assert_eq!(phone_from_jid("5511999990000@s.whatsapp.net"), "5511999990000");
    assert_eq!(phone_from_jid("5511999990000"), "5511999990000");
}
