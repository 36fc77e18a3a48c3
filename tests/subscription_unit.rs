use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use barberflow::subscription::{
    UsageCheck, add_one_month, evaluate_usage, normalize_service_ids, period_charge,
};

#[test]
fn add_one_month_is_a_calendar_month() {
    let date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
    let next = add_one_month(date);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 15, 10, 30, 0).unwrap());
}

#[test]
fn add_one_month_clamps_to_month_end() {
    let date = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
    let next = add_one_month(date);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
}

#[test]
fn period_charge_splits_commission_from_plan_percentage() {
    let (amount, commission, net) = period_charge(Decimal::new(10000, 2), Decimal::new(4000, 2));
    assert_eq!(amount, Decimal::new(10000, 2));
    assert_eq!(commission, Decimal::new(4000, 2));
    assert_eq!(net, Decimal::new(6000, 2));
}

#[test]
fn exhausted_balance_blocks_even_covered_services() {
    assert_eq!(
        evaluate_usage(0, &[1, 2, 3], 2),
        UsageCheck::NoRemainingServices
    );
}

#[test]
fn uncovered_service_blocks_with_balance_left() {
    assert_eq!(evaluate_usage(4, &[1, 2, 3], 9), UsageCheck::ServiceNotCovered);
}

#[test]
fn covered_service_with_balance_is_allowed() {
    assert_eq!(evaluate_usage(1, &[1, 2, 3], 3), UsageCheck::Allowed);
}

#[test]
fn normalize_accepts_plain_array() {
    assert_eq!(normalize_service_ids(&json!([1, 2, 3])), vec![1, 2, 3]);
}

#[test]
fn normalize_accepts_json_encoded_string() {
    assert_eq!(normalize_service_ids(&json!("[4, 5, 6]")), vec![4, 5, 6]);
}

#[test]
fn normalize_accepts_numeric_strings_in_array() {
    assert_eq!(normalize_service_ids(&json!(["7", "8"])), vec![7, 8]);
}

#[test]
fn normalize_drops_garbage() {
    assert_eq!(normalize_service_ids(&json!("not an array")), Vec::<i32>::new());
    assert_eq!(normalize_service_ids(&json!({"a": 1})), Vec::<i32>::new());
    assert_eq!(normalize_service_ids(&json!([1, "x", null, 2])), vec![1, 2]);
}
