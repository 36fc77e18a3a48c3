use rust_decimal::Decimal;

use barberflow::billing::summarize;
use barberflow::models::{Command, CommandItem};

fn command(id: i32, total_cents: i64) -> Command {
    Command {
        id,
        barbershop_id: 1,
        client_id: Some(10),
        provider_id: Some(100),
        status: "closed".to_string(),
        total_amount: Decimal::new(total_cents, 2),
        closed_at: None,
        created_at: None,
    }
}

fn item(id: i32, command_id: i32, provider_id: i32, commission_cents: i64) -> CommandItem {
    CommandItem {
        id,
        command_id,
        provider_id: Some(provider_id),
        service_id: Some(1),
        description: "Corte".to_string(),
        quantity: 1,
        unit_price: Decimal::new(4000, 2),
        total_price: Decimal::new(4000, 2),
        commission_amount: Decimal::new(commission_cents, 2),
        created_at: None,
    }
}

#[test]
fn revenue_once_per_command_commissions_once_per_item() {
    // command 1 has two items, command 2 has none
    let commands = vec![command(1, 8000), command(2, 3000)];
    let items = vec![item(1, 1, 100, 1600), item(2, 1, 101, 800)];

    let summary = summarize(&commands, &items);

    assert_eq!(summary.total_revenue, Decimal::new(11000, 2));
    assert_eq!(summary.total_commissions, Decimal::new(2400, 2));
    assert_eq!(summary.sale_count, 2);
    assert_eq!(summary.average_ticket, Decimal::new(5500, 2));
}

#[test]
fn command_without_items_still_counts_toward_sales() {
    let commands = vec![command(7, 2500)];
    let summary = summarize(&commands, &[]);

    assert_eq!(summary.sale_count, 1);
    assert_eq!(summary.total_revenue, Decimal::new(2500, 2));
    assert_eq!(summary.total_commissions, Decimal::ZERO);
    assert!(summary.ranking.is_empty());
}

#[test]
fn duplicate_command_rows_do_not_double_count_revenue() {
    let commands = vec![command(1, 5000), command(1, 5000)];
    let summary = summarize(&commands, &[]);

    assert_eq!(summary.sale_count, 1);
    assert_eq!(summary.total_revenue, Decimal::new(5000, 2));
}

#[test]
fn ranking_sorted_descending_by_commission() {
    let commands = vec![command(1, 10000), command(2, 10000)];
    let items = vec![
        item(1, 1, 100, 500),
        item(2, 1, 101, 2000),
        item(3, 2, 100, 700),
        item(4, 2, 102, 1500),
    ];

    let summary = summarize(&commands, &items);

    let ids: Vec<i32> = summary.ranking.iter().map(|r| r.provider_id).collect();
    assert_eq!(ids, vec![101, 102, 100]);
    assert_eq!(summary.ranking[0].commission_total, Decimal::new(2000, 2));
    assert_eq!(summary.ranking[2].commission_total, Decimal::new(1200, 2));
    assert_eq!(summary.ranking[2].item_count, 2);
}

#[test]
fn empty_range_yields_zeroes() {
    let summary = summarize(&[], &[]);

    assert_eq!(summary.total_revenue, Decimal::ZERO);
    assert_eq!(summary.total_commissions, Decimal::ZERO);
    assert_eq!(summary.sale_count, 0);
    assert_eq!(summary.average_ticket, Decimal::ZERO);
    assert!(summary.ranking.is_empty());
}
