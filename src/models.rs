// src/models.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Command {
    pub id: i32,
    pub barbershop_id: i32,
    pub client_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub status: String, // open | closed | cancelled
    pub total_amount: Decimal,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandItem {
    pub id: i32,
    pub command_id: i32,
    pub provider_id: Option<i32>,
    pub service_id: Option<i32>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub commission_amount: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionPlan {
    pub id: i32,
    pub barbershop_id: i32,
    pub provider_id: i32,
    pub name: String,
    pub monthly_price: Decimal,
    pub included_services_count: i32,
    pub commission_percentage: Decimal,
    pub enabled_service_ids: Vec<i32>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientSubscription {
    pub id: i32,
    pub barbershop_id: i32,
    pub client_id: i32,
    pub provider_id: i32,
    pub plan_id: i32,
    pub status: String, // active | cancelled | expired | pending_payment
    pub remaining_services: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionFinancialRecord {
    pub id: i32,
    pub subscription_id: i32,
    pub amount: Decimal,
    pub commission_amount: Decimal,
    pub net_amount: Decimal,
    pub status: String, // pending | paid | overdue
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AutomationRule {
    pub id: i32,
    pub barbershop_id: i32,
    pub rule_type: String, // reminder | follow_up | churn_alert | promotion
    pub name: String,
    pub message_template: String,
    pub send_whatsapp: bool,
    pub notify_staff: bool,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WhatsAppInstance {
    pub id: i32,
    pub barbershop_id: i32,
    pub instance_name: String,
    pub status: String, // disconnected | connecting | connected
    pub phone_number: Option<String>,
    pub qr_code: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
