use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::billing::billing_summary,
        crate::api::subscriptions::create_subscription,
        crate::api::subscriptions::validate_service_usage,
        crate::api::automation::run_automation,
        crate::api::instances::instance_status,
        crate::api::instances::reconcile_instance,
        crate::api::webhooks::whatsapp_webhook
    ),
    components(
        schemas(
            crate::billing::BillingSummary,
            crate::billing::ProviderRank,
            crate::models::ClientSubscription,
            crate::models::WhatsAppInstance,
            crate::subscription::UsageValidation,
            crate::automation::DispatchReport,
            crate::reconcile::ReconcileAction,
            crate::reconcile::ReconcileOutcome,
            crate::api::subscriptions::CreateSubscriptionRequest,
            crate::api::subscriptions::ValidateUsageRequest,
            crate::api::automation::RunAutomationRequest,
            crate::api::instances::InstanceStatusResponse
        )
    ),
    tags(
        (name = "billing", description = "Commission and revenue reporting"),
        (name = "subscriptions", description = "Client subscription plans"),
        (name = "automation", description = "WhatsApp messaging automation"),
        (name = "whatsapp", description = "Gateway instance management"),
        (name = "webhooks", description = "Callbacks from the Evolution API")
    )
)]
pub struct ApiDoc;
