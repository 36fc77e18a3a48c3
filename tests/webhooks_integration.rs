use actix_web::test::TestRequest;
use actix_web::{App, test, web};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use barberflow::api::webhooks::whatsapp_webhook;

mod support;

#[actix_web::test]
async fn connection_update_closes_local_instance() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let suffix = Uuid::new_v4().simple().to_string();

    let shop_id = support::seed_barbershop(pool, &format!("shop_{suffix}")).await;
    let instance_name = format!("shop_{shop_id}_{suffix}");

    sqlx::query(
        r#"INSERT INTO whatsapp_instances
               (barbershop_id, instance_name, status, phone_number, last_sync_at)
           VALUES ($1, $2, 'connected', '5511999990000', NOW())"#,
    )
    .bind(shop_id)
    .bind(&instance_name)
    .execute(pool)
    .await
    .expect("insert instance");

    let state = web::Data::new(support::build_state(test_db.pool.clone(), "test-key"));
    let app = test::init_service(App::new().app_data(state.clone()).service(whatsapp_webhook)).await;

    let payload = json!({
        "event": "CONNECTION_UPDATE",
        "instance": instance_name,
        "data": { "state": "close", "statusReason": 401 }
    });

    let req = TestRequest::post()
        .uri("/webhook/whatsapp")
        .insert_header(("apikey", "test-key"))
        .set_json(payload)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let status: String =
        sqlx::query("SELECT status FROM whatsapp_instances WHERE instance_name = $1")
            .bind(&instance_name)
            .fetch_one(pool)
            .await
            .expect("select instance")
            .get("status");
    assert_eq!(status, "disconnected");
}

#[actix_web::test]
async fn qrcode_update_stores_code_and_marks_connecting() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let suffix = Uuid::new_v4().simple().to_string();

    let shop_id = support::seed_barbershop(pool, &format!("shop_{suffix}")).await;
    let instance_name = format!("shop_{shop_id}_{suffix}");

    sqlx::query(
        r#"INSERT INTO whatsapp_instances (barbershop_id, instance_name, status)
           VALUES ($1, $2, 'disconnected')"#,
    )
    .bind(shop_id)
    .bind(&instance_name)
    .execute(pool)
    .await
    .expect("insert instance");

    let state = web::Data::new(support::build_state(test_db.pool.clone(), "test-key"));
    let app = test::init_service(App::new().app_data(state.clone()).service(whatsapp_webhook)).await;

    let payload = json!({
        "event": "qrcode.updated",
        "instance": instance_name,
        "data": { "qrcode": { "base64": "data:image/png;base64,QQQQ" } }
    });

    let req = TestRequest::post()
        .uri("/webhook/whatsapp")
        .insert_header(("apikey", "test-key"))
        .set_json(payload)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let row = sqlx::query("SELECT status, qr_code FROM whatsapp_instances WHERE instance_name = $1")
        .bind(&instance_name)
        .fetch_one(pool)
        .await
        .expect("select instance");
    assert_eq!(row.get::<String, _>("status"), "connecting");
    assert_eq!(
        row.get::<Option<String>, _>("qr_code").as_deref(),
        Some("data:image/png;base64,QQQQ")
    );
}

#[actix_web::test]
async fn unknown_instance_is_acknowledged_and_ignored() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };

    let state = web::Data::new(support::build_state(test_db.pool.clone(), "test-key"));
    let app = test::init_service(App::new().app_data(state.clone()).service(whatsapp_webhook)).await;

    let payload = json!({
        "event": "connection.update",
        "instance": "never_registered",
        "data": { "state": "open" }
    });

    let req = TestRequest::post()
        .uri("/webhook/whatsapp")
        .insert_header(("apikey", "test-key"))
        .set_json(payload)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["ignored"], true);
}

#[actix_web::test]
async fn bad_secret_is_rejected() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };

    let state = web::Data::new(support::build_state(test_db.pool.clone(), "test-key"));
    let app = test::init_service(App::new().app_data(state.clone()).service(whatsapp_webhook)).await;

    let payload = json!({
        "event": "connection.update",
        "instance": "whatever",
        "data": { "state": "open" }
    });

    let req = TestRequest::post()
        .uri("/webhook/whatsapp")
        .insert_header(("apikey", "wrong-key"))
        .set_json(payload)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}
