use httpmock::Method::{DELETE, GET, POST};
use httpmock::MockServer;
use serde_json::json;

use barberflow::api::evolution::{self, EvolutionConfig};

fn config(server: &MockServer) -> EvolutionConfig {
    EvolutionConfig {
        base_url: server.url(""),
        api_key: "test-evolution".to_string(),
    }
}

#[actix_web::test]
async fn connection_state_parses_instance_envelope() {
    let server = MockServer::start_async().await;

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/instance/connectionState/shop_1_abc")
            .header("apikey", "test-evolution");
        then.status(200).json_body(json!({
            "instance": { "instanceName": "shop_1_abc", "state": "open" }
        }));
    });

    let state = evolution::connection_state(&config(&server), "shop_1_abc")
        .await
        .expect("connection state");

    assert_eq!(state.instance_name, "shop_1_abc");
    assert_eq!(state.state.as_deref(), Some("open"));
    assert!(state.owner.is_none());
    mock.assert();
}

#[actix_web::test]
async fn fetch_instances_reads_owner_jid() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(GET)
            .path("/instance/fetchInstances")
            .header("apikey", "test-evolution");
        then.status(200).json_body(json!([
            {
                "instance": {
                    "instanceName": "shop_1_abc",
                    "state": "open",
                    "owner": "5511999990000@s.whatsapp.net"
                }
            },
            { "instance": { "instanceName": "shop_2_def", "state": "close" } }
        ]));
    });

    let instances = evolution::fetch_instances(&config(&server))
        .await
        .expect("instance list");

    assert_eq!(instances.len(), 2);
    assert_eq!(
        instances[0].owner.as_deref(),
        Some("5511999990000@s.whatsapp.net")
    );
    assert_eq!(instances[1].state.as_deref(), Some("close"));
}

#[actix_web::test]
async fn create_instance_returns_qr_and_registers_webhook() {
    let server = MockServer::start_async().await;

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/instance/create")
            .header("apikey", "test-evolution")
            .json_body_partial(
                r#"{
                    "instanceName": "shop_1_abc",
                    "qrcode": true,
                    "webhook": { "url": "http://localhost/webhook/whatsapp" }
                }"#,
            );
        then.status(201).json_body(json!({
            "instance": { "instanceName": "shop_1_abc" },
            "qrcode": { "base64": "data:image/png;base64,AAAA" }
        }));
    });

    let qr = evolution::create_instance(
        &config(&server),
        "shop_1_abc",
        "http://localhost/webhook/whatsapp",
    )
    .await
    .expect("create instance");

    assert_eq!(qr.as_deref(), Some("data:image/png;base64,AAAA"));
    mock.assert();
}

#[actix_web::test]
async fn send_text_posts_number_and_text() {
    let server = MockServer::start_async().await;

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/message/sendText/shop_1_abc")
            .header("apikey", "test-evolution")
            .json_body(json!({ "number": "5511988887777", "text": "Olá Ana" }));
        then.status(201).json_body(json!({ "key": { "id": "msg-1" } }));
    });

    evolution::send_text(&config(&server), "shop_1_abc", "5511988887777", "Olá Ana")
        .await
        .expect("send text");

    mock.assert();
}

#[actix_web::test]
async fn gateway_error_is_surfaced_with_status_and_body() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(GET).path("/instance/connectionState/ghost");
        then.status(404).body("Instance not found");
    });

    let err = evolution::connection_state(&config(&server), "ghost")
        .await
        .expect_err("should fail");

    match err {
        evolution::EvolutionError::Api { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[actix_web::test]
async fn logout_accepts_success_status() {
    let server = MockServer::start_async().await;

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/instance/logout/shop_1_abc")
            .header("apikey", "test-evolution");
        then.status(200).json_body(json!({ "status": "SUCCESS" }));
    });

    evolution::logout_instance(&config(&server), "shop_1_abc")
        .await
        .expect("logout");

    mock.assert();
}
