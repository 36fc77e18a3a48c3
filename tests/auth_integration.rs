use actix_web::test::TestRequest;
use actix_web::{App, HttpResponse, Responder, test, web};

use barberflow::api::auth::{JwtMiddleware, generate_token};

async fn whoami(barbershop_id: web::ReqData<i32>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "barbershop_id": *barbershop_id }))
}

#[actix_web::test]
async fn bearer_token_resolves_tenant_id() {
    std::env::set_var("JWT_SECRET", "test-jwt-secret");

    let app = test::init_service(
        App::new().service(
            web::scope("/api")
                .wrap(JwtMiddleware)
                .route("/whoami", web::get().to(whoami)),
        ),
    )
    .await;

    let token = generate_token(7).expect("token");

    let req = TestRequest::get()
        .uri("/api/whoami")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["barbershop_id"], 7);
}

#[actix_web::test]
async fn missing_or_garbage_token_is_unauthorized() {
    std::env::set_var("JWT_SECRET", "test-jwt-secret");

    let app = test::init_service(
        App::new().service(
            web::scope("/api")
                .wrap(JwtMiddleware)
                .route("/whoami", web::get().to(whoami)),
        ),
    )
    .await;

    let req = TestRequest::get().uri("/api/whoami").to_request();
    let err = test::try_call_service(&app, req).await.expect_err("no token");
    assert_eq!(
        err.as_response_error().status_code(),
        actix_web::http::StatusCode::UNAUTHORIZED
    );

    let req = TestRequest::get()
        .uri("/api/whoami")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let err = test::try_call_service(&app, req)
        .await
        .expect_err("bad token");
    assert_eq!(
        err.as_response_error().status_code(),
        actix_web::http::StatusCode::UNAUTHORIZED
    );
}
