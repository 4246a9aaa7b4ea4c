//! End-to-end tests through the router with bearer tokens

mod common;

#[cfg(test)]
mod tests {
    use super::common::World;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use hmac::{Hmac, Mac};
    use serde_json::{json, Value};
    use sha2::Sha512;
    use tower::ServiceExt;

    use hsf_backend::auth::{issue_token, Role, TokenVerifier};
    use hsf_backend::models::Actor;
    use hsf_backend::payments::SIGNATURE_HEADER;
    use hsf_backend::routes;
    use hsf_backend::state::AppState;

    const JWT_SECRET: &str = "test-secret";
    const WEBHOOK_SECRET: &str = "whsec-test";

    fn router(world: &World, webhook_secret: Option<&str>) -> Router {
        let state = AppState::new(
            world.services.clone(),
            TokenVerifier::new(JWT_SECRET),
            webhook_secret.map(str::to_string),
            None,
        );
        routes::app(state)
    }

    fn bearer(actor: &Actor, role: Role) -> String {
        format!("Bearer {}", issue_token(actor, role, JWT_SECRET, 3600).unwrap())
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, token)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_in_memory_store() {
        let world = World::new().await;
        let app = router(&world, None);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert!(response.headers().contains_key("x-request-id"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "in-memory");
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        let world = World::new().await;
        let app = router(&world, None);

        let (status, body) = call(
            &app,
            Request::builder()
                .uri("/api/applications")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let forged = issue_token(&world.buyer, Role::Buyer, "other-secret", 3600).unwrap();
        let (status, _) = call(&app, get("/api/applications", &format!("Bearer {}", forged))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_offer_letter_flow_over_http() {
        let world = World::new().await;
        let app = router(&world, None);
        let buyer = bearer(&world.buyer, Role::Buyer);
        let developer = bearer(&world.developer, Role::Developer);
        let hsf = bearer(&world.hsf, Role::Admin);

        let (status, body) = call(
            &app,
            post_json(
                "/api/applications",
                &buyer,
                json!({"property_id": world.property.id, "financing_type": "outright"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let app_id = body["data"]["id"].as_str().unwrap().to_string();

        let offer_uri = format!("/api/applications/{}/offer-letter", app_id);
        let (status, body) = call(&app, post_json(&offer_uri, &buyer, json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let approval_id = body["data"]["approval"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, post_json(&offer_uri, &buyer, json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, body) = call(&app, get("/api/review-approvals/pending", &developer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let resolve_uri = format!("/api/review-approvals/{}/resolve", approval_id);
        let (status, _) = call(
            &app,
            post_json(&resolve_uri, &hsf, json!({"decision": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            post_json(&resolve_uri, &developer, json!({"decision": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let next_id = body["data"]["next"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            post_json(
                &format!("/api/review-approvals/{}/resolve", next_id),
                &hsf,
                json!({"decision": "approve"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["terminal"], "approved");

        let (status, body) = call(&app, get(&format!("/api/applications/{}", app_id), &buyer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["application"]["status"], "processing");

        let (status, body) = call(
            &app,
            get(&format!("/api/applications/{}/stages", app_id), &buyer),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let world = World::new().await;
        let app = router(&world, None);
        let buyer = bearer(&world.buyer, Role::Buyer);

        let (status, body) = call(
            &app,
            get(&format!("/api/applications/{}", uuid::Uuid::new_v4()), &buyer),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    fn signed(body: &str, secret: &str) -> Request<Body> {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_payment_webhook_checks_signature() {
        let world = World::new().await;
        let body = json!({
            "event": "transfer.failed",
            "data": {"reference": "t-9", "amount": "10"}
        })
        .to_string();

        let closed = router(&world, None);
        let (status, _) = call(&closed, signed(&body, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let app = router(&world, Some(WEBHOOK_SECRET));
        let (status, _) = call(&app, signed(&body, "wrong-secret")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, response) = call(&app, signed(&body, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["data"], "ignored");
    }

    #[tokio::test]
    async fn test_payment_webhook_records_due_diligence() {
        let world = World::new().await;
        let (app_record, dip) = world.mortgage_with_dip().await;
        world
            .services
            .dips
            .lender_respond(&world.lender, dip.id, true)
            .await
            .unwrap();
        world
            .services
            .dips
            .user_respond(&world.buyer, dip.id, true)
            .await
            .unwrap();

        let app = router(&world, Some(WEBHOOK_SECRET));
        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": "dd-9",
                "amount": "50000",
                "metadata": {"application_id": app_record.id, "paymentType": "dueDiligence"}
            }
        })
        .to_string();

        let (status, response) = call(&app, signed(&body, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["data"], "due_diligence_recorded");

        let buyer = bearer(&world.buyer, Role::Buyer);
        let (status, response) = call(&app, get(&format!("/api/dips/{}", dip.id), &buyer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["data"]["status"], "documents_pending");
    }

    #[tokio::test]
    async fn test_dip_responses_over_http() {
        let world = World::new().await;
        let (_app_record, dip) = world.mortgage_with_dip().await;
        let app = router(&world, None);
        let lender = bearer(&world.lender, Role::Lender);

        let uri = format!("/api/dips/{}/lender-response", dip.id);
        let (status, body) = call(&app, post_json(&uri, &lender, json!({"accept": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "awaiting_user_action");

        let (status, _) = call(&app, post_json(&uri, &lender, json!({"accept": true}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
