//! 백엔드 클라이언트 통합 테스트 (wiremock)

use std::time::Duration;

use cafe_rag::backend::{BackendClient, FetchError};
use cafe_rag::documents::build_documents;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(&server.uri(), Duration::from_secs(2)).expect("valid url")
}

async fn mount_products(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Moka Sidamo", "price": 120, "description": "Café d'Éthiopie",
             "origin": "Éthiopie", "averageRating": 4.5, "category": "Café en grains"},
            {"id": 2, "name": "Espresso Roma", "price": "89.90", "description": "Intense"}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_catalog_with_stats() {
    let server = MockServer::start().await;
    mount_products(&server, "/api/products/with-stats").await;
    Mock::given(method("GET"))
        .and(path("/api/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "productId": 1, "rating": 5, "comment": "Excellent",
             "customerName": "Sara", "isVisible": true, "isVerified": true},
            {"id": 11, "productId": 2, "rating": 2, "comment": "Trop amer", "isVisible": false}
        ])))
        .mount(&server)
        .await;

    let catalog = client(&server).fetch_catalog().await.expect("catalog");
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.reviews.len(), 2);

    let built = build_documents(&catalog.products, &catalog.reviews);
    assert_eq!(built.product_count, 2);
    assert_eq!(built.review_count, 1);
    assert_eq!(
        built.documents[2].text,
        "Avis sur Moka Sidamo : Note 5/5 - Excellent - Client : Sara (Achat vérifié)"
    );
}

#[tokio::test]
async fn fetch_plain_products_path() {
    let server = MockServer::start().await;
    mount_products(&server, "/api/products").await;
    Mock::given(method("GET"))
        .and(path("/api/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let catalog = client(&server)
        .with_stats(false)
        .fetch_catalog()
        .await
        .expect("catalog");
    assert_eq!(catalog.products.len(), 2);
}

#[tokio::test]
async fn review_failure_is_not_fatal() {
    let server = MockServer::start().await;
    mount_products(&server, "/api/products/with-stats").await;
    Mock::given(method("GET"))
        .and(path("/api/reviews"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let catalog = client(&server).fetch_catalog().await.expect("catalog");
    assert_eq!(catalog.products.len(), 2);
    assert!(catalog.reviews.is_empty());
}

#[tokio::test]
async fn malformed_elements_do_not_drop_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/with-stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Moka Sidamo"},
            42,
            {"id": 2, "name": "Espresso Roma"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"productId": 1, "comment": "Excellent"},
            {"productId": 2, "comment": "Bon"},
            null
        ])))
        .mount(&server)
        .await;

    let catalog = client(&server).fetch_catalog().await.expect("catalog");
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.reviews.len(), 2);

    let built = build_documents(&catalog.products, &catalog.reviews);
    assert_eq!(built.review_count, 2);
}

#[tokio::test]
async fn product_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/with-stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).fetch_catalog().await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status, .. } if status.as_u16() == 503));
}

#[tokio::test]
async fn invalid_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/with-stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_products().await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/with-stats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = BackendClient::new(&server.uri(), Duration::from_millis(200)).expect("valid url");
    let err = client.fetch_products().await.unwrap_err();
    assert!(err.is_timeout());
}
