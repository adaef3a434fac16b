use std::time::Duration;

use reqwest::{Method, StatusCode};

use serde_json::{json, Value};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use wiremock::matchers::*;
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{random_ip, TestApp};

async fn mount_email_ok(app: &TestApp) {
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;
}

#[sqlx::test]
async fn subscribe_returns_created_and_stores_normalized_email(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;

    let res = app
        .subscribe_email("Test@Example.com  ")
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(true, body["success"]);
    assert_eq!("SUCCESS", body["code"]);
    assert_eq!("test@example.com", body["data"]["subscription"]["email"]);
    assert_eq!("active", body["data"]["subscription"]["status"]);
    assert_eq!("web", body["data"]["subscription"]["source"]);
    assert_eq!(1, body["data"]["subscriberCount"]);
    assert!(body["timestamp"].is_string());

    let (email, status): (String, String) =
        sqlx::query_as("select email, status from subscriptions")
            .fetch_one(&pool)
            .await?;
    assert_eq!("test@example.com", email);
    assert_eq!("active", status);

    Ok(())
}

#[sqlx::test]
async fn subscribe_stores_source_tags_and_metadata(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;

    let payload = json!({
        "email": "fan@example.com",
        "source": "widget",
        "tags": ["launch", " launch ", "beta"],
        "metadata": { "campaign": "spring" }
    });
    let res = app
        .subscribe(&random_ip(), &payload)
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, res.status());

    let (source, tags, metadata): (String, Vec<String>, sqlx::types::Json<Value>) =
        sqlx::query_as("select source, tags, metadata from subscriptions")
            .fetch_one(&pool)
            .await?;
    assert_eq!("widget", source);
    assert_eq!(vec!["launch".to_string(), "beta".to_string()], tags);
    assert_eq!(json!({ "campaign": "spring" }), metadata.0);

    Ok(())
}

#[sqlx::test]
async fn subscribing_twice_is_already_subscribed(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;

    let first = app
        .subscribe_email("test@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, first.status());

    let second = app
        .subscribe_email("TEST@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::OK, second.status());

    let body: Value = second.json().await.expect("Failed to parse body");
    assert_eq!(true, body["success"]);
    assert_eq!("ALREADY_SUBSCRIBED", body["code"]);
    assert_eq!(1, body["data"]["subscriberCount"]);

    let rows: i64 = sqlx::query_scalar("select count(*) from subscriptions")
        .fetch_one(&pool)
        .await?;
    assert_eq!(1, rows);
    assert_eq!(1, app.subscriber_count().await);

    Ok(())
}

#[sqlx::test]
async fn subscribe_rejects_invalid_email(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let test_cases = vec![
        ("not-an-email", "malformed address"),
        ("", "empty address"),
        ("someone@mailinator.com", "disposable domain"),
        ("someone@MAILINATOR.com ", "disposable domain, mixed case"),
    ];

    for (email, desc) in test_cases {
        let res = app
            .subscribe_email(email)
            .await
            .expect("Failed to execute request");

        assert_eq!(
            StatusCode::BAD_REQUEST,
            res.status(),
            "API did not reject a {}",
            desc
        );
        let body: Value = res.json().await.expect("Failed to parse body");
        assert_eq!(false, body["success"]);
        assert_eq!("VALIDATION_EMAIL", body["code"], "Wrong code for a {}", desc);
    }

    Ok(())
}

#[sqlx::test]
async fn subscribe_suggests_corrections_for_mistyped_domain(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .subscribe_email("user@gmail")
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!("user@gmail.com", body["data"]["suggestions"][0]);

    Ok(())
}

#[sqlx::test]
async fn subscribe_rejects_non_json_content_type(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .request(Method::POST, "subscribe")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("email=test%40example.com")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!("VALIDATION_CONTENT_TYPE", body["code"]);

    Ok(())
}

#[sqlx::test]
async fn subscribe_rejects_malformed_json(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .request(Method::POST, "subscribe")
        .header("Content-Type", "application/json")
        .body(r#"{"email": "test@example.com""#)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!("VALIDATION_JSON", body["code"]);

    Ok(())
}

#[sqlx::test]
async fn subscribe_rejects_oversized_body(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let payload = json!({
        "email": "test@example.com",
        "metadata": { "notes": "x".repeat(20 * 1024) }
    });
    let res = app
        .subscribe(&random_ip(), &payload)
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!(false, body["success"]);
    assert_eq!("VALIDATION_JSON", body["code"]);
    assert!(body["timestamp"].is_string());

    let rows: i64 = sqlx::query_scalar("select count(*) from subscriptions")
        .fetch_one(&pool)
        .await?;
    assert_eq!(0, rows);

    Ok(())
}

#[sqlx::test]
async fn subscribe_rejects_out_of_bounds_shapes(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let too_many_keys: serde_json::Map<String, Value> =
        (0..21).map(|i| (format!("key{}", i), json!(i))).collect();

    let test_cases = vec![
        (json!({}), "missing email"),
        (json!({ "email": 42 }), "non-string email"),
        (
            json!({ "email": "test@example.com", "source": "fax" }),
            "unknown source",
        ),
        (
            json!({ "email": "test@example.com", "tags": (0..11).map(|i| format!("t{}", i)).collect::<Vec<_>>() }),
            "eleven tags",
        ),
        (
            json!({ "email": "test@example.com", "tags": ["  "] }),
            "blank tag",
        ),
        (
            json!({ "email": "test@example.com", "metadata": too_many_keys }),
            "21 metadata keys",
        ),
        (
            json!({ "email": "test@example.com", "metadata": ["not", "an", "object"] }),
            "metadata array",
        ),
    ];

    for (payload, desc) in test_cases {
        let res = app
            .subscribe(&random_ip(), &payload)
            .await
            .expect("Failed to execute request");

        assert_eq!(
            StatusCode::BAD_REQUEST,
            res.status(),
            "API did not reject payload with {}",
            desc
        );
        let body: Value = res.json().await.expect("Failed to parse body");
        assert_eq!("VALIDATION_SCHEMA", body["code"], "Wrong code for {}", desc);
    }

    Ok(())
}

#[sqlx::test]
async fn fourth_rapid_request_is_rate_limited(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;
    let client_ip = random_ip();

    for i in 0..3 {
        let payload = json!({ "email": format!("fan{}@example.com", i) });
        let res = app
            .subscribe(&client_ip, &payload)
            .await
            .expect("Failed to execute request");
        assert_eq!(StatusCode::CREATED, res.status());
    }

    let res = app
        .subscribe(&client_ip, &json!({ "email": "fan3@example.com" }))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::TOO_MANY_REQUESTS, res.status());
    let retry_after: i64 = res
        .headers()
        .get("Retry-After")
        .expect("Missing Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert_eq!("0", res.headers()["X-RateLimit-Remaining"].to_str().unwrap());

    let body: Value = res.json().await.expect("Failed to parse body");
    assert_eq!("RATE_LIMIT_EXCEEDED", body["code"]);

    let rows: i64 = sqlx::query_scalar("select count(*) from subscriptions")
        .fetch_one(&pool)
        .await?;
    assert_eq!(3, rows);

    Ok(())
}

#[sqlx::test]
async fn allowed_requests_report_remaining_quota(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;

    let res = app
        .subscribe_email("fan@example.com")
        .await
        .expect("Failed to execute request");

    assert_eq!("3", res.headers()["X-RateLimit-Limit"].to_str().unwrap());
    assert_eq!("2", res.headers()["X-RateLimit-Remaining"].to_str().unwrap());
    assert!(res.headers().contains_key("X-RateLimit-Reset"));

    Ok(())
}

#[sqlx::test]
async fn repeating_an_email_from_one_client_is_a_conflict(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;
    let client_ip = random_ip();
    let payload = json!({ "email": "fan@example.com" });

    let first = app
        .subscribe(&client_ip, &payload)
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, first.status());

    let second = app
        .subscribe(&client_ip, &payload)
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CONFLICT, second.status());
    assert!(second.headers().contains_key("Retry-After"));

    let body: Value = second.json().await.expect("Failed to parse body");
    assert_eq!("RATE_LIMIT_DUPLICATE", body["code"]);

    Ok(())
}

#[sqlx::test]
async fn other_methods_are_not_allowed(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let res = app
            .request(method.clone(), "subscribe")
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(
            StatusCode::METHOD_NOT_ALLOWED,
            res.status(),
            "{} was allowed",
            method
        );
        assert_eq!("POST", res.headers()["Allow"].to_str().unwrap());

        let body: Value = res.json().await.expect("Failed to parse body");
        assert_eq!("METHOD_NOT_ALLOWED", body["code"]);
    }

    Ok(())
}

#[sqlx::test]
async fn subscribe_sends_welcome_email_with_links(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    app.subscribe_email("fan@example.com")
        .await
        .expect("Failed to execute request");

    let links = app.email_links(0).await;
    let token = |link: &url::Url| {
        link.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .expect("Link has no token")
    };

    let confirmation = token(&links.confirmation);
    let unsubscribe = token(&links.unsubscribe);
    assert_eq!(64, confirmation.len());
    assert_ne!(confirmation, unsubscribe);

    // Only digests are stored
    let stored: i64 =
        sqlx::query_scalar("select count(*) from subscription_tokens where token_hash in ($1, $2)")
            .bind(&confirmation)
            .bind(&unsubscribe)
            .fetch_one(&pool)
            .await?;
    assert_eq!(0, stored);

    Ok(())
}

#[sqlx::test]
async fn subscribe_succeeds_if_email_send_fails(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let res = app
        .subscribe_email("fan@example.com")
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CREATED, res.status());

    let tokens: i64 = sqlx::query_scalar("select count(*) from subscription_tokens")
        .fetch_one(&pool)
        .await?;
    assert_eq!(2, tokens);

    Ok(())
}

#[sqlx::test]
async fn concurrent_subscribes_create_one_row(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    mount_email_ok(&app).await;

    let email = "race@example.com";
    let (a, b, c, d, e) = tokio::join!(
        app.subscribe_email(email),
        app.subscribe_email(email),
        app.subscribe_email(email),
        app.subscribe_email(email),
        app.subscribe_email(email),
    );

    let mut created = 0;
    for res in [a, b, c, d, e] {
        let res = res.expect("Failed to execute request");
        match res.status() {
            StatusCode::CREATED => created += 1,
            StatusCode::OK => {
                let body: Value = res.json().await.expect("Failed to parse body");
                assert_eq!("ALREADY_SUBSCRIBED", body["code"]);
                assert_eq!(1, body["data"]["subscriberCount"]);
            }
            status => panic!("Unexpected status {}", status),
        }
    }
    assert_eq!(1, created);

    let rows: i64 = sqlx::query_scalar("select count(*) from subscriptions where email = $1")
        .bind(email)
        .fetch_one(&pool)
        .await?;
    assert_eq!(1, rows);

    Ok(())
}

#[sqlx::test]
async fn resubscribing_works_with_a_single_connection(pool: PgPool) -> sqlx::Result<()> {
    let single = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .connect_with((*pool.connect_options()).clone())
        .await?;
    let app = TestApp::spawn(&single).await;
    mount_email_ok(&app).await;

    let first = app
        .subscribe_email("solo@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, first.status());

    let second = app
        .subscribe_email("solo@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::OK, second.status());

    let body: Value = second.json().await.expect("Failed to parse body");
    assert_eq!("ALREADY_SUBSCRIBED", body["code"]);
    assert_eq!(1, body["data"]["subscriberCount"]);

    Ok(())
}
