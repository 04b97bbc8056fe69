use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::router;
use crate::{testing, App};

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(router: &Router, req: Request<Body>) -> Reply {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={}&password={}", username, password)))
        .unwrap()
}

fn refresh_request(cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri("/refresh_token");
    if let Some(token) = cookie {
        builder = builder.header(header::COOKIE, format!("refresh_token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn refresh_cookie(headers: &HeaderMap) -> String {
    let cookie = headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("HttpOnly"));
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("refresh_token="))
        .unwrap()
        .to_string()
}

async fn setup() -> (Arc<App>, Router) {
    let (app, _mailer) = testing::app().await;
    let router = router(app.clone());
    (app, router)
}

/// Registers `name` through the API and logs it in, returning the access
/// token and the refresh cookie.
async fn signed_in(router: &Router, name: &str) -> (String, String) {
    let reply = send(
        router,
        request(
            Method::POST,
            "/operator",
            None,
            Some(json!({ "nom": name, "password": "secret" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(router, login_request(name, "secret")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["token_type"], "bearer");
    let access = reply.body["access_token"].as_str().unwrap().to_string();
    (access, refresh_cookie(&reply.headers))
}

#[tokio::test]
async fn root_answers_without_credentials() {
    let (_app, router) = setup().await;
    let reply = send(&router, request(Method::GET, "/", None, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["message"].is_string());
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (_app, router) = setup().await;
    let reply = send(&router, request(Method::GET, "/nope", None, None)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["detail"], "Invalid path: /nope");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (_app, router) = setup().await;
    signed_in(&router, "alice").await;
    let reply = send(&router, login_request("alice", "wrong")).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(reply.body["detail"], "Incorrect username or password");
}

#[tokio::test]
async fn protected_routes_require_bearer() {
    let (_app, router) = setup().await;
    let reply = send(&router, request(Method::GET, "/etudiants", None, None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["detail"], "Not authenticated");

    let reply = send(
        &router,
        request(Method::GET, "/operator/me", Some("not-a-token"), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["detail"], "Token non valide");
}

#[tokio::test]
async fn refresh_cookie_mints_access_token_until_logout() {
    let (_app, router) = setup().await;
    let (access, cookie) = signed_in(&router, "alice").await;

    let reply = send(&router, refresh_request(Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let fresh = reply.body["access_token"].as_str().unwrap().to_string();

    let reply = send(&router, request(Method::GET, "/operator/me", Some(&fresh), None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["nom"], "alice");
    assert!(reply.body.get("refresh_token").is_none());

    // A refresh token is not an access token.
    let reply = send(&router, request(Method::GET, "/operator/me", Some(&cookie), None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(&router, request(Method::POST, "/logout", Some(&access), None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cleared = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let reply = send(&router, refresh_request(Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["detail"], "Refresh token non valide");

    let reply = send(&router, refresh_request(None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["detail"], "Refresh token non fourni");
}

#[tokio::test]
async fn student_lifecycle() {
    let (_app, router) = setup().await;
    let (access, _cookie) = signed_in(&router, "alice").await;
    let input = serde_json::to_value(testing::student("IM-001", Some("101"))).unwrap();

    let reply = send(
        &router,
        request(Method::POST, "/etudiants", Some(&access), Some(input.clone())),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let id = reply.body["id"].as_i64().unwrap();
    let qr = reply.body["qrcode"][0]["data"].as_str().unwrap().to_string();
    assert!(qr.starts_with(&format!("{}_", id)));

    let reply = send(
        &router,
        request(Method::POST, "/etudiants", Some(&access), Some(input)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["detail"], "L'étudiant existe déja.");

    // Public lookups, by registration number then by QR token.
    let reply = send(&router, request(Method::GET, "/etudiants/IM-001", None, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], id);
    let reply = send(&router, request(Method::GET, &format!("/etudiants/{}", qr), None, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["matricule"], "IM-001");

    let reply = send(
        &router,
        request(
            Method::PUT,
            &format!("/etudiants/{}", id),
            Some(&access),
            Some(json!({ "niveau": "M1", "cin": null })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["niveau"], "M1");
    assert_eq!(reply.body["cin"], Value::Null);
    assert_eq!(reply.body["qrcode"].as_array().unwrap().len(), 1);

    let reply = send(
        &router,
        request(Method::GET, "/etudiants?skip=0&limit=10", Some(&access), None),
    )
    .await;
    assert_eq!(reply.body.as_array().unwrap().len(), 1);

    let reply = send(
        &router,
        request(Method::DELETE, &format!("/etudiants/{}", id), Some(&access), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Étudiant supprimé avec succès");

    let reply = send(
        &router,
        request(Method::DELETE, &format!("/etudiants/{}", id), Some(&access), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&router, request(Method::GET, "/journal", Some(&access), None)).await;
    let entries = reply.body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["operation"], "Création d'un étudiant");
    assert_eq!(entries[0]["effectue_par"]["nom"], "alice");
    assert_eq!(entries[2]["etudiant"], "Etudiant indisponible");
    assert!(entries[2]["operation"]
        .as_str()
        .unwrap()
        .starts_with("Suppression de Jean Dupont IM: IM-001"));
}

#[tokio::test]
async fn unknown_student_key_is_not_found() {
    let (_app, router) = setup().await;
    let reply = send(
        &router,
        request(Method::GET, "/etudiants/1_00000000-0000-0000-0000-000000000000", None, None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["detail"], "Étudiant non enregistré.");
}

#[tokio::test]
async fn disabled_operator_is_turned_away() {
    let (app, router) = setup().await;
    let (admin, _) = signed_in(&router, "admin").await;
    let (bob, _) = signed_in(&router, "bob").await;
    let bob_id = crate::operators::find_by_name(&app.db, "bob")
        .await
        .unwrap()
        .unwrap()
        .id;

    let reply = send(
        &router,
        request(
            Method::PUT,
            &format!("/operators/{}", bob_id),
            Some(&admin),
            Some(json!({ "disabled": true })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["disabled"], true);

    let reply = send(&router, request(Method::GET, "/operator/me", Some(&bob), None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["detail"], "Opérateur désactivé.");

    let reply = send(&router, request(Method::GET, "/operators", Some(&admin), None)).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn journal_filters_by_date() {
    let (_app, router) = setup().await;
    let (access, _) = signed_in(&router, "alice").await;

    for (operation, date) in [
        ("Inventaire", "2024-01-10T08:00:00Z"),
        ("Rentrée", "2024-03-01T08:00:00Z"),
        ("Examens", "2024-06-15T08:00:00Z"),
    ] {
        let reply = send(
            &router,
            request(
                Method::POST,
                "/journal",
                Some(&access),
                Some(json!({ "operation": operation, "date": date })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["effectue_par"]["nom"], "alice");
    }

    let reply = send(
        &router,
        request(
            Method::GET,
            "/journal?debut=2024-02-01T00:00:00Z",
            Some(&access),
            None,
        ),
    )
    .await;
    let names: Vec<_> = reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["operation"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Rentrée", "Examens"]);

    let reply = send(
        &router,
        request(
            Method::GET,
            "/journal?debut=2024-02-01T00:00:00Z&fin=2024-04-01T00:00:00Z",
            Some(&access),
            None,
        ),
    )
    .await;
    let entries = reply.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let id = entries[0]["id"].as_i64().unwrap();

    let reply = send(
        &router,
        request(Method::DELETE, &format!("/journal/{}", id), Some(&access), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(
        &router,
        request(Method::GET, &format!("/journal/{}", id), Some(&access), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["detail"], "Opération non enregistrée.");
}

#[tokio::test]
async fn malformed_requests_answer_with_detail() {
    let (_app, router) = setup().await;
    let (access, _) = signed_in(&router, "alice").await;

    let truncated_login = Request::builder()
        .method(Method::POST)
        .uri("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=alice"))
        .unwrap();

    for req in [
        request(
            Method::PUT,
            "/etudiants/IM-001",
            Some(&access),
            Some(json!({ "niveau": "M1" })),
        ),
        request(Method::POST, "/etudiants", Some(&access), Some(json!({ "nom": "x" }))),
        request(Method::GET, "/etudiants?skip=-1", Some(&access), None),
        request(Method::DELETE, "/journal/abc", Some(&access), None),
        truncated_login,
    ] {
        let uri = req.uri().to_string();
        let reply = send(&router, req).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(reply.body["detail"].is_string(), "{}", uri);
    }
}
