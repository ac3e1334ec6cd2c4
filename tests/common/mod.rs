#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use lms_scorm_backend::{
    auth::Claims,
    config::AppConfig,
    mailer::LogMailer,
    models::{Course, Language, NewCourse, NewUser, User},
    router,
    store::{memory::MemoryStore, CourseRepository, TeamRepository},
    AppState,
};
use serde_json::Value;
use std::{
    io::{Cursor, Write},
    sync::Arc,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret-key-at-least-32-characters-long";
const BOUNDARY: &str = "lms-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
    _data: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let data = tempfile::tempdir().unwrap();
        let config = AppConfig::for_data_dir(data.path(), SECRET);
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config.clone(), store.clone(), Arc::new(LogMailer));
        Self { app: router(state), store, config, _data: data }
    }

    pub async fn superuser(&self) -> User {
        self.store
            .create_user(&NewUser {
                email: "root@example.com".into(),
                first_name: "Root".into(),
                last_name: "Admin".into(),
                is_superuser: true,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn member(&self, email: &str, company_id: Option<i64>, is_admin: bool) -> User {
        self.store
            .create_user(&NewUser {
                email: email.into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                company_id,
                is_admin,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn course(&self, title: &str) -> Course {
        self.store
            .create_course(&NewCourse {
                title: title.into(),
                description: "A course".into(),
                price: 99.0,
                language: Language::En,
                is_marketplace: true,
                time_to_complete: 45,
                company_id: None,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, user: Option<&User>) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, user).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, user: Option<&User>) -> (StatusCode, Value) {
        self.send(request(Method::DELETE, uri, user).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, user: Option<&User>, body: Value) -> (StatusCode, Value) {
        self.send_json(Method::POST, uri, user, body).await
    }

    pub async fn put_json(&self, uri: &str, user: Option<&User>, body: Value) -> (StatusCode, Value) {
        self.send_json(Method::PUT, uri, user, body).await
    }

    async fn send_json(&self, method: Method, uri: &str, user: Option<&User>, body: Value) -> (StatusCode, Value) {
        let req = request(method, uri, user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    /// Uploads `archive` as the `file` field; `language` is omitted when `None`.
    pub async fn upload(
        &self,
        method: Method,
        uri: &str,
        user: &User,
        language: Option<&str>,
        file_name: &str,
        archive: &[u8],
    ) -> (StatusCode, Value) {
        let req = request(method, uri, Some(user))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(language, file_name, archive)))
            .unwrap();
        self.send(req).await
    }
}

pub fn token_for(user_id: i64) -> String {
    let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
    encode(&Header::default(), &Claims { user_id, exp }, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn request(method: Method, uri: &str, user: Option<&User>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match user {
        Some(u) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(u.id))),
        None => builder,
    }
}

pub fn multipart_body(language: Option<&str>, file_name: &str, archive: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(lang) = language {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\n{lang}\r\n"
        )
        .unwrap();
    }
    write!(
        body,
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
    )
    .unwrap();
    body.extend_from_slice(archive);
    write!(body, "\r\n--{BOUNDARY}--\r\n").unwrap();
    body
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        w.start_file(*name, zip::write::FileOptions::default()).unwrap();
        w.write_all(data).unwrap();
    }
    w.finish().unwrap().into_inner()
}

pub fn scorm_zip(title: &str) -> Vec<u8> {
    let manifest = format!(
        r#"<?xml version="1.0"?>
<manifest identifier="pkg-{title}" xmlns="http://www.imsproject.org/xsd/imscp_rootv1p1p2">
  <organizations default="org1">
    <organization identifier="org1"><item identifier="i1" identifierref="r1"/></organization>
  </organizations>
  <resources><resource identifier="r1" href="index.html"/></resources>
</manifest>"#
    );
    zip_bytes(&[
        ("imsmanifest.xml", manifest.as_bytes()),
        ("index.html", format!("<html><head></head><body>{title}</body></html>").as_bytes()),
        ("assets/app.js", b"console.log(1)"),
    ])
}
