//! End-to-end tests for `POST /validate-file-upload`

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use common::{pdf_with_body, DOS_EXECUTABLE, MINIMAL_PDF, PNG};
use serde_json::Value;
use upload_validator::config::{CrossValidationPolicy, ValidatorConfig};
use upload_validator::server::router;
use upload_validator::state::AppState;

fn server_with(config: ValidatorConfig) -> TestServer {
    let state = AppState::with_config(config).unwrap();
    TestServer::new(router(state)).unwrap()
}

fn server() -> TestServer {
    server_with(ValidatorConfig::default())
}

fn upload(data: impl Into<bytes::Bytes>, filename: &str, mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(data.into())
            .file_name(filename)
            .mime_type(mime),
    )
}

#[tokio::test]
async fn truncated_pdf_is_rejected_for_missing_eof() {
    let mut data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n".to_vec();
    data.resize(50, b' ');

    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(data, "truncated.pdf", "application/pdf"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["code"], "MALFORMED_PDF_EOF");
    assert!(body["error"].as_str().unwrap().contains("EOF"));
}

#[tokio::test]
async fn executable_declared_as_png_is_forbidden() {
    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(DOS_EXECUTABLE, "holiday.png", "image/png"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["code"], "DANGEROUS_FILE_TYPE");
    assert!(body["error"].as_str().unwrap().contains("blocked"));
}

#[tokio::test]
async fn minimal_pdf_is_accepted() {
    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(MINIMAL_PDF, "engagement letter.pdf", "application/pdf"))
        .await;

    response.assert_status_ok();
    assert!(response.headers().contains_key("x-request-id"));

    let body: Value = response.json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["file"]["detectedType"], "pdf");
    assert_eq!(body["file"]["type"], "application/pdf");
    assert_eq!(body["file"]["originalName"], "engagement letter.pdf");
    assert_eq!(body["file"]["size"], MINIMAL_PDF.len());
    assert_eq!(body["file"]["validations"]["structureIntegrity"], true);
    assert_eq!(body["file"]["pdf"]["version"], "1.4");
    assert_eq!(body["file"]["pdf"]["compressedStreams"], 0);
}

#[tokio::test]
async fn pdf_with_embedded_zip_is_a_polyglot() {
    let data = pdf_with_body(b"% attachment PK\x03\x04\x14\x00\x00\x00payload\n");

    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(data, "filing.pdf", "application/pdf"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "POLYGLOT_DETECTED");
}

#[tokio::test]
async fn pdf_with_javascript_action_is_rejected() {
    let data = pdf_with_body(b"4 0 obj\n<< /S /JavaScript /JS (app.alert(1)) >>\nendobj\n");

    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(data, "filing.pdf", "application/pdf"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "ACTIVE_CONTENT_DETECTED");
}

#[tokio::test]
async fn disallowed_declared_type_is_unsupported() {
    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(&b"hello"[..], "notes.txt", "text/x-shellscript"))
        .await;

    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = response.json();
    assert_eq!(body["code"], "MIME_TYPE_NOT_ALLOWED");
}

#[tokio::test]
async fn mismatch_is_a_warning_unless_strict() {
    let response = server()
        .post("/validate-file-upload")
        .multipart(upload(PNG, "scan.jpg", "image/jpeg"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["file"]["detectedType"], "png");
    assert!(!body["file"]["warnings"].as_array().unwrap().is_empty());

    let mut config = ValidatorConfig::default();
    config.mime.cross_validation = CrossValidationPolicy::Strict;
    let response = server_with(config)
        .post("/validate-file-upload")
        .multipart(upload(PNG, "scan.jpg", "image/jpeg"))
        .await;
    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = response.json();
    assert_eq!(body["code"], "CONTENT_TYPE_MISMATCH");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let mut config = ValidatorConfig::default();
    config.limits.max_file_size = 1024;

    let mut data = PNG.to_vec();
    data.resize(4096, 0);

    let response = server_with(config)
        .post("/validate-file-upload")
        .multipart(upload(data, "big.png", "image/png"))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json();
    assert_eq!(body["code"], "FILE_TOO_LARGE");
}

#[tokio::test]
async fn body_over_request_limit_is_too_large() {
    let mut config = ValidatorConfig::default();
    config.limits.max_file_size = 64;
    config.limits.max_pdf_size = 512;
    let request_limit = config.limits.body_limit();

    let mut data = PNG.to_vec();
    data.resize(2 * 1024 * 1024, 0);
    assert!(data.len() > request_limit);

    let response = server_with(config)
        .post("/validate-file-upload")
        .multipart(upload(data, "scan.png", "image/png"))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["code"], "FILE_TOO_LARGE");
    assert_eq!(body["details"]["requestLimit"], request_limit);
    assert_eq!(body["details"]["sizeIsLowerBound"], true);
}

#[tokio::test]
async fn missing_file_field_is_a_bad_request() {
    let form = MultipartForm::new().add_text("comment", "no attachment");

    let response = server()
        .post("/validate-file-upload")
        .multipart(form)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["code"], "MISSING_FILE");
}

#[tokio::test]
async fn health_reports_signature_table() {
    let response = server().get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["signatures"].as_u64().unwrap() > 0);
    assert_eq!(body["components"]["lifecycle"]["status"], "healthy");
}
