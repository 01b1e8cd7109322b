//! Integration tests for the tool registry: discovery, validation and each
//! tool's result shape.

mod common;

use common::{FakeExtractor, ScriptedBackend, FAKE_PDF, FOOTER};
use lecture2md::error::{FileValidationError, ToolError};
use lecture2md::pipeline::input::encode_file_data;
use lecture2md::tools::{PdfToTextOutput, ToolParams};
use lecture2md::FileLimits;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

fn params(v: Value) -> ToolParams {
    v.as_object().cloned().unwrap()
}

// ── Discovery ────────────────────────────────────────────────────────────────

#[test]
fn standard_registry_lists_three_tools_by_name() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());

    let names: Vec<String> = registry.list_tools().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["filter_content", "pdf_to_text", "text_to_markdown"]);
    assert!(registry.tool_exists("pdf_to_text"));
    assert!(!registry.tool_exists("summarise"));
    assert!(registry.get_tool("text_to_markdown").is_some());
}

#[test]
fn pdf_schema_serialises_file_constraints() {
    let limits = FileLimits {
        max_file_size: 2048,
    };
    let registry =
        common::registry_with_limits(FakeExtractor::lecture(1), ScriptedBackend::new(), limits);

    let schema = registry.get_tool("pdf_to_text").unwrap().schema().clone();
    let v = serde_json::to_value(&schema).unwrap();

    assert_eq!(v["version"], "1.0.0");
    let param = &v["parameters"][0];
    assert_eq!(param["name"], "file_data");
    assert_eq!(param["type"], "file");
    assert_eq!(param["required"], true);
    assert_eq!(param["mime_types"], json!(["application/pdf"]));
    assert_eq!(param["max_size"], 2048);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());

    let err = assert_err!(registry.execute("summarise", &ToolParams::new()).await);
    assert_eq!(err, ToolError::ToolNotFound { name: "summarise".into() });
}

#[tokio::test]
async fn missing_parameter_is_rejected_before_dispatch() {
    let backend = ScriptedBackend::new();
    let registry = common::registry(FakeExtractor::lecture(1), backend.clone());

    let err = assert_err!(
        registry
            .execute("filter_content", &params(json!({ "text": "x" })))
            .await
    );
    assert_eq!(
        err,
        ToolError::MissingParameters {
            names: vec!["content".into()]
        }
    );

    let err = assert_err!(
        registry
            .execute("text_to_markdown", &params(json!({ "content": null })))
            .await
    );
    assert!(matches!(err, ToolError::MissingParameters { .. }));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn blank_or_mistyped_content_is_invalid() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());

    let err = assert_err!(
        registry
            .execute("filter_content", &params(json!({ "content": "  \n " })))
            .await
    );
    assert!(matches!(err, ToolError::InvalidParameter { ref name, .. } if name == "content"));

    let err = assert_err!(
        registry
            .execute("text_to_markdown", &params(json!({ "content": 42 })))
            .await
    );
    assert_eq!(
        err.to_string(),
        "Invalid parameter 'content': expected a string, got number"
    );
}

// ── pdf_to_text ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_to_text_returns_metadata_and_chunks() {
    let registry = common::registry(FakeExtractor::lecture(3), ScriptedBackend::new());

    let result = assert_ok!(
        registry
            .execute(
                "pdf_to_text",
                &params(json!({ "file_data": encode_file_data(FAKE_PDF) })),
            )
            .await
    );

    let output: PdfToTextOutput = serde_json::from_value(result).unwrap();
    assert_eq!(output.metadata.page_count, 3);
    assert_eq!(output.metadata.title.as_deref(), Some("Lecture 1: Optimisation"));
    assert_eq!(output.total_chunks, output.chunks.len());
    assert_eq!(output.total_chunks, 3);

    for (i, chunk) in output.chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.page_range, (i + 1).to_string());
        assert_eq!(chunk.has_overlap, i > 0);
        assert_eq!(chunk.overlap_content.is_some(), chunk.has_overlap);
        assert!(chunk.content.contains(&format!("=== Page {} ===", i + 1)));
    }
}

#[tokio::test]
async fn pdf_to_text_rejects_oversized_payload() {
    let limits = FileLimits { max_file_size: 16 };
    let extractor = FakeExtractor::lecture(1);
    let registry =
        common::registry_with_limits(extractor.clone(), ScriptedBackend::new(), limits);

    let err = assert_err!(
        registry
            .execute(
                "pdf_to_text",
                &params(json!({ "file_data": encode_file_data(FAKE_PDF) })),
            )
            .await
    );
    assert!(matches!(
        err,
        ToolError::FileValidation(FileValidationError::TooLarge { max: 16, .. })
    ));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn pdf_to_text_accepts_data_url_prefix() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());
    let data_url = format!("data:application/pdf;base64,{}", encode_file_data(FAKE_PDF));

    let result = assert_ok!(
        registry
            .execute("pdf_to_text", &params(json!({ "file_data": data_url })))
            .await
    );
    assert_eq!(result["total_chunks"], 1);
}

// ── Model-backed tools ───────────────────────────────────────────────────────

#[tokio::test]
async fn filter_content_reports_character_lengths() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());
    let content = format!("Gradient descent — step size η\n{FOOTER}");

    let result = assert_ok!(
        registry
            .execute("filter_content", &params(json!({ "content": content })))
            .await
    );

    assert_eq!(result["filtered_content"], "Gradient descent — step size η");
    assert_eq!(result["original_length"], content.chars().count());
    assert_eq!(result["filtered_length"], 30);
}

#[tokio::test]
async fn text_to_markdown_strips_fences() {
    let registry = common::registry(FakeExtractor::lecture(1), ScriptedBackend::new());

    let result = assert_ok!(
        registry
            .execute(
                "text_to_markdown",
                &params(json!({ "content": "Loss: $L(\\theta)$" })),
            )
            .await
    );

    let markdown = result["markdown"].as_str().unwrap();
    assert_eq!(markdown, "## Notes\n\nLoss: $L(\\theta)$");
}

#[tokio::test]
async fn model_auth_failure_surfaces_as_api_error() {
    let backend = ScriptedBackend::failing_on("FILTER:", "secret");
    let registry = common::registry(FakeExtractor::lecture(1), backend.clone());

    let err = assert_err!(
        registry
            .execute("filter_content", &params(json!({ "content": "secret slide" })))
            .await
    );
    assert!(matches!(err, ToolError::Api(ref e) if e.is_auth()));
    assert!(!err.is_client_error());
    assert_eq!(backend.calls(), 1);
}
