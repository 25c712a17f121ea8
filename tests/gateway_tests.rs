use anyhow::Result;
use collision_triage::domain::model::{DataPackage, PackageRecord};
use collision_triage::domain::ports::{InferenceClient, VehicleDataProvider, VisionRequest};
use collision_triage::{AppConfig, AssessmentError, DamageImage, OpenAiGateway, VehicleDataGateway};
use httpmock::prelude::*;
use serde_json::json;

fn config_for(inference_base: &str, vehicle_base: &str) -> Result<AppConfig> {
    let content = format!(
        r#"
[service]
name = "gateway-test"
version = "1.0.0"

[inference]
api_base = "{}"
api_key = "sk-test"
vision_model = "vision-test"
vision_max_tokens = 321
text_max_tokens = 123
timeout_seconds = 5

[vehicle_data]
base_url = "{}"
api_key = "vd-test"
package_version = 2
timeout_seconds = 5
"#,
        inference_base, vehicle_base
    );
    Ok(AppConfig::from_toml_str(&content)?)
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn test_text_completion_sends_model_and_bearer_key() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(
                    r#"{"model": "utility-test", "temperature": 0, "max_tokens": 123}"#,
                );
            then.status(200).json_body(completion("Spoke Site"));
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = OpenAiGateway::from_config(&config.inference)?;

    let answer = gateway
        .text_completion("utility-test", "Pick one option", "The repair is minor")
        .await?;

    assert_eq!(answer, "Spoke Site");
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_vision_completion_carries_images_in_one_call() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .json_body_partial(r#"{"model": "vision-test", "max_tokens": 321}"#)
                .body_contains("data:image/png;base64,AQID")
                .body_contains("data:image/jpeg;base64,BAU=");
            then.status(200).json_body(completion("Front"));
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = OpenAiGateway::from_config(&config.inference)?;
    let subjects = vec![DamageImage::new("claim.png", vec![1, 2, 3])];
    let references = vec![DamageImage::new("golf.jpg", vec![4, 5])];

    let answer = gateway
        .vision_completion(VisionRequest {
            subject_images: &subjects,
            reference_images: &references,
            system_prompt: "Front or rear?",
            user_prompt: "Identify the location",
        })
        .await?;

    assert_eq!(answer, "Front");
    assert_eq!(mock.hits_async().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_inference_failure_keeps_status_and_is_not_retried() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = OpenAiGateway::from_config(&config.inference)?;

    let err = gateway
        .text_completion("utility-test", "system", "user")
        .await
        .unwrap_err();

    match err {
        AssessmentError::InferenceError { status, ref message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(mock.hits_async().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_valuation_lookup_query_and_decoding() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/datapackage/ValuationData")
                .query_param("v", "2")
                .query_param("api_nullitems", "1")
                .query_param("key_vrm", "GJ14WKH")
                .query_param("auth_apikey", "vd-test");
            then.status(200).json_body(json!({
                "Response": {
                    "StatusCode": "Success",
                    "DataItems": {
                        "ValuationList": {"TradeRetail": 5000},
                        "Mileage": 61000,
                        "VehicleDescription": "VOLKSWAGEN GOLF MATCH TSI"
                    }
                }
            }));
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = VehicleDataGateway::from_config(&config.vehicle_data)?;

    match gateway.fetch("GJ14WKH", DataPackage::Valuation).await? {
        PackageRecord::Valuation(valuation) => {
            assert_eq!(valuation.trade_retail, 5000.0);
            assert_eq!(valuation.mileage, Some(61000));
            assert_eq!(
                valuation.description.as_deref(),
                Some("VOLKSWAGEN GOLF MATCH TSI")
            );
        }
        other => panic!("unexpected record: {:?}", other),
    }
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_lookup_with_unsuccessful_status_code_fails() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/datapackage/VehicleData");
            then.status(200).json_body(json!({
                "Response": {
                    "StatusCode": "KeyInvalid",
                    "StatusMessage": "The API key is not valid"
                }
            }));
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = VehicleDataGateway::from_config(&config.vehicle_data)?;

    let err = gateway
        .fetch("GJ14WKH", DataPackage::Specification)
        .await
        .unwrap_err();

    match err {
        AssessmentError::FetchError { status, ref reason } => {
            assert_eq!(status, 200);
            assert!(reason.contains("KeyInvalid"), "{}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_lookup_http_error_is_a_fetch_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/datapackage/ValuationData");
            then.status(404);
        })
        .await;

    let config = config_for(&server.base_url(), &server.base_url())?;
    let gateway = VehicleDataGateway::from_config(&config.vehicle_data)?;

    let err = gateway
        .fetch("ZZ99ZZZ", DataPackage::Valuation)
        .await
        .unwrap_err();

    assert!(matches!(err, AssessmentError::FetchError { status: 404, .. }));
    Ok(())
}
