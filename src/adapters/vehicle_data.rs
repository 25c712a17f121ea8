use crate::config::toml_config::VehicleDataConfig;
use crate::domain::model::{DataPackage, PackageRecord, SpecificationRecord, ValuationRecord};
use crate::domain::ports::VehicleDataProvider;
use crate::utils::error::{AssessmentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const SUCCESS_STATUS: &str = "Success";

/// Client for the UK Vehicle Data package API.
///
/// A request is made once. Any non-success status, a `Response.StatusCode`
/// other than `Success`, or a missing or null field fails the lookup.
pub struct VehicleDataGateway {
    client: Client,
    base_url: String,
    api_key: String,
    package_version: u32,
}

impl VehicleDataGateway {
    pub fn from_config(config: &VehicleDataConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AssessmentError::config(format!("cannot build lookup client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            package_version: config.package_version,
        })
    }

    async fn fetch_body(&self, registration: &str, package: DataPackage) -> Result<(u16, Value)> {
        let endpoint = format!("{}/api/datapackage/{}", self.base_url, package.as_str());
        tracing::debug!("📡 Looking up {} for {}", package.as_str(), registration);

        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("v", self.package_version.to_string()),
                ("api_nullitems", "1".to_string()),
                ("key_vrm", registration.to_string()),
                ("auth_apikey", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| AssessmentError::FetchError {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssessmentError::FetchError {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        let body: Value = response.json().await.map_err(|e| AssessmentError::FetchError {
            status: status.as_u16(),
            reason: format!("response body is not JSON: {}", e),
        })?;

        let remote_status = body
            .pointer("/Response/StatusCode")
            .and_then(Value::as_str)
            .unwrap_or("missing");
        if remote_status != SUCCESS_STATUS {
            let message = body
                .pointer("/Response/StatusMessage")
                .and_then(Value::as_str)
                .unwrap_or("no status message");
            return Err(AssessmentError::FetchError {
                status: status.as_u16(),
                reason: format!("lookup status {}: {}", remote_status, message),
            });
        }

        Ok((status.as_u16(), body))
    }
}

/// Reads fields under `Response/DataItems`, turning gaps into `FetchError`.
struct DataItems<'a> {
    status: u16,
    items: &'a Value,
}

impl<'a> DataItems<'a> {
    fn new(status: u16, body: &'a Value) -> Result<Self> {
        let items = body
            .pointer("/Response/DataItems")
            .filter(|items| items.is_object())
            .ok_or_else(|| missing_field(status, "Response.DataItems"))?;
        Ok(Self { status, items })
    }

    fn required(&self, path: &str) -> Result<&'a Value> {
        self.items
            .pointer(path)
            .filter(|value| !value.is_null())
            .ok_or_else(|| missing_field(self.status, path))
    }

    fn optional(&self, path: &str) -> Option<&'a Value> {
        self.items.pointer(path).filter(|value| !value.is_null())
    }

    fn string(&self, path: &str) -> Result<String> {
        match self.required(path)? {
            Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Value::Number(number) => Ok(number.to_string()),
            _ => Err(missing_field(self.status, path)),
        }
    }

    /// Numbers sometimes arrive as strings.
    fn number(&self, path: &str) -> Result<f64> {
        let value = self.required(path)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
            .ok_or_else(|| missing_field(self.status, path))
    }

    fn integer<T: TryFrom<u64>>(&self, path: &str) -> Result<T> {
        let number = self.number(path)?;
        if number < 0.0 || number.fract() != 0.0 {
            return Err(missing_field(self.status, path));
        }
        T::try_from(number as u64).map_err(|_| missing_field(self.status, path))
    }

    fn boolean(&self, path: &str) -> Result<bool> {
        match self.required(path)? {
            Value::Bool(flag) => Ok(*flag),
            Value::String(text) if text.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(text) if text.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(missing_field(self.status, path)),
        }
    }
}

fn missing_field(status: u16, path: &str) -> AssessmentError {
    AssessmentError::FetchError {
        status,
        reason: format!("response is missing {}", path.trim_start_matches('/').replace('/', ".")),
    }
}

pub fn parse_valuation(status: u16, body: &Value) -> Result<ValuationRecord> {
    let items = DataItems::new(status, body)?;
    Ok(ValuationRecord {
        trade_retail: items.number("/ValuationList/TradeRetail")?,
        mileage: items
            .optional("/Mileage")
            .and_then(|value| value.as_u64().or_else(|| value.as_str()?.trim().parse().ok())),
        plate_year: items.optional("/PlateYear").map(value_text),
        description: items.optional("/VehicleDescription").map(value_text),
    })
}

pub fn parse_specification(status: u16, body: &Value) -> Result<SpecificationRecord> {
    let items = DataItems::new(status, body)?;
    Ok(SpecificationRecord {
        make: items.string("/ClassificationDetails/Dvla/Make")?,
        model: items.string("/ClassificationDetails/Dvla/Model")?,
        year: items.integer("/VehicleRegistration/YearOfManufacture")?,
        body_style: items.string("/SmmtDetails/BodyStyle")?,
        fuel_type: items.string("/VehicleRegistration/FuelType")?,
        transmission: items.string("/VehicleRegistration/Transmission")?,
        door_count: items.integer("/TechnicalDetails/Dimensions/NumberOfDoors")?,
        kerb_weight: items.integer("/TechnicalDetails/Dimensions/KerbWeight")?,
        is_electric: items.boolean("/ClassificationDetails/Ukvd/IsElectricVehicle")?,
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VehicleDataProvider for VehicleDataGateway {
    async fn fetch(&self, registration: &str, package: DataPackage) -> Result<PackageRecord> {
        let (status, body) = self.fetch_body(registration, package).await?;
        let record = match package {
            DataPackage::Valuation => PackageRecord::Valuation(parse_valuation(status, &body)?),
            DataPackage::Specification => {
                PackageRecord::Specification(parse_specification(status, &body)?)
            }
        };
        tracing::debug!("{} for {} decoded", package.as_str(), registration);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn specification_body() -> Value {
        json!({
            "Response": {
                "StatusCode": "Success",
                "DataItems": {
                    "TechnicalDetails": {"Dimensions": {"NumberOfDoors": 5, "KerbWeight": 1270}},
                    "ClassificationDetails": {
                        "Dvla": {"Make": "VOLKSWAGEN", "Model": "GOLF"},
                        "Ukvd": {"IsElectricVehicle": false}
                    },
                    "VehicleRegistration": {
                        "YearOfManufacture": "2014",
                        "Transmission": "MANUAL",
                        "FuelType": "PETROL"
                    },
                    "SmmtDetails": {"BodyStyle": "HATCHBACK"}
                }
            }
        })
    }

    #[test]
    fn test_specification_fields() {
        let record = parse_specification(200, &specification_body()).unwrap();
        assert_eq!(record.make, "VOLKSWAGEN");
        assert_eq!(record.year, 2014);
        assert_eq!(record.door_count, 5);
        assert_eq!(record.kerb_weight, 1270);
        assert!(!record.is_electric);
    }

    #[test]
    fn test_null_field_is_a_fetch_error() {
        let mut body = specification_body();
        body["Response"]["DataItems"]["SmmtDetails"]["BodyStyle"] = Value::Null;

        match parse_specification(200, &body) {
            Err(AssessmentError::FetchError { status, reason }) => {
                assert_eq!(status, 200);
                assert!(reason.contains("SmmtDetails.BodyStyle"), "{}", reason);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_valuation_accepts_string_numbers_and_optional_extras() {
        let body = json!({
            "Response": {
                "StatusCode": "Success",
                "DataItems": {
                    "ValuationList": {"TradeRetail": "5000"},
                    "Mileage": null,
                    "PlateYear": "14"
                }
            }
        });
        let record = parse_valuation(200, &body).unwrap();
        assert_eq!(record.trade_retail, 5000.0);
        assert_eq!(record.mileage, None);
        assert_eq!(record.plate_year.as_deref(), Some("14"));
        assert_eq!(record.description, None);
    }
}
