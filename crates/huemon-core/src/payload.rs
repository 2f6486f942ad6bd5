//! Decoding of bridge resource payloads.
//!
//! Bridge responses wrap resources as `{"errors": [...], "data": [...]}`.
//! Capability values live in a kind-specific section which may nest a
//! `<value>_report` object:
//!
//! ```json
//! {"motion": {"motion": true, "motion_report": {"changed": "2026-10-18T20:30:12.345Z", "motion": true}}}
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;

use huemon_types::{SampleValue, ServiceKind};

use crate::api::{DeviceRecord, ServiceRef};
use crate::error::{Error, Result};

/// A value read from a service section, before local-time conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// The value; `Null` when the value field was absent.
    pub value: SampleValue,
    /// Bridge change timestamp, if the payload carried one.
    pub changed: Option<DateTime<Utc>>,
}

/// Return the `data` array of a response body, failing on reported errors.
pub fn data_items(body: &Value) -> Result<&Vec<Value>> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array)
        && let Some(first) = errors.first()
    {
        let description = first
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::Api(description.to_string()));
    }
    body.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::invalid_data("response has no data array"))
}

/// Parse a `GET devices` body. Entries without product data or metadata are skipped.
pub fn parse_devices(body: &Value) -> Result<Vec<DeviceRecord>> {
    Ok(data_items(body)?
        .iter()
        .filter_map(|device| {
            Some(DeviceRecord {
                id: device.get("id")?.as_str()?.to_string(),
                name: device.pointer("/metadata/name")?.as_str()?.to_string(),
                product_name: device
                    .pointer("/product_data/product_name")?
                    .as_str()?
                    .to_string(),
            })
        })
        .collect())
}

/// Parse a `GET device/{id}` body into its service references.
pub fn parse_device_services(body: &Value) -> Result<Vec<ServiceRef>> {
    let device = data_items(body)?
        .first()
        .ok_or_else(|| Error::invalid_data("device response is empty"))?;
    let services = device
        .get("services")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::invalid_data("device has no services"))?;
    Ok(services
        .iter()
        .filter_map(|service| {
            Some(ServiceRef {
                id: service.get("rid")?.as_str()?.to_string(),
                rtype: service.get("rtype")?.as_str()?.to_string(),
            })
        })
        .collect())
}

/// Read a capability value out of a resource object.
///
/// The report sub-object is preferred over the section itself. A missing
/// section is an error; a missing value field yields [`SampleValue::Null`].
pub fn read_section(kind: ServiceKind, resource: &Value) -> Result<Reading> {
    let section = resource
        .get(kind.section())
        .filter(|s| s.is_object())
        .ok_or_else(|| Error::invalid_data(format!("missing '{}' section", kind.section())))?;
    let body = section
        .get(kind.report_field())
        .filter(|r| r.is_object())
        .unwrap_or(section);

    let value = body
        .get(kind.value_field())
        .map(json_to_value)
        .unwrap_or(SampleValue::Null);
    let changed = body
        .get("changed")
        .and_then(Value::as_str)
        .and_then(parse_changed);

    Ok(Reading { value, changed })
}

/// The `enabled` flag of a resource object, if it has one.
pub fn enabled_flag(resource: &Value) -> Option<bool> {
    resource.get("enabled").and_then(Value::as_bool)
}

/// Parse a bridge change timestamp such as `2026-10-18T20:30:12.345Z`.
pub fn parse_changed(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn json_to_value(value: &Value) -> SampleValue {
    match value {
        Value::Bool(b) => SampleValue::Bool(*b),
        Value::Number(n) => n.as_f64().map(SampleValue::Number).unwrap_or(SampleValue::Null),
        _ => SampleValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_report_object_is_preferred() {
        let resource = json!({
            "motion": {
                "motion": false,
                "motion_report": {"changed": "2026-10-18T20:30:12.345Z", "motion": true}
            }
        });
        let reading = read_section(ServiceKind::Motion, &resource).unwrap();
        assert_eq!(reading.value, SampleValue::Bool(true));
        assert_eq!(
            reading.changed.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2026, 10, 18, 20, 30, 12).unwrap().timestamp()
        );
    }

    #[test]
    fn test_falls_back_to_section() {
        let resource = json!({"power_state": {"battery_level": 87, "battery_state": "normal"}});
        let reading = read_section(ServiceKind::Power, &resource).unwrap();
        assert_eq!(reading.value, SampleValue::Number(87.0));
        assert_eq!(reading.changed, None);
    }

    #[test]
    fn test_missing_value_is_null() {
        let resource = json!({"light": {"light_level_report": {"changed": "2026-10-18T20:30:12Z"}}});
        let reading = read_section(ServiceKind::Light, &resource).unwrap();
        assert!(reading.value.is_null());
        assert!(reading.changed.is_some());
    }

    #[test]
    fn test_missing_section_is_error() {
        let resource = json!({"id": "abc"});
        assert!(matches!(
            read_section(ServiceKind::Temperature, &resource),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_parse_devices_skips_incomplete() {
        let body = json!({"errors": [], "data": [
            {"id": "d1", "metadata": {"name": "Hall"}, "product_data": {"product_name": "Hue motion sensor"}},
            {"id": "d2", "metadata": {"name": "Orphan"}}
        ]});
        let devices = parse_devices(&body).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Hall");
    }

    #[test]
    fn test_reported_errors_become_api_error() {
        let body = json!({"errors": [{"description": "unauthorized user"}], "data": []});
        let err = parse_devices(&body).unwrap_err();
        assert!(err.to_string().contains("unauthorized user"));
    }

    #[test]
    fn test_parse_device_services() {
        let body = json!({"data": [{"id": "d1", "services": [
            {"rid": "s1", "rtype": "motion"},
            {"rid": "s2", "rtype": "zigbee_connectivity"}
        ]}]});
        let services = parse_device_services(&body).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].kind(), Some(ServiceKind::Motion));
        assert_eq!(services[1].kind(), None);
    }

    #[test]
    fn test_enabled_flag() {
        assert_eq!(enabled_flag(&json!({"enabled": false})), Some(false));
        assert_eq!(enabled_flag(&json!({"power_state": {}})), None);
    }
}
