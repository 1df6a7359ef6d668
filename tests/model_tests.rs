//! Serde behaviour of the admin wire types and the persisted status record.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use serde_json::json;

mod admin_tests {
    use super::*;
    use maintenance_gate::models::{MaintenanceStatusResponse, SetMaintenanceRequest};

    #[test]
    fn test_set_request_full() {
        let request: SetMaintenanceRequest =
            serde_json::from_value(json!({"enabled": true, "request_retention_mode_timeout": 30}))
                .unwrap();

        assert!(request.enabled);
        assert_eq!(request.request_retention_mode_timeout, 30);
    }

    #[test]
    fn test_set_request_ignores_unknown_fields() {
        let request: SetMaintenanceRequest =
            serde_json::from_value(json!({"enabled": false, "reason": "deploy"})).unwrap();

        assert!(!request.enabled);
        assert_eq!(request.request_retention_mode_timeout, 0);
    }

    #[test]
    fn test_set_request_rejects_wrong_types() {
        assert!(serde_json::from_value::<SetMaintenanceRequest>(json!({"enabled": "yes"})).is_err());
        assert!(
            serde_json::from_value::<SetMaintenanceRequest>(
                json!({"enabled": true, "request_retention_mode_timeout": -5})
            )
            .is_err()
        );
    }

    #[test]
    fn test_status_response_shape() {
        let status = MaintenanceStatusResponse {
            enabled: false,
            request_retention_mode_timeout: 0,
        };

        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"enabled": false, "request_retention_mode_timeout": 0})
        );
    }
}

mod status_record_tests {
    use super::*;
    use maintenance_gate::gate::{MaintenanceSnapshot, StatusRecord};

    #[test]
    fn test_record_serializes_rfc3339_timestamp() {
        let record = StatusRecord {
            enabled: true,
            updated_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
        };

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"enabled": true, "updated_at": "2024-01-15T10:30:00Z"})
        );
    }

    #[test]
    fn test_record_only_requires_enabled() {
        let record: StatusRecord = serde_json::from_str(r#"{"enabled": true}"#).unwrap();

        assert!(record.enabled);
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn test_record_without_enabled_is_malformed() {
        assert!(serde_json::from_str::<StatusRecord>("{}").is_err());
        assert!(serde_json::from_str::<StatusRecord>(r#"{"enabled": 1}"#).is_err());
    }

    #[test]
    fn test_record_without_timestamp_omits_field() {
        let record = StatusRecord {
            enabled: false,
            updated_at: None,
        };

        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"enabled":false}"#);
    }

    #[test]
    fn test_snapshot_retains_only_with_timeout() {
        let off = MaintenanceSnapshot {
            enabled: true,
            retention_timeout_secs: 0,
        };
        let on = MaintenanceSnapshot {
            enabled: true,
            retention_timeout_secs: 10,
        };

        assert!(!off.retains());
        assert!(on.retains());
    }
}
