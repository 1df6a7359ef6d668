mod api;

pub use api::{HealthResponse, MaintenanceStatusResponse, SetMaintenanceRequest};
