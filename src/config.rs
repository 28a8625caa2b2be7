//! Runtime configuration for the fuel-in services.

use std::time::Duration;

use crate::pagination::PaginationConfig;

/// The request timeout used for the tank gauge and cloud ledger when none is given.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Values that are read once at startup and handed to each component.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Controls the number of fuel-in records per page.
    pub pagination: PaginationConfig,
    /// The cloud ledger URL for manually recorded deliveries.
    pub fuel_in_cloud_url: String,
    /// The cloud ledger URL for deliveries measured with the tank gauge.
    pub atg_fuel_in_cloud_url: String,
    /// The URL of the live tank gauge feed.
    pub tank_data_url: String,
    /// How long to wait for the tank gauge or cloud ledger before giving up.
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Create a config with the default page size and request timeout.
    pub fn new(
        fuel_in_cloud_url: &str,
        atg_fuel_in_cloud_url: &str,
        tank_data_url: &str,
    ) -> Self {
        Self {
            pagination: PaginationConfig::default(),
            fuel_in_cloud_url: fuel_in_cloud_url.to_owned(),
            atg_fuel_in_cloud_url: atg_fuel_in_cloud_url.to_owned(),
            tank_data_url: tank_data_url.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the maximum number of records per page.
    pub fn page_limit(mut self, page_limit: u64) -> Self {
        self.pagination.page_limit = page_limit;
        self
    }

    /// Set the timeout for outbound requests.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
