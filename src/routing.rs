//! Application router configuration.

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState, endpoints,
    handlers::{
        close_atg_fuel_in_endpoint, create_fuel_in_endpoint, delete_fuel_in_endpoint,
        get_fuel_in_endpoint, list_fuel_in_by_date_endpoint, list_fuel_in_endpoint,
        list_tank_balances_endpoint, open_atg_fuel_in_endpoint, open_tank_endpoint,
        update_fuel_in_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::FUEL_IN,
            post(create_fuel_in_endpoint)
                .get(list_fuel_in_endpoint)
                .patch(update_fuel_in_endpoint)
                .delete(delete_fuel_in_endpoint),
        )
        .route(endpoints::FUEL_IN_BY_DATE, get(list_fuel_in_by_date_endpoint))
        .route(endpoints::FUEL_IN_BY_ID, get(get_fuel_in_endpoint))
        .route(endpoints::ATG_FUEL_IN, post(open_atg_fuel_in_endpoint))
        .route(
            endpoints::CLOSE_ATG_FUEL_IN,
            post(close_atg_fuel_in_endpoint),
        )
        .route(
            endpoints::TANK_BALANCES,
            post(open_tank_endpoint).get(list_tank_balances_endpoint),
        )
        .with_state(state)
}
