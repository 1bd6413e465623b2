// File: crates/bookify_availability/src/doc.rs
#![cfg(feature = "openapi")]

use utoipa::OpenApi;

use crate::handlers::{
    AvailabilityCheckRequest, AvailabilityCheckResponse, AvailableSlotsResponse,
};
use crate::slots::Slot;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::get_availability_handler,
        crate::handlers::check_availability_handler
    ),
    components(
        schemas(
            Slot,
            AvailableSlotsResponse,
            AvailabilityCheckRequest,
            AvailabilityCheckResponse
        )
    ),
    tags(
        (name = "Availability", description = "Bookable slots per provider and day")
    ),
    servers(
        (url = "/api", description = "Bookify API server")
    )
)]
pub struct AvailabilityApiDoc;
