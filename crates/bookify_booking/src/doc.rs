// File: crates/bookify_booking/src/doc.rs
#![cfg(feature = "openapi")]

use bookify_common::models::{Booking, BookingStatus};
use utoipa::OpenApi;

use crate::guard::CustomerDetails;
use crate::handlers::{
    CancelBookingRequest, CreateBookingRequest, CreateSlotBookingRequest,
    RescheduleBookingRequest,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::create_booking_handler,
        crate::handlers::create_slot_booking_handler,
        crate::handlers::cancel_booking_handler,
        crate::handlers::reschedule_booking_handler
    ),
    components(
        schemas(
            Booking,
            BookingStatus,
            CustomerDetails,
            CreateBookingRequest,
            CreateSlotBookingRequest,
            CancelBookingRequest,
            RescheduleBookingRequest
        )
    ),
    tags(
        (name = "Booking", description = "Booking admission, cancellation and rescheduling")
    ),
    servers(
        (url = "/api", description = "Bookify API server")
    )
)]
pub struct BookingApiDoc;
