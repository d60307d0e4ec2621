use crate::{network_probe::ScanResult, services::connectivity::StatusReport};
use actix_web::HttpResponse;
use anyhow::Result;
use log::error;
use serde::Serialize;

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for () {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().finish()
    }
}

impl ServiceResultResponse for StatusReport {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "StatusReport")
    }
}

impl ServiceResultResponse for ScanResult {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "ScanResult")
    }
}

fn json_response<T: Serialize>(value: &T, name: &str) -> HttpResponse {
    match serde_json::to_string(value) {
        Ok(json) => HttpResponse::Ok()
            .content_type("application/json")
            .body(json),
        Err(e) => {
            error!("failed to serialize {name}: {e:#}");
            HttpResponse::InternalServerError().body("failed to serialize response")
        }
    }
}

/// Turn a service result into a response
///
/// Success goes through [`ServiceResultResponse`]; failure is logged with
/// `operation` and answered with 500 and the error text.
pub fn handle_service_result<T>(result: Result<T>, operation: &str) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => {
            error!("{operation} failed: {e:#}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}
