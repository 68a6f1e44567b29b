//! API module which contains all the routes for the application.

pub mod account;
pub mod auth;
pub mod nutrition;
pub mod payment;
pub mod req;
pub mod route;
pub mod schema;

use account::AccountApi;
use nutrition::NutritionApi;
use payment::PaymentApi;
use poem_openapi::OpenApiService;
use route::MatchApi;

pub const API_PREFIX: &str = "/api/v1";

pub type CricproApi = (AccountApi, MatchApi, PaymentApi, NutritionApi);

pub fn new_api_service(server_url: &str) -> OpenApiService<CricproApi, ()> {
    OpenApiService::new(
        (AccountApi, MatchApi, PaymentApi, NutritionApi),
        "CricPro",
        "v0.1.0",
    )
    .summary("A RESTful API Service for CricPro.")
    .description("Cricket team management: registrations, matches, live and manual scoring, career stats, reports and match fees.")
    .server(server_url)
}
