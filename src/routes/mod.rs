// Route exports
pub mod packing;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(packing::configure),
    )
    // Unversioned paths kept for existing mobile clients
    .configure(packing::configure);
}
