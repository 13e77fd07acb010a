use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/balances").route("/list", web::get().to(handlers::list_balances)))
        .service(web::scope("/tx").route("/add", web::post().to(handlers::add_tx)))
        .service(
            web::scope("/node")
                .route("/status", web::get().to(handlers::node_status))
                .route("/sync", web::get().to(handlers::sync_blocks))
                .route("/peer", web::get().to(handlers::add_peer)),
        );
}
