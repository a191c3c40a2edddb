pub mod admin;
pub mod doctor;
pub mod events;
pub mod public;
pub mod reservations;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(public::configure)
        .configure(reservations::configure)
        .configure(doctor::configure)
        .configure(admin::configure)
        .configure(events::configure);
}
