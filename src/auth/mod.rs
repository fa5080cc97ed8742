pub mod guard;
pub mod models;
pub mod routes;
