pub mod lifecycle;
pub mod models;
pub mod routes;
