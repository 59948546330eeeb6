pub mod health;
pub mod openapi;
pub mod signers;
pub mod submit;
pub mod transaction;
