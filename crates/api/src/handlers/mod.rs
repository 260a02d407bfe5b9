pub mod courses;
pub mod extract;
pub mod health;
pub mod plan;
pub mod preferences;
