pub mod auth;
pub mod backup;
pub mod core;
pub mod courses;
pub mod enrollments;
pub mod groups;
pub mod imports;
pub mod intakes;
pub mod marks;
pub mod mcq;
pub mod notifications;
pub mod reports;
pub mod settings;
pub mod students;
