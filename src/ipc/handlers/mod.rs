pub mod backup_exchange;
pub mod broadcast;
pub mod core;
pub mod grades;
pub mod records;
pub mod reports;
pub mod staff;
pub mod students;
pub mod subjects;

mod helpers;
