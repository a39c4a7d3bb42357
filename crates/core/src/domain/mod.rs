pub mod knowledge;
pub mod priority;
pub mod settings;
pub mod team;
pub mod ticket;
