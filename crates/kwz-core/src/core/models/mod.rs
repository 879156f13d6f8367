pub mod layout;
pub mod stage;
