pub mod npt;
pub mod run;
pub mod status;
