pub mod capture;
pub mod detection;
pub mod display;
pub mod pipeline;
pub mod shared;
