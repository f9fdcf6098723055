pub mod detection;
pub mod measurement;
pub mod power_calculator;
pub mod region;
pub mod session;
