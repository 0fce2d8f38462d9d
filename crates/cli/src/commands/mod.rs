pub mod hosts;
pub mod params;
pub mod results;
pub mod traffic;
