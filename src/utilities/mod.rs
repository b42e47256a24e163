pub mod enums;
pub mod helpers;
pub mod light_curve;
