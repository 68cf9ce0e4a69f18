pub mod onboard;
pub mod route;
pub mod scan;
pub mod status;
