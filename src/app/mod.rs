pub mod home;

pub use home::HomeController;
